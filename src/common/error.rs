//! Error types for the conformance runner
//!
//! Messages carry enough context (test case, operation, server error code)
//! to diagnose a failing run from its JSON report alone.

use std::io;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Message the server returns when a copy precondition does not hold
pub const PRECONDITION_FAILED_MESSAGE: &str =
    "At least one of the preconditions you specified did not hold.";

/// Main error type for the conformance runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid case table '{path}': {reason}")]
    CaseTable { path: String, reason: String },

    // === S3 Errors ===
    #[error("S3 {operation} failed: {message}")]
    S3 {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid POST policy: {0}")]
    InvalidPolicy(String),

    #[error("Presigned {method} request returned HTTP {status}")]
    HttpStatus { method: String, status: u16 },

    // === Expectation Errors ===
    #[error("Test {case}: {detail}")]
    CaseMismatch { case: String, detail: String },

    #[error("{failed} of {total} cases failed:\n{details}")]
    TableMismatch {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Not applicable: {0}")]
    NotApplicable(String),

    // === Run Errors ===
    #[error("Test '{0}' failed, aborting run")]
    TestFailed(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === HTTP Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Fold an SDK error into an S3 error, keeping the server's error code
    pub fn s3<E, R>(operation: &'static str, err: aws_sdk_s3::error::SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let code = err.code().map(str::to_string);
        let message = match err.message() {
            Some(msg) => msg.to_string(),
            None => DisplayErrorContext(&err).to_string(),
        };
        Self::S3 {
            operation,
            code,
            message,
        }
    }

    /// Turn a server `PreconditionFailed` response into [`Error::PreconditionFailed`]
    pub fn into_precondition(self) -> Self {
        match self {
            Error::S3 {
                code: Some(code),
                message,
                ..
            } if code == "PreconditionFailed" => Error::PreconditionFailed(message),
            other => other,
        }
    }

    /// Create a mismatch error for one expectation case
    pub fn case_mismatch(case: &str, detail: impl Into<String>) -> Self {
        Self::CaseMismatch {
            case: case.to_string(),
            detail: detail.into(),
        }
    }

    /// Create an assertion error
    pub fn assertion(detail: impl Into<String>) -> Self {
        Self::Assertion(detail.into())
    }

    /// Create a case table error
    pub fn case_table(path: &str, reason: impl Into<String>) -> Self {
        Self::CaseTable {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// The S3 error code, if this error came from the server
    pub fn s3_code(&self) -> Option<&str> {
        match self {
            Error::S3 { code, .. } => code.as_deref(),
            Error::PreconditionFailed(_) => Some("PreconditionFailed"),
            _ => None,
        }
    }

    /// Whether the server reported the operation as unsupported
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotApplicable(_)) || self.s3_code() == Some("NotImplemented")
    }

    /// Full error context: the error followed by its source chain
    pub fn detail(err: &(dyn std::error::Error + 'static)) -> String {
        let mut out = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
