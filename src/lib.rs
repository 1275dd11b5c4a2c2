//! S3 conformance runner
//!
//! This library drives an S3-compatible server through the AWS SDK, checks
//! responses against declared expectations, and reports every test as one
//! JSON record.

pub mod cli;
pub mod commands;
pub mod common;
pub mod fixtures;
pub mod harness;
pub mod report;
pub mod s3;
pub mod suites;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::{Expectation, ExpectationCase, RecordStream, SelectTarget};
pub use report::{ApiSignature, Status, TestReport};
