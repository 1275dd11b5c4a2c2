//! Expectation-matching test runner
//!
//! Runs one select request against one uploaded payload and compares the
//! result with a declared expectation. The service is reached through the
//! [`SelectTarget`] trait so tables can be exercised against a real server
//! or an in-memory double.

mod runner;

pub use runner::{finish, run_case, run_table};

use async_trait::async_trait;

use crate::common::Result;
use crate::s3::select::SelectRequest;

/// What a case is expected to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Exactly these bytes, and no error
    Output(Vec<u8>),
    /// An error; its content is not checked
    Failure,
}

impl Expectation {
    pub fn output(bytes: impl Into<Vec<u8>>) -> Self {
        Expectation::Output(bytes.into())
    }
}

/// One row of a table-driven select check
#[derive(Debug, Clone)]
pub struct ExpectationCase {
    /// Case identifier used in mismatch reports (e.g. `test_3`)
    pub id: String,
    pub input: Vec<u8>,
    pub request: SelectRequest,
    pub expected: Expectation,
}

impl ExpectationCase {
    pub fn new(
        id: impl Into<String>,
        input: impl Into<Vec<u8>>,
        request: SelectRequest,
        expected: Expectation,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            request,
            expected,
        }
    }
}

/// Chunked stream of selected records
#[async_trait]
pub trait RecordStream: Send {
    /// Next chunk of record bytes, or `None` once the stream has ended
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Service operations needed to run expectation cases
#[async_trait]
pub trait SelectTarget: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    async fn select_object_content(
        &self,
        bucket: &str,
        key: &str,
        request: &SelectRequest,
    ) -> Result<Box<dyn RecordStream>>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()>;
}
