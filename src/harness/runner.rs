//! Case execution and comparison

use tracing::{debug, warn};

use super::{Expectation, ExpectationCase, SelectTarget};
use crate::common::{Error, Result};
use crate::fixtures;
use crate::s3::select::SelectRequest;

/// Run one case in `bucket`
///
/// Uploads the case input under a fresh key, runs the select, and checks the
/// result against the expectation. The uploaded object is removed on every
/// path. Upload and cleanup errors are never treated as the expected failure.
#[tracing::instrument(skip(target, case), fields(case = %case.id))]
pub async fn run_case<T>(target: &T, bucket: &str, case: &ExpectationCase) -> Result<()>
where
    T: SelectTarget + ?Sized,
{
    let key = fixtures::object_name();

    let checked = match target.put_object(bucket, &key, case.input.clone()).await {
        Ok(()) => {
            let mut output = Vec::new();
            let result = drain(target, bucket, &key, &case.request, &mut output).await;
            compare(case, result, &output)
        }
        Err(e) => Err(e),
    };

    let cleanup = target.remove_object(bucket, &key).await;
    finish(checked, cleanup)
}

/// Run every case of a table, in order, against one bucket
///
/// Mismatches are collected and reported together once the table is done.
/// Any other error stops the table immediately.
pub async fn run_table<T>(target: &T, bucket: &str, cases: &[ExpectationCase]) -> Result<()>
where
    T: SelectTarget + ?Sized,
{
    let mut mismatches = Vec::new();

    for case in cases {
        match run_case(target, bucket, case).await {
            Ok(()) => debug!(case = %case.id, "case passed"),
            Err(e @ Error::CaseMismatch { .. }) => {
                warn!(case = %case.id, "{}", e);
                mismatches.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(Error::TableMismatch {
            failed: mismatches.len(),
            total: cases.len(),
            details: mismatches.join("\n"),
        })
    }
}

/// Combine a test outcome with the result of its cleanup
///
/// A cleanup failure fails an otherwise passing test. When both failed, the
/// test's own error is kept and the cleanup error is logged.
pub fn finish<T>(outcome: Result<T>, cleanup: Result<()>) -> Result<T> {
    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            warn!(error = %cleanup_err, "cleanup failed after test error");
            Err(e)
        }
    }
}

/// Read the whole record stream, appending to `output` chunk by chunk
async fn drain<T>(
    target: &T,
    bucket: &str,
    key: &str,
    request: &SelectRequest,
    output: &mut Vec<u8>,
) -> Result<()>
where
    T: SelectTarget + ?Sized,
{
    let mut stream = target.select_object_content(bucket, key, request).await?;
    while let Some(chunk) = stream.next_chunk().await? {
        output.extend_from_slice(&chunk);
    }
    Ok(())
}

fn compare(case: &ExpectationCase, result: Result<()>, output: &[u8]) -> Result<()> {
    match (result, &case.expected) {
        (Ok(()), Expectation::Output(expected)) if expected.as_slice() == output => Ok(()),
        (Ok(()), Expectation::Output(expected)) => Err(Error::case_mismatch(
            &case.id,
            format!(
                "data mismatch for input {}. Expected: {}, received: {}",
                show(&case.input),
                show(expected),
                show(output)
            ),
        )),
        (Ok(()), Expectation::Failure) => Err(Error::case_mismatch(
            &case.id,
            format!(
                "expected a failure for input {}, got {}",
                show(&case.input),
                show(output)
            ),
        )),
        // An unsupported API is not a mismatch; let the driver report it
        (Err(e), Expectation::Output(_)) if e.is_not_implemented() => Err(e),
        (Err(e), Expectation::Output(expected)) => Err(Error::case_mismatch(
            &case.id,
            format!(
                "unexpectedly failed with: {} (input {}, expected {}, partial output {})",
                e,
                show(&case.input),
                show(expected),
                show(output)
            ),
        )),
        (Err(e), Expectation::Failure) => {
            debug!(case = %case.id, error = %e, "failed as expected");
            Ok(())
        }
    }
}

fn show(bytes: &[u8]) -> String {
    format!("b\"{}\"", bytes.escape_ascii())
}
