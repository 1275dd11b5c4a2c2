//! Test suites and the suite driver
//!
//! Every runnable test is listed in a static registry. The driver runs a
//! selection of them in order, prints one JSON report per test, and stops at
//! the first failure.

pub mod cases;
pub mod functional;
pub mod select;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{error, info, info_span, warn, Instrument};

use crate::common::{Config, Error, Result};
use crate::harness::{finish, run_table, ExpectationCase};
use crate::fixtures;
use crate::report::{ApiSignature, Status, TestReport};
use crate::s3::{api, S3Client};

/// Suites listed in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Functional,
    Select,
}

impl Suite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suite::Functional => "functional",
            Suite::Select => "s3select",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "functional" => Ok(Suite::Functional),
            "s3select" | "select" => Ok(Suite::Select),
            other => Err(Error::Config(format!(
                "unknown suite '{}' (expected functional or s3select)",
                other
            ))),
        }
    }
}

/// Information about a registered test
#[derive(Debug, Clone)]
pub struct TestInfo {
    pub suite: Suite,
    /// Name within the suite; the report name is `suite:name`
    pub name: &'static str,
    /// The API the test exercises
    pub api: ApiSignature,
    pub description: &'static str,
}

impl TestInfo {
    pub fn plan(&self) -> PlannedTest<'static> {
        PlannedTest {
            suite: self.suite.as_str(),
            name: self.name,
            api: self.api,
        }
    }
}

/// All registered tests, in run order
static TESTS: &[TestInfo] = &[
    TestInfo {
        suite: Suite::Functional,
        name: "make_bucket",
        api: api::MAKE_BUCKET,
        description: "Create a bucket, check it exists, create it again",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "make_bucket_invalid_name",
        api: api::MAKE_BUCKET,
        description: "Reject a 65-character bucket name",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "list_buckets",
        api: api::LIST_BUCKETS,
        description: "A new bucket is listed with its creation date",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "put_small_object_from_stream",
        api: api::PUT_OBJECT,
        description: "Upload a small payload from memory",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "put_large_object_from_stream",
        api: api::PUT_OBJECT,
        description: "Upload a multi-megabyte payload from memory",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "put_small_object_from_file",
        api: api::FPUT_OBJECT,
        description: "Upload a small file",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "put_large_object_from_file",
        api: api::FPUT_OBJECT,
        description: "Upload a multi-megabyte file",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "copy_object",
        api: api::COPY_OBJECT,
        description: "Server-side copy preserves the object size",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "copy_object_with_conditions",
        api: api::COPY_OBJECT,
        description: "Copy with a non-matching If-Match etag is refused",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "stat_object",
        api: api::STAT_OBJECT,
        description: "Stat reports the uploaded size",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "get_object",
        api: api::GET_OBJECT,
        description: "Download a full object",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "get_partial_object",
        api: api::GET_PARTIAL_OBJECT,
        description: "Download a byte range",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "fget_object",
        api: api::FGET_OBJECT,
        description: "Download an object into a local file",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "presigned_get_object",
        api: api::PRESIGNED_GET_OBJECT,
        description: "Fetch an object through a presigned GET URL",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "presigned_put_object",
        api: api::PRESIGNED_PUT_OBJECT,
        description: "Upload an object through a presigned PUT URL",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "presigned_post_policy",
        api: api::PRESIGNED_POST_POLICY,
        description: "Upload an object through a signed POST form",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "list_objects",
        api: api::LIST_OBJECTS,
        description: "List objects with marker paging",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "list_objects_v2",
        api: api::LIST_OBJECTS_V2,
        description: "List objects with continuation paging",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "remove_objects",
        api: api::REMOVE_OBJECTS,
        description: "Remove ten objects with one multi-delete",
    },
    TestInfo {
        suite: Suite::Functional,
        name: "remove_bucket",
        api: api::REMOVE_BUCKET,
        description: "A removed bucket no longer exists",
    },
    TestInfo {
        suite: Suite::Select,
        name: "test_csv_input_quote_char",
        api: api::SELECT_OBJECT_CONTENT,
        description: "CSV input quote and escape characters",
    },
    TestInfo {
        suite: Suite::Select,
        name: "test_csv_output_quote_char",
        api: api::SELECT_OBJECT_CONTENT,
        description: "CSV output quote and escape characters",
    },
];

/// Get all registered tests
pub fn all_tests() -> &'static [TestInfo] {
    TESTS
}

/// Pick the tests to run
///
/// `suites` limits the run to those suites (all when empty). `only` limits it
/// further to the named tests, given as `name` or `suite:name`. Registry
/// order is kept either way.
pub fn select_tests(suites: &[String], only: &[String]) -> Result<Vec<&'static TestInfo>> {
    let suites = suites
        .iter()
        .map(|s| s.parse::<Suite>())
        .collect::<Result<Vec<_>>>()?;

    for name in only {
        let known = TESTS.iter().any(|t| matches_name(t, name));
        if !known {
            return Err(Error::Config(format!("unknown test '{}'", name)));
        }
    }

    let selected: Vec<_> = TESTS
        .iter()
        .filter(|t| suites.is_empty() || suites.contains(&t.suite))
        .filter(|t| only.is_empty() || only.iter().any(|n| matches_name(t, n)))
        .collect();

    if selected.is_empty() {
        return Err(Error::Config("no tests match the selection".to_string()));
    }
    Ok(selected)
}

fn matches_name(test: &TestInfo, name: &str) -> bool {
    match name.split_once(':') {
        Some((suite, rest)) => suite == test.suite.as_str() && rest == test.name,
        None => name == test.name,
    }
}

/// A test about to be run
#[derive(Debug, Clone, Copy)]
pub struct PlannedTest<'a> {
    pub suite: &'a str,
    pub name: &'a str,
    pub api: ApiSignature,
}

/// Runs test bodies for the driver
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Run one test, recording its arguments in `report`
    async fn execute(&self, test: &PlannedTest<'_>, report: &mut TestReport) -> Result<()>;
}

/// Counts for a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub not_applicable: usize,
}

/// Run `tests` in order, writing one JSON report line per test to `out`
///
/// A test whose API the server does not implement is reported as NA and the
/// run continues. Any other failure is reported and ends the run with
/// [`Error::TestFailed`].
pub async fn run_all<E, W>(executor: &E, tests: &[PlannedTest<'_>], out: &mut W) -> Result<RunSummary>
where
    E: TestExecutor + ?Sized,
    W: Write,
{
    let mut summary = RunSummary::default();

    for test in tests {
        let mut report = TestReport::new(test.suite, test.name, &test.api);
        let span = info_span!("test", name = %report.name());
        let result = executor.execute(test, &mut report).instrument(span).await;

        let line = match result {
            Ok(()) => {
                info!(test = %report.name(), "PASS");
                summary.passed += 1;
                report.to_report(None, "", None)?
            }
            Err(e) if e.is_not_implemented() => {
                warn!(test = %report.name(), error = %e, "not implemented by the server");
                summary.not_applicable += 1;
                report.to_report(
                    Some(&e),
                    "API not implemented by the server",
                    Some(Status::NotApplicable),
                )?
            }
            Err(e) => {
                error!(test = %report.name(), error = %e, "FAIL");
                let line = report.to_report(Some(&e), "", None)?;
                writeln!(out, "{}", line)?;
                out.flush()?;
                return Err(Error::TestFailed(report.name().to_string()));
            }
        };

        writeln!(out, "{}", line)?;
        out.flush()?;
    }

    Ok(summary)
}

/// Everything a test body needs: settings, the storage client and a plain
/// HTTP client for presigned requests
pub struct SuiteContext {
    pub config: Config,
    pub s3: S3Client,
    pub http: reqwest::Client,
}

impl SuiteContext {
    pub async fn connect(config: Config) -> Result<Self> {
        let s3 = S3Client::connect(&config).await;
        let http = reqwest::Client::builder()
            .user_agent(concat!("s3-conformance/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, s3, http })
    }

    /// Run a case table in a bucket created for it, removing the bucket after
    pub async fn run_table_in_bucket(
        &self,
        prefix: &str,
        cases: &[ExpectationCase],
        report: &mut TestReport,
    ) -> Result<()> {
        let bucket = fixtures::bucket_name(prefix);
        report.set_arg("bucket_name", bucket.as_str());

        self.s3.make_bucket(&bucket).await?;
        let outcome = run_table(&self.s3, &bucket, cases).await;
        let cleanup = self.s3.remove_bucket(&bucket).await;
        finish(outcome, cleanup)
    }
}

#[async_trait]
impl TestExecutor for SuiteContext {
    async fn execute(&self, test: &PlannedTest<'_>, report: &mut TestReport) -> Result<()> {
        match test.suite {
            "functional" => functional::run(self, test.name, report).await,
            "s3select" => select::run(self, test.name, report).await,
            other => Err(Error::Internal(format!("no executor for suite '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Executor that fails or skips the tests named in its lists
    struct Scripted {
        fail: &'static [&'static str],
        unsupported: &'static [&'static str],
        ran: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(fail: &'static [&'static str], unsupported: &'static [&'static str]) -> Self {
            Self {
                fail,
                unsupported,
                ran: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TestExecutor for Scripted {
        async fn execute(&self, test: &PlannedTest<'_>, report: &mut TestReport) -> Result<()> {
            self.ran.lock().unwrap().push(test.name.to_string());
            report.set_arg("bucket_name", "bucket");
            if self.fail.iter().any(|n| *n == test.name) {
                return Err(Error::assertion("size mismatch"));
            }
            if self.unsupported.iter().any(|n| *n == test.name) {
                return Err(Error::S3 {
                    operation: "SelectObjectContent",
                    code: Some("NotImplemented".to_string()),
                    message: "not implemented".to_string(),
                });
            }
            Ok(())
        }
    }

    fn planned(names: &[&'static str]) -> Vec<PlannedTest<'static>> {
        names
            .iter()
            .map(|&name| PlannedTest {
                suite: "functional",
                name,
                api: api::STAT_OBJECT,
            })
            .collect()
    }

    fn lines(out: &[u8]) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_registry_names_unique() {
        let mut names: Vec<_> = all_tests()
            .iter()
            .map(|t| format!("{}:{}", t.suite, t.name))
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_qualified_name_respects_suite() {
        let one = select_tests(&[], &["s3select:test_csv_input_quote_char".to_string()]).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].api.name, "select_object_content");
        assert!(select_tests(&[], &["functional:test_csv_input_quote_char".to_string()]).is_err());
    }

    #[test]
    fn test_select_tests() {
        let all = select_tests(&[], &[]).unwrap();
        assert_eq!(all.len(), all_tests().len());

        let select = select_tests(&["s3select".to_string()], &[]).unwrap();
        assert_eq!(select.len(), 2);

        let one = select_tests(&[], &["functional:stat_object".to_string()]).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name, "stat_object");

        assert!(select_tests(&["nope".to_string()], &[]).is_err());
        assert!(select_tests(&[], &["missing".to_string()]).is_err());
        assert!(select_tests(&["s3select".to_string()], &["stat_object".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_run_all_prints_one_line_per_test() {
        let exec = Scripted::new(&[], &[]);
        let mut out = Vec::new();
        let summary = run_all(&exec, &planned(&["a", "b"]), &mut out).await.unwrap();

        assert_eq!(summary.passed, 2);
        let records = lines(&out);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "functional:a");
        assert_eq!(records[0]["status"], "PASS");
        assert_eq!(records[0]["args"]["bucket_name"], "bucket");
        assert!(records[0].get("duration").is_some());
    }

    #[tokio::test]
    async fn test_run_all_aborts_on_first_failure() {
        let exec = Scripted::new(&["b"], &[]);
        let mut out = Vec::new();
        let err = run_all(&exec, &planned(&["a", "b", "c"]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TestFailed(ref name) if name == "functional:b"));
        assert_eq!(*exec.ran.lock().unwrap(), vec!["a", "b"]);

        let records = lines(&out);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["status"], "FAIL");
        assert_eq!(records[1]["message"], "Assertion failed: size mismatch");
        assert!(records[1].get("error").is_some());
    }

    #[tokio::test]
    async fn test_run_all_reports_not_implemented_as_na() {
        let exec = Scripted::new(&[], &["b"]);
        let mut out = Vec::new();
        let summary = run_all(&exec, &planned(&["a", "b", "c"]), &mut out)
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { passed: 2, not_applicable: 1 });
        let records = lines(&out);
        assert_eq!(records[1]["status"], "NA");
        assert!(records[1].get("alert").is_some());
    }
}
