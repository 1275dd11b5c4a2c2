//! Integration tests for the expectation runner and the suite driver
//!
//! These tests drive the library against an in-memory select service:
//! 1. Uploads land in a map, removals take them out again
//! 2. Select answers come from a per-test responder
//! 3. Reports are checked through the JSON lines the driver prints

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use s3_conformance::report::Status;
use s3_conformance::s3::api;
use s3_conformance::s3::select::{
    CsvInput, CsvOutput, InputFormat, InputSerialization, JsonOutput, OutputSerialization,
    SelectRequest,
};
use s3_conformance::suites::cases::CaseTable;
use s3_conformance::suites::{run_all, PlannedTest, TestExecutor};
use s3_conformance::{
    harness, Error, Expectation, ExpectationCase, RecordStream, Result, SelectTarget, TestReport,
};

type Responder = dyn Fn(&[u8], &SelectRequest) -> Vec<Result<Vec<u8>>> + Send + Sync;

/// In-memory select service
struct FakeSelect {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    respond: Box<Responder>,
    fail_put: bool,
    fail_remove: bool,
    selects: Mutex<usize>,
}

impl FakeSelect {
    fn new<F>(respond: F) -> Self
    where
        F: Fn(&[u8], &SelectRequest) -> Vec<Result<Vec<u8>>> + Send + Sync + 'static,
    {
        Self {
            objects: Mutex::new(HashMap::new()),
            respond: Box::new(respond),
            fail_put: false,
            fail_remove: false,
            selects: Mutex::new(0),
        }
    }

    /// A service that understands just enough CSV quoting for the tests below
    fn csv() -> Self {
        Self::new(|input, request| {
            let quote = match &request.input.format {
                InputFormat::Csv(csv) => csv.quote_character.clone().unwrap_or_default(),
                InputFormat::Json(_) => String::new(),
            };
            if let OutputSerialization::Csv(out) = &request.output {
                if out.quote_character.as_deref().map_or(0, |q| q.chars().count()) > 1 {
                    return vec![Err(service_error("InvalidQuoteCharacter"))];
                }
            }

            let line = String::from_utf8_lossy(input);
            let fields: Vec<String> = line
                .trim_end_matches('\n')
                .split(',')
                .map(|f| f.trim_matches(|c: char| quote.contains(c)).to_string())
                .collect();
            let json = fields
                .iter()
                .enumerate()
                .map(|(i, f)| format!("\"_{}\":\"{}\"", i + 1, f))
                .collect::<Vec<_>>()
                .join(",");
            let record = format!("{{{}}}\n", json).into_bytes();

            // Split the record across two events
            let (a, b) = record.split_at(record.len() / 2);
            vec![Ok(a.to_vec()), Ok(b.to_vec())]
        })
    }

    fn stored(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn select_count(&self) -> usize {
        *self.selects.lock().unwrap()
    }
}

fn service_error(code: &str) -> Error {
    Error::S3 {
        operation: "SelectObjectContent",
        code: Some(code.to_string()),
        message: format!("{} from the fake service", code),
    }
}

struct VecStream {
    chunks: VecDeque<Result<Vec<u8>>>,
}

#[async_trait]
impl RecordStream for VecStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.chunks.pop_front() {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SelectTarget for FakeSelect {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        if self.fail_put {
            return Err(Error::S3 {
                operation: "PutObject",
                code: Some("AccessDenied".to_string()),
                message: "Access Denied".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, key), body);
        Ok(())
    }

    async fn select_object_content(
        &self,
        bucket: &str,
        key: &str,
        request: &SelectRequest,
    ) -> Result<Box<dyn RecordStream>> {
        *self.selects.lock().unwrap() += 1;
        let input = self
            .objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
            .ok_or_else(|| service_error("NoSuchKey"))?;

        let mut chunks: VecDeque<_> = (self.respond)(&input, request).into();
        // An error before any record fails the call itself
        if matches!(chunks.front(), Some(Err(_))) {
            if let Some(Err(e)) = chunks.pop_front() {
                return Err(e);
            }
        }
        Ok(Box::new(VecStream { chunks }))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&format!("{}/{}", bucket, key));
        if self.fail_remove {
            return Err(Error::S3 {
                operation: "DeleteObject",
                code: Some("InternalError".to_string()),
                message: "We encountered an internal error".to_string(),
            });
        }
        removed.map(|_| ()).ok_or_else(|| service_error("NoSuchKey"))
    }
}

fn json_request(quote: &str, escape: &str) -> SelectRequest {
    SelectRequest::new(
        InputSerialization {
            compression: Default::default(),
            format: InputFormat::Csv(CsvInput::standard(quote, escape)),
        },
        OutputSerialization::Json(JsonOutput::newline_delimited()),
    )
}

fn csv_request(quote: &str, escape: &str) -> SelectRequest {
    SelectRequest::new(
        InputSerialization {
            compression: Default::default(),
            format: InputFormat::Csv(CsvInput::standard("\"", "\"")),
        },
        OutputSerialization::Csv(CsvOutput::always_quoted(quote, escape)),
    )
}

fn scenario_a() -> ExpectationCase {
    ExpectationCase::new(
        "test_2",
        b"\"col1\",col2,col3\n".to_vec(),
        json_request("\"", "\""),
        Expectation::output(b"{\"_1\":\"col1\",\"_2\":\"col2\",\"_3\":\"col3\"}\n".to_vec()),
    )
}

fn scenario_b() -> ExpectationCase {
    ExpectationCase::new(
        "test_0",
        b"col1,col2,col3\n".to_vec(),
        csv_request("''", "''"),
        Expectation::Failure,
    )
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

// ============== Expectation runner ==============

#[tokio::test]
async fn test_exact_output_passes() {
    let fake = FakeSelect::csv();
    harness::run_case(&fake, "bucket", &scenario_a()).await.unwrap();
    assert_eq!(fake.select_count(), 1);
    assert_eq!(fake.stored(), 0, "case object must be removed");
}

#[tokio::test]
async fn test_expected_failure_passes() {
    let fake = FakeSelect::csv();
    harness::run_case(&fake, "bucket", &scenario_b()).await.unwrap();
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_success_where_failure_expected_is_mismatch() {
    let fake = FakeSelect::csv();
    let case = ExpectationCase::new(
        "test_7",
        b"col1\n".to_vec(),
        json_request("\"", "\""),
        Expectation::Failure,
    );

    let err = harness::run_case(&fake, "bucket", &case).await.unwrap_err();
    match err {
        Error::CaseMismatch { case, detail } => {
            assert_eq!(case, "test_7");
            assert!(detail.contains("expected a failure"), "{}", detail);
            assert!(detail.contains("{\\\"_1\\\":\\\"col1\\\"}"), "{}", detail);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_byte_difference_is_mismatch() {
    let fake = FakeSelect::csv();
    let case = ExpectationCase::new(
        "test_3",
        b"col1,col2\n".to_vec(),
        json_request("\"", "\""),
        Expectation::output(b"{\"_1\":\"col1\",\"_2\":\"col2\"}".to_vec()),
    );

    let err = harness::run_case(&fake, "bucket", &case).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Test test_3: data mismatch"), "{}", msg);
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_mid_stream_error_keeps_partial_output() {
    let fake = FakeSelect::new(|_, _| {
        vec![
            Ok(b"{\"_1\":".to_vec()),
            Err(Error::Internal("connection reset".to_string())),
        ]
    });

    let err = harness::run_case(&fake, "bucket", &scenario_a())
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("unexpectedly failed"), "{}", msg);
    assert!(msg.contains("connection reset"), "{}", msg);
    assert!(msg.contains("partial output b\"{\\\"_1\\\":\""), "{}", msg);
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_upload_failure_is_never_the_expected_failure() {
    let mut fake = FakeSelect::csv();
    fake.fail_put = true;

    let err = harness::run_case(&fake, "bucket", &scenario_b())
        .await
        .unwrap_err();
    assert_eq!(err.s3_code(), Some("AccessDenied"));
    assert_eq!(fake.select_count(), 0);
}

#[tokio::test]
async fn test_cleanup_failure_fails_passing_case() {
    let mut fake = FakeSelect::csv();
    fake.fail_remove = true;

    let err = harness::run_case(&fake, "bucket", &scenario_a())
        .await
        .unwrap_err();
    assert_eq!(err.s3_code(), Some("InternalError"));
}

#[tokio::test]
async fn test_table_collects_every_mismatch() {
    let fake = FakeSelect::csv();
    let cases = vec![
        scenario_b(),
        ExpectationCase::new(
            "test_1",
            b"a\n".to_vec(),
            json_request("\"", "\""),
            Expectation::output(b"wrong".to_vec()),
        ),
        scenario_a(),
        ExpectationCase::new(
            "test_3",
            b"b\n".to_vec(),
            json_request("\"", "\""),
            Expectation::Failure,
        ),
    ];

    let err = harness::run_table(&fake, "bucket", &cases).await.unwrap_err();
    match err {
        Error::TableMismatch {
            failed,
            total,
            details,
        } => {
            assert_eq!(failed, 2);
            assert_eq!(total, 4);
            assert!(details.contains("Test test_1:"));
            assert!(details.contains("Test test_3:"));
            assert!(!details.contains("Test test_2:"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Every case ran and cleaned up after itself
    assert_eq!(fake.select_count(), 4);
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_table_stops_on_service_error() {
    let mut fake = FakeSelect::csv();
    fake.fail_put = true;

    let err = harness::run_table(&fake, "bucket", &[scenario_a(), scenario_b()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::S3 { operation: "PutObject", .. }));
}

#[tokio::test]
async fn test_case_table_fixture_runs() {
    let table = CaseTable::load(&fixtures_dir().join("select_cases.yaml")).unwrap();
    assert_eq!(table.name, "csv_quote_basics");

    let cases = table.cases().unwrap();
    assert_eq!(cases.len(), 3);

    let fake = FakeSelect::csv();
    harness::run_table(&fake, "bucket", &cases).await.unwrap();
    assert_eq!(fake.stored(), 0);
}

// ============== Suite driver ==============

/// Runs each planned test as a one-case table against the fake service
struct TableExecutor {
    fake: FakeSelect,
    cases: HashMap<&'static str, Vec<ExpectationCase>>,
}

#[async_trait]
impl TestExecutor for TableExecutor {
    async fn execute(&self, test: &PlannedTest<'_>, report: &mut TestReport) -> Result<()> {
        report.set_arg("bucket_name", "s3select-test-fake");
        let cases = self
            .cases
            .get(test.name)
            .ok_or_else(|| Error::Internal(format!("no cases for {}", test.name)))?;
        harness::run_table(&self.fake, "s3select-test-fake", cases).await
    }
}

fn plan(name: &'static str) -> PlannedTest<'static> {
    PlannedTest {
        suite: "s3select",
        name,
        api: api::SELECT_OBJECT_CONTENT,
    }
}

fn records(out: &[u8]) -> Vec<Value> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_driver_reports_pass_then_aborts_on_failure() {
    let bad = ExpectationCase::new(
        "test_0",
        b"x\n".to_vec(),
        json_request("\"", "\""),
        Expectation::Failure,
    );
    let exec = TableExecutor {
        fake: FakeSelect::csv(),
        cases: HashMap::from([
            ("good", vec![scenario_a(), scenario_b()]),
            ("bad", vec![bad]),
            ("never", vec![scenario_a()]),
        ]),
    };

    let mut out = Vec::new();
    let err = run_all(&exec, &[plan("good"), plan("bad"), plan("never")], &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TestFailed(ref name) if name == "s3select:bad"));

    let lines = records(&out);
    assert_eq!(lines.len(), 2, "the test after the failure must not run");

    assert_eq!(lines[0]["name"], "s3select:good");
    assert_eq!(
        lines[0]["function"],
        "select_object_content(bucket_name, object_name, request)"
    );
    assert_eq!(lines[0]["args"]["bucket_name"], "s3select-test-fake");
    assert_eq!(lines[0]["status"], Status::Pass.to_string());
    assert!(lines[0].get("message").is_none());
    assert!(lines[0].get("error").is_none());
    assert!(lines[0]["duration"].is_u64());

    assert_eq!(lines[1]["status"], "FAIL");
    let message = lines[1]["message"].as_str().unwrap();
    assert!(message.contains("Test test_0: expected a failure"), "{}", message);
    assert!(lines[1]["error"].as_str().is_some());
}

#[tokio::test]
async fn test_driver_marks_unsupported_api_na() {
    let exec = TableExecutor {
        fake: FakeSelect::new(|_, _| vec![Err(service_error("NotImplemented"))]),
        cases: HashMap::from([
            ("unsupported", vec![scenario_a()]),
            ("after", vec![scenario_b()]),
        ]),
    };

    let mut out = Vec::new();
    let summary = run_all(&exec, &[plan("unsupported"), plan("after")], &mut out)
        .await
        .unwrap();
    assert_eq!(summary.not_applicable, 1);
    assert_eq!(summary.passed, 1);

    let lines = records(&out);
    assert_eq!(lines[0]["status"], "NA");
    assert!(lines[0]["alert"].as_str().is_some());
    assert_eq!(lines[1]["status"], "PASS");
}

// ============== Report contract ==============

#[test]
fn test_report_renders_differ_only_in_duration() {
    let mut report = TestReport::new(
        "s3select",
        "test_csv_input_quote_char",
        &api::SELECT_OBJECT_CONTENT,
    );
    report.set_arg("bucket_name", "b");
    report.set_arg("object_name", "");
    report.set_arg("length", 0);
    report.set_arg("recursive", false);

    let mut first: Value =
        serde_json::from_str(&report.to_report(None, "", None).unwrap()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut second: Value =
        serde_json::from_str(&report.to_report(None, "", None).unwrap()).unwrap();

    assert_eq!(first["args"], serde_json::json!({"bucket_name": "b"}));
    assert!(first.get("alert").is_none());

    first.as_object_mut().unwrap().remove("duration");
    second.as_object_mut().unwrap().remove("duration");
    assert_eq!(first, second);
}
