//! Select case tables loaded from YAML
//!
//! A table file names a default request and a list of cases:
//!
//! ```yaml
//! name: csv_quotes
//! description: Quoted fields are unwrapped
//! request:
//!   input:
//!     csv: { quote_character: '"', quote_escape_character: '"' }
//!   output:
//!     json: { record_delimiter: "\n" }
//! cases:
//!   - input: "\"col1\",col2\n"
//!     expect: { output: "{\"_1\":\"col1\",\"_2\":\"col2\"}\n" }
//!   - input: "col1\n"
//!     request: { ... }        # replaces the default request
//!     expect: { failure: true }
//! ```
//!
//! The whole table runs as a single test named `cases:<name>`.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{run_all, PlannedTest, RunSummary, SuiteContext, TestExecutor};
use crate::common::{Error, Result};
use crate::harness::{Expectation, ExpectationCase};
use crate::report::TestReport;
use crate::s3::api;
use crate::s3::select::SelectRequest;

/// Suite name used in reports for case tables
pub const SUITE: &str = "cases";

const BUCKET_PREFIX: &str = "s3select-cases";

/// A table of select cases loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct CaseTable {
    /// Name of the table; the report name is `cases:<name>`
    pub name: String,
    /// Optional description of what the table checks
    pub description: Option<String>,
    /// Request used by every case that does not bring its own
    pub request: SelectRequest,
    pub cases: Vec<CaseSpec>,
}

/// One case as written in the file
#[derive(Deserialize, Debug)]
pub struct CaseSpec {
    /// Case identifier; defaults to `test_<index>`
    pub id: Option<String>,
    /// Object content to upload
    pub input: String,
    pub request: Option<SelectRequest>,
    pub expect: ExpectSpec,
}

/// Expected outcome: exactly one of `output` or `failure: true`
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExpectSpec {
    pub output: Option<String>,
    #[serde(default)]
    pub failure: bool,
}

impl CaseTable {
    /// Load and validate a case table file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&path.display().to_string(), &content)
    }

    /// Parse a case table; `origin` names the source in error messages
    pub fn parse(origin: &str, content: &str) -> Result<Self> {
        let table: CaseTable =
            serde_yaml::from_str(content).map_err(|e| Error::case_table(origin, e.to_string()))?;

        if table.name.trim().is_empty() {
            return Err(Error::case_table(origin, "table name is empty"));
        }
        if table.cases.is_empty() {
            return Err(Error::case_table(origin, "table has no cases"));
        }
        // Validate every expectation up front so a bad row fails before any upload
        table.expectation_cases(origin)?;
        Ok(table)
    }

    fn expectation_cases(&self, origin: &str) -> Result<Vec<ExpectationCase>> {
        self.cases
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                let id = spec.id.clone().unwrap_or_else(|| format!("test_{}", idx));
                let expected = match (&spec.expect.output, spec.expect.failure) {
                    (Some(output), false) => Expectation::output(output.as_bytes()),
                    (None, true) => Expectation::Failure,
                    (Some(_), true) => {
                        return Err(Error::case_table(
                            origin,
                            format!("case {} expects both output and failure", id),
                        ))
                    }
                    (None, false) => {
                        return Err(Error::case_table(
                            origin,
                            format!("case {} has no expectation", id),
                        ))
                    }
                };
                let request = spec.request.clone().unwrap_or_else(|| self.request.clone());
                Ok(ExpectationCase::new(id, spec.input.as_bytes(), request, expected))
            })
            .collect()
    }

    /// The table as runnable cases
    pub fn cases(&self) -> Result<Vec<ExpectationCase>> {
        self.expectation_cases(&self.name)
    }

    pub fn plan(&self) -> PlannedTest<'_> {
        PlannedTest {
            suite: SUITE,
            name: &self.name,
            api: api::SELECT_OBJECT_CONTENT,
        }
    }
}

/// Runs one case table against the configured server
pub struct CaseTableRun<'a> {
    ctx: &'a SuiteContext,
    table: CaseTable,
}

impl<'a> CaseTableRun<'a> {
    pub fn new(ctx: &'a SuiteContext, table: CaseTable) -> Self {
        Self { ctx, table }
    }

    /// Run the table as a single reported test
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<RunSummary> {
        run_all(self, &[self.table.plan()], out).await
    }
}

#[async_trait]
impl TestExecutor for CaseTableRun<'_> {
    async fn execute(&self, _test: &PlannedTest<'_>, report: &mut TestReport) -> Result<()> {
        let cases = self.table.cases()?;
        report.set_arg("cases", cases.len());
        self.ctx
            .run_table_in_bucket(BUCKET_PREFIX, &cases, report)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
name: csv_quotes
description: Quoted fields are unwrapped
request:
  input:
    csv:
      quote_character: '"'
      quote_escape_character: '"'
      record_delimiter: "\n"
      field_delimiter: ","
  output:
    json:
      record_delimiter: "\n"
cases:
  - input: "\"col1\",col2,col3\n"
    expect:
      output: "{\"_1\":\"col1\",\"_2\":\"col2\",\"_3\":\"col3\"}\n"
  - id: bad_quote
    input: "col1,col2,col3\n"
    request:
      input:
        csv:
          quote_character: "''"
      output:
        json: {}
    expect:
      failure: true
"#;

    #[test]
    fn test_parse_table() {
        let table = CaseTable::parse("inline", TABLE).unwrap();
        assert_eq!(table.name, "csv_quotes");
        assert_eq!(table.description.as_deref(), Some("Quoted fields are unwrapped"));

        let cases = table.cases().unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "test_0");
        assert_eq!(cases[0].input, b"\"col1\",col2,col3\n");
        assert_eq!(cases[0].request, table.request);
        assert_eq!(cases[1].id, "bad_quote");
        assert_eq!(cases[1].expected, Expectation::Failure);
        assert_ne!(cases[1].request, table.request);
    }

    #[test]
    fn test_plan_uses_cases_suite() {
        let table = CaseTable::parse("inline", TABLE).unwrap();
        let plan = table.plan();
        assert_eq!(plan.suite, "cases");
        assert_eq!(plan.name, "csv_quotes");
        assert_eq!(plan.api.name, "select_object_content");
    }

    #[test]
    fn test_rejects_ambiguous_expectation() {
        let table = TABLE.replace("failure: true", "failure: true\n      output: \"x\"");
        let err = CaseTable::parse("inline", &table).unwrap_err();
        assert!(err.to_string().contains("both output and failure"));

        let table = TABLE.replace("failure: true", "failure: false");
        let err = CaseTable::parse("inline", &table).unwrap_err();
        assert!(err.to_string().contains("no expectation"));
    }

    #[test]
    fn test_rejects_empty_table() {
        let err = CaseTable::parse(
            "inline",
            "name: empty\nrequest:\n  input: { csv: {} }\n  output: { json: {} }\ncases: []\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::CaseTable { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CaseTable::load(Path::new("/nonexistent/cases.yaml")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
