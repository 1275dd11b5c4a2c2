//! Structured test reports
//!
//! Every test produces exactly one JSON line on stdout in the format shared
//! by the mint conformance suites:
//!
//! ```json
//! {"name":"s3select:test_csv_input_quote_char","function":"select_object_content(bucket_name, object_name, request)","args":{"bucket_name":"s3select-test-..."},"duration":412,"status":"PASS"}
//! ```
//!
//! Fields with empty values are left out of the record entirely; consumers
//! treat a missing field as empty.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Instant;

/// Final status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    /// The service does not support the API under test
    #[serde(rename = "NA")]
    NotApplicable,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "PASS"),
            Status::Fail => write!(f, "FAIL"),
            Status::NotApplicable => write!(f, "NA"),
        }
    }
}

/// Name and declared parameters of an API under test
///
/// Rendered as `name(param1, param2)`; the receiver is never listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSignature {
    pub name: &'static str,
    pub params: &'static [&'static str],
}

impl ApiSignature {
    pub const fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        Self { name, params }
    }
}

impl fmt::Display for ApiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// A rendered report record
///
/// Field order matches the order consumers expect to read them in.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub function: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
    pub duration: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alert: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub status: Status,
}

/// Report for one test function invocation
#[derive(Debug)]
pub struct TestReport {
    name: String,
    function: String,
    args: Map<String, Value>,
    start: Instant,
}

impl TestReport {
    /// Start a report for `suite:test_name`, timing from now
    pub fn new(suite: &str, test_name: &str, api: &ApiSignature) -> Self {
        Self {
            name: format!("{}:{}", suite, test_name),
            function: api.to_string(),
            args: Map::new(),
            start: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Record an argument value discovered during the test
    pub fn set_arg(&mut self, key: &str, value: impl Into<Value>) {
        self.args.insert(key.to_string(), value.into());
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.args
    }

    /// Build the report record
    ///
    /// Status is `status` when given, else FAIL when `error` is given, else
    /// PASS. The duration is measured at each call.
    pub fn to_entry(
        &self,
        error: Option<&(dyn std::error::Error + 'static)>,
        alert: &str,
        status: Option<Status>,
    ) -> ReportEntry {
        let args = self
            .args
            .iter()
            .filter(|(_, v)| !is_empty_value(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let (message, detail) = match error {
            Some(err) => (err.to_string(), crate::common::Error::detail(err)),
            None => (String::new(), String::new()),
        };

        let status = status.unwrap_or(if message.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        });

        ReportEntry {
            name: self.name.clone(),
            function: self.function.clone(),
            args,
            duration: self.start.elapsed().as_millis() as u64,
            alert: alert.to_string(),
            error: if message.is_empty() { String::new() } else { detail },
            message,
            status,
        }
    }

    /// Render the report record as a single JSON line
    pub fn to_report(
        &self,
        error: Option<&(dyn std::error::Error + 'static)>,
        alert: &str,
        status: Option<Status>,
    ) -> crate::common::Result<String> {
        Ok(serde_json::to_string(&self.to_entry(error, alert, status))?)
    }
}

/// Values dropped from `args`: null, false, zero, empty strings and collections
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
