//! S3 Select suite: CSV quote and escape handling
//!
//! Each test is a table of expectation cases run against one scratch bucket.

use super::SuiteContext;
use crate::common::{Error, Result};
use crate::harness::{Expectation, ExpectationCase};
use crate::report::TestReport;
use crate::s3::select::{
    CsvInput, CsvOutput, InputFormat, InputSerialization, JsonOutput, OutputSerialization,
    SelectRequest,
};

const BUCKET_PREFIX: &str = "s3select-test";

/// Run the select test called `name`
pub async fn run(ctx: &SuiteContext, name: &str, report: &mut TestReport) -> Result<()> {
    let cases = match name {
        "test_csv_input_quote_char" => input_quote_cases(),
        "test_csv_output_quote_char" => output_quote_cases(),
        other => {
            return Err(Error::Internal(format!("unknown select test '{}'", other)));
        }
    };
    ctx.run_table_in_bucket(BUCKET_PREFIX, &cases, report).await
}

/// One CSV record: `fields` followed by a newline
fn rec(fields: &str) -> Vec<u8> {
    format!("{}\n", fields).into_bytes()
}

fn csv_input(quote: &str, escape: &str) -> InputSerialization {
    InputSerialization {
        compression: Default::default(),
        format: InputFormat::Csv(CsvInput::standard(quote, escape)),
    }
}

/// Cases varying the input quote and escape characters, with JSON output
pub fn input_quote_cases() -> Vec<ExpectationCase> {
    let all_three = rec(r#"{"_1":"col1","_2":"col2","_3":"col3"}"#);
    let first_quoted = rec(r#"{"_1":"\"col1\"","_2":"col2","_3":"col3"}"#);

    let rows: Vec<(&str, &str, Vec<u8>, Expectation)> = vec![
        // A two-character quote is invalid
        ("\"\"", "\"", rec("col1,col2,col3"), Expectation::Failure),
        // Multi-byte UTF-8 quote
        (
            "ع",
            "\"",
            rec("عcol1ع,عcol2ع,عcol3ع"),
            Expectation::output(all_three.clone()),
        ),
        // Only one field quoted
        ("\"", "\"", rec(r#""col1",col2,col3"#), Expectation::output(all_three)),
        (
            "\"",
            "\"",
            rec(r#""col1,col2,col3""#),
            Expectation::output(rec(r#"{"_1":"col1,col2,col3"}"#)),
        ),
        (
            "'",
            "\"",
            rec(r#""col1",col2,col3"#),
            Expectation::output(first_quoted.clone()),
        ),
        (
            "",
            "\"",
            rec(r#""col1",col2,col3"#),
            Expectation::output(first_quoted.clone()),
        ),
        (
            "",
            "\"",
            rec(r#""col1",col2,col3"#),
            Expectation::output(first_quoted),
        ),
        (
            "",
            "\"",
            rec(r#""col1","col2","col3""#),
            Expectation::output(rec(r#"{"_1":"\"col1\"","_2":"\"col2\"","_3":"\"col3\""}"#)),
        ),
        (
            "\"",
            "\"",
            rec(r#""""""""#),
            Expectation::output(rec(r#"{"_1":"\"\""}"#)),
        ),
        (
            "\"",
            "\"",
            rec(r#"A",B"#),
            Expectation::output(rec(r#"{"_1":"A\"","_2":"B"}"#)),
        ),
        (
            "\"",
            "\"",
            rec(r#"A"",B"#),
            Expectation::output(rec(r#"{"_1":"A\"\"","_2":"B"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#"A\B,C"#),
            Expectation::output(rec(r#"{"_1":"A\\B","_2":"C"}"#)),
        ),
        (
            "\"",
            "\"",
            rec(r#""A""B","CD""#),
            Expectation::output(rec(r#"{"_1":"A\"B","_2":"CD"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\B","CD""#),
            Expectation::output(rec(r#"{"_1":"AB","_2":"CD"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\,","CD""#),
            Expectation::output(rec(r#"{"_1":"A,","_2":"CD"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\"B","CD""#),
            Expectation::output(rec(r#"{"_1":"A\"B","_2":"CD"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\"""#),
            Expectation::output(rec(r#"{"_1":"A\""}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\"\"B""#),
            Expectation::output(rec(r#"{"_1":"A\"\"B"}"#)),
        ),
        (
            "\"",
            "\\",
            rec(r#""A\"","\"B""#),
            Expectation::output(rec(r#"{"_1":"A\"","_2":"\"B"}"#)),
        ),
    ];

    rows.into_iter()
        .enumerate()
        .map(|(idx, (quote, escape, input, expected))| {
            let request = SelectRequest::new(
                csv_input(quote, escape),
                OutputSerialization::Json(JsonOutput::newline_delimited()),
            );
            ExpectationCase::new(format!("test_{}", idx), input, request, expected)
        })
        .collect()
}

/// Cases varying the output quote and escape characters, always quoting
pub fn output_quote_cases() -> Vec<ExpectationCase> {
    let single_quoted = rec("'col1','col2','col3'");

    let rows: Vec<(&str, &str, Vec<u8>, Expectation)> = vec![
        ("''", "''", rec("col1,col2,col3"), Expectation::Failure),
        (
            "'",
            "'",
            rec("col1,col2,col3"),
            Expectation::output(single_quoted.clone()),
        ),
        // An empty quote character is written as NUL
        (
            "",
            "\"",
            rec("col1,col2,col3"),
            Expectation::output(rec("\0col1\0,\0col2\0,\0col3\0")),
        ),
        (
            "\"",
            "\"",
            rec("col1,col2,col3"),
            Expectation::output(rec(r#""col1","col2","col3""#)),
        ),
        (
            "\"",
            "\"",
            rec(r#"col"1,col2,col3"#),
            Expectation::output(rec(r#""col""1","col2","col3""#)),
        ),
        ("\"", "\"", rec(r#""""""#), Expectation::output(rec(r#""""""#))),
        // A blank line yields no records
        ("\"", "\"", rec(""), Expectation::output(Vec::new())),
        (
            "'",
            "\\",
            rec("col1,col2,col3"),
            Expectation::output(single_quoted),
        ),
        (
            "'",
            "\\",
            rec(r#"col""1,col2,col3"#),
            Expectation::output(rec(r#"'col""1','col2','col3'"#)),
        ),
        (
            "'",
            "\\",
            rec("col'1,col2,col3"),
            Expectation::output(rec(r"'col\'1','col2','col3'")),
        ),
        (
            "'",
            "\\",
            rec(r#""col'1","col2","col3""#),
            Expectation::output(rec(r"'col\'1','col2','col3'")),
        ),
        ("'", "\\", rec("col'"), Expectation::output(rec(r"'col\''"))),
        // Two consecutive escaped quotes
        (
            "'",
            "\\",
            rec(r#""a""""""#),
            Expectation::output(rec(r#"'a""'"#)),
        ),
    ];

    rows.into_iter()
        .enumerate()
        .map(|(idx, (quote, escape, input, expected))| {
            let request = SelectRequest::new(
                csv_input("\"", "\""),
                OutputSerialization::Csv(CsvOutput::always_quoted(quote, escape)),
            );
            ExpectationCase::new(format!("test_{}", idx), input, request, expected)
        })
        .collect()
}
