//! S3 Select request description
//!
//! These types describe a select request independently of the SDK so they
//! can be declared in case tables (Rust or YAML) and converted at the call
//! site. Every delimiter/quote field is optional: `None` leaves the element
//! out of the request, `Some("")` sends it empty.

use aws_sdk_s3::types as s3;
use serde::Deserialize;

/// A complete select request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectRequest {
    /// SQL expression, e.g. `select * from s3object`
    #[serde(default = "default_expression")]
    pub expression: String,
    pub input: InputSerialization,
    /// Written as `csv: {...}` or `json: {...}`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub output: OutputSerialization,
    #[serde(default)]
    pub request_progress: bool,
}

fn default_expression() -> String {
    "select * from s3object".to_string()
}

impl SelectRequest {
    pub fn new(input: InputSerialization, output: OutputSerialization) -> Self {
        Self {
            expression: default_expression(),
            input,
            output,
            request_progress: false,
        }
    }
}

/// Input format of the object being queried
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InputSerialization {
    #[serde(default)]
    pub compression: Compression,
    #[serde(flatten)]
    pub format: InputFormat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Csv(CsvInput),
    Json(JsonInput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileHeaderInfo {
    #[default]
    None,
    Use,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CsvInput {
    #[serde(default)]
    pub file_header_info: FileHeaderInfo,
    pub record_delimiter: Option<String>,
    pub field_delimiter: Option<String>,
    pub quote_character: Option<String>,
    pub quote_escape_character: Option<String>,
    pub comments: Option<String>,
    #[serde(default)]
    pub allow_quoted_record_delimiter: bool,
}

impl CsvInput {
    /// Comma separated, newline terminated, `#` comments, no header row
    pub fn standard(quote_character: &str, quote_escape_character: &str) -> Self {
        Self {
            file_header_info: FileHeaderInfo::None,
            record_delimiter: Some("\n".to_string()),
            field_delimiter: Some(",".to_string()),
            quote_character: Some(quote_character.to_string()),
            quote_escape_character: Some(quote_escape_character.to_string()),
            comments: Some("#".to_string()),
            allow_quoted_record_delimiter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    #[default]
    Document,
    Lines,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JsonInput {
    #[serde(default, rename = "type")]
    pub json_type: JsonType,
}

/// Output format of the selected records
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSerialization {
    Csv(CsvOutput),
    Json(JsonOutput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteFields {
    Always,
    #[default]
    AsNeeded,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CsvOutput {
    #[serde(default)]
    pub quote_fields: QuoteFields,
    pub record_delimiter: Option<String>,
    pub field_delimiter: Option<String>,
    pub quote_character: Option<String>,
    pub quote_escape_character: Option<String>,
}

impl CsvOutput {
    /// Always-quoted, comma separated, newline terminated
    pub fn always_quoted(quote_character: &str, quote_escape_character: &str) -> Self {
        Self {
            quote_fields: QuoteFields::Always,
            record_delimiter: Some("\n".to_string()),
            field_delimiter: Some(",".to_string()),
            quote_character: Some(quote_character.to_string()),
            quote_escape_character: Some(quote_escape_character.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JsonOutput {
    pub record_delimiter: Option<String>,
}

impl JsonOutput {
    pub fn newline_delimited() -> Self {
        Self {
            record_delimiter: Some("\n".to_string()),
        }
    }
}

// === SDK conversions ===

impl From<&InputSerialization> for s3::InputSerialization {
    fn from(input: &InputSerialization) -> Self {
        let compression = match input.compression {
            Compression::None => s3::CompressionType::None,
            Compression::Gzip => s3::CompressionType::Gzip,
            Compression::Bzip2 => s3::CompressionType::Bzip2,
        };
        let builder = s3::InputSerialization::builder().compression_type(compression);
        match &input.format {
            InputFormat::Csv(csv) => builder.csv(csv.into()).build(),
            InputFormat::Json(json) => builder.json(json.into()).build(),
        }
    }
}

impl From<&CsvInput> for s3::CsvInput {
    fn from(csv: &CsvInput) -> Self {
        let header = match csv.file_header_info {
            FileHeaderInfo::None => s3::FileHeaderInfo::None,
            FileHeaderInfo::Use => s3::FileHeaderInfo::Use,
            FileHeaderInfo::Ignore => s3::FileHeaderInfo::Ignore,
        };
        s3::CsvInput::builder()
            .file_header_info(header)
            .set_record_delimiter(csv.record_delimiter.clone())
            .set_field_delimiter(csv.field_delimiter.clone())
            .set_quote_character(csv.quote_character.clone())
            .set_quote_escape_character(csv.quote_escape_character.clone())
            .set_comments(csv.comments.clone())
            .allow_quoted_record_delimiter(csv.allow_quoted_record_delimiter)
            .build()
    }
}

impl From<&JsonInput> for s3::JsonInput {
    fn from(json: &JsonInput) -> Self {
        let json_type = match json.json_type {
            JsonType::Document => s3::JsonType::Document,
            JsonType::Lines => s3::JsonType::Lines,
        };
        s3::JsonInput::builder().r#type(json_type).build()
    }
}

impl From<&OutputSerialization> for s3::OutputSerialization {
    fn from(output: &OutputSerialization) -> Self {
        match output {
            OutputSerialization::Csv(csv) => {
                let quote_fields = match csv.quote_fields {
                    QuoteFields::Always => s3::QuoteFields::Always,
                    QuoteFields::AsNeeded => s3::QuoteFields::Asneeded,
                };
                let csv = s3::CsvOutput::builder()
                    .quote_fields(quote_fields)
                    .set_record_delimiter(csv.record_delimiter.clone())
                    .set_field_delimiter(csv.field_delimiter.clone())
                    .set_quote_character(csv.quote_character.clone())
                    .set_quote_escape_character(csv.quote_escape_character.clone())
                    .build();
                s3::OutputSerialization::builder().csv(csv).build()
            }
            OutputSerialization::Json(json) => {
                let json = s3::JsonOutput::builder()
                    .set_record_delimiter(json.record_delimiter.clone())
                    .build();
                s3::OutputSerialization::builder().json(json).build()
            }
        }
    }
}
