//! # Data Records
//!
//! A record is one row of card data: a JSON object mapping field names to
//! strings, numbers, arrays or nested objects. Records arrive either as a
//! JSON array of objects or as a CSV file with a header row.
//!
//! CSV parsing is deliberately simple and matches what the editor has always
//! accepted: split on newlines, then on commas. There is no quoting, so a
//! comma inside a value always starts a new column.

use serde_json::{Map, Value};

use crate::error::{CardpressError, Result};

/// One card's data.
pub type Record = Map<String, Value>;

/// Supported record file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Csv,
}

impl RecordFormat {
    /// Pick a format from a file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".json") {
            Some(RecordFormat::Json)
        } else if lower.ends_with(".csv") {
            Some(RecordFormat::Csv)
        } else {
            None
        }
    }
}

/// Parse records from a file's text, choosing the parser by file name.
pub fn parse_records_file(file_name: &str, text: &str) -> Result<Vec<Record>> {
    match RecordFormat::from_file_name(file_name) {
        Some(RecordFormat::Json) => parse_json_records(text),
        Some(RecordFormat::Csv) => Ok(parse_csv_records(text)),
        None => Err(CardpressError::Record(format!(
            "unsupported record file '{}': expected .json or .csv",
            file_name
        ))),
    }
}

/// Parse a JSON array of objects.
pub fn parse_json_records(text: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CardpressError::Record(format!("invalid JSON: {}", e)))?;
    records_from_value(value)
}

/// Convert an already-parsed JSON value into records.
pub fn records_from_value(value: Value) -> Result<Vec<Record>> {
    let Value::Array(items) = value else {
        return Err(CardpressError::Record("JSON must be an array".into()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(CardpressError::Record(format!(
                "records[{}]: expected object, got {}",
                i, other
            ))),
        })
        .collect()
}

/// Parse CSV text with a header row.
///
/// Blank lines are ignored, headers and values are trimmed, and rows shorter
/// than the header get empty strings for the missing trailing columns.
/// Extra values beyond the header are dropped.
pub fn parse_csv_records(text: &str) -> Vec<Record> {
    let mut lines = text.split('\n').filter(|line| !line.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header_line.split(',').map(str::trim).collect();

    lines
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = values.get(i).copied().unwrap_or("");
                    (header.to_string(), Value::String(value.to_string()))
                })
                .collect()
        })
        .collect()
}

/// Convert a field value to display text.
///
/// Strings are used verbatim, numbers print without a trailing `.0`,
/// arrays join their items with `", "`, objects serialize to compact JSON,
/// and `null` becomes the empty string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) => format_f64(f),
        None => n.to_string(),
    }
}

/// Format a float the way a card author expects to see it: `3` not `3.0`.
pub fn format_f64(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Every field name used by any record, in first-seen order.
///
/// The editor offers these when binding an element to a field.
pub fn field_names(records: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn csv_header_zip_and_missing_trailing_values() {
        let csv = "name, hp ,tier\nAda,80,gold\n\nBob,20\n";
        let records = parse_csv_records(csv);
        assert_eq!(records.len(), 2);
        assert_eq!(Value::Object(records[0].clone()), json!({"name": "Ada", "hp": "80", "tier": "gold"}));
        assert_eq!(Value::Object(records[1].clone()), json!({"name": "Bob", "hp": "20", "tier": ""}));
    }

    #[test]
    fn csv_handles_crlf_and_no_quoting() {
        let records = parse_csv_records("a,b\r\n\"x,y\",z\r\n");
        assert_eq!(records[0]["a"], "\"x");
        assert_eq!(records[0]["b"], "y\"");
    }

    #[test]
    fn csv_empty_input() {
        assert!(parse_csv_records("").is_empty());
        assert!(parse_csv_records("just,headers\n").is_empty());
    }

    #[test]
    fn json_records_must_be_array_of_objects() {
        assert!(parse_json_records(r#"{"name": "Ada"}"#).is_err());
        assert!(parse_json_records("[1, 2]").is_err());
        assert!(parse_json_records("{oops").is_err());
        let ok = parse_json_records(r#"[{"name": "Ada", "tags": ["a", "b"]}]"#).unwrap();
        assert_eq!(ok[0]["tags"], json!(["a", "b"]));
    }

    #[test]
    fn file_name_picks_parser() {
        assert_eq!(parse_records_file("cards.CSV", "n\nx").unwrap().len(), 1);
        assert_eq!(parse_records_file("cards.json", "[]").unwrap().len(), 0);
        assert!(parse_records_file("cards.xlsx", "").is_err());
    }

    #[test]
    fn value_stringification() {
        assert_eq!(value_to_string(&json!(null)), "");
        assert_eq!(value_to_string(&json!("x")), "x");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(2.5)), "2.5");
        assert_eq!(value_to_string(&json!(3.0)), "3");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(["fire", 2, null])), "fire, 2, ");
        assert_eq!(value_to_string(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn field_names_first_seen_order() {
        let records = parse_json_records(r#"[{"b": 1, "a": 2}, {"c": 3, "a": 4}]"#).unwrap();
        let names = field_names(&records);
        assert!(names.contains(&"a".to_string()));
        assert_eq!(names.len(), 3);
        assert_eq!(names.last().map(String::as_str), Some("c"));
    }
}
