//! Export response formats
//!
//! Format negotiation for the export endpoint and the serialization of a
//! materialized result set into CSV or JSON bodies. Both serializers preserve
//! the column order and row order the query produced.

use crate::core::error::{ExportError, Result};
use crate::db::ResultSet;
use rusqlite::types::Value;
use std::collections::HashMap;

/// Requested output format for the export endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Negotiate the output format from the request query parameters.
    ///
    /// Absent or empty means CSV. Anything other than `csv` or `json` is
    /// rejected before any database work, rather than silently falling back.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        match params.get("format").map(|f| f.trim().to_ascii_lowercase()) {
            None => Ok(ExportFormat::Csv),
            Some(f) if f.is_empty() || f == "csv" => Ok(ExportFormat::Csv),
            Some(f) if f == "json" => Ok(ExportFormat::Json),
            Some(other) => Err(ExportError::ValidationError(format!(
                "unsupported format: {} (expected csv or json)",
                other
            ))),
        }
    }
}

/// Serialize a result set as CSV: a header row of column names followed by
/// the data rows. An empty result set yields the header row alone.
pub fn to_csv(result: &ResultSet) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&result.columns)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    for row in &result.rows {
        writer
            .write_record(row.iter().map(csv_field))
            .map_err(|e| ExportError::SerializationError(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::SerializationError(e.to_string()))
}

/// Render one SQL value as a CSV field. NULL becomes the empty field.
fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => t.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Serialize a result set as a JSON array of objects mapping column name to
/// value. An empty result set yields an empty array.
pub fn to_json_rows(result: &ResultSet) -> Vec<serde_json::Value> {
    result
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(json_value))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect()
}

/// Convert one SQL value into its JSON representation, preserving NULLs and
/// numeric types
fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => (*i).into(),
        Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(Into::into)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(t) => t.clone().into(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ResultSet {
        ResultSet {
            columns: vec![
                "district".to_string(),
                "school_name".to_string(),
                "total_students".to_string(),
            ],
            rows: vec![
                vec![
                    Value::Text("CHIRANG".to_string()),
                    Value::Text("Bijni LP School".to_string()),
                    Value::Integer(120),
                ],
                vec![
                    Value::Text("BAKSA".to_string()),
                    Value::Text("School, with \"comma\"".to_string()),
                    Value::Null,
                ],
            ],
        }
    }

    #[test]
    fn test_format_defaults_to_csv() {
        assert_eq!(
            ExportFormat::from_params(&HashMap::new()).unwrap(),
            ExportFormat::Csv
        );

        let mut params = HashMap::new();
        params.insert("format".to_string(), String::new());
        assert_eq!(
            ExportFormat::from_params(&params).unwrap(),
            ExportFormat::Csv
        );
    }

    #[test]
    fn test_format_json_case_insensitive() {
        let mut params = HashMap::new();
        params.insert("format".to_string(), "JSON".to_string());
        assert_eq!(
            ExportFormat::from_params(&params).unwrap(),
            ExportFormat::Json
        );
    }

    #[test]
    fn test_unrecognized_format_is_rejected() {
        let mut params = HashMap::new();
        params.insert("format".to_string(), "xml".to_string());

        let err = ExportFormat::from_params(&params).unwrap_err();
        assert!(matches!(err, ExportError::ValidationError(_)));
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_csv_serialization() {
        let bytes = to_csv(&sample_result()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("district,school_name,total_students"));
        assert_eq!(lines.next(), Some("CHIRANG,Bijni LP School,120"));
        // Fields with commas and quotes are quoted, NULL is empty
        assert_eq!(lines.next(), Some("BAKSA,\"School, with \"\"comma\"\"\","));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_result_set_is_header_only_csv() {
        let result = ResultSet {
            columns: vec!["district".to_string(), "block".to_string()],
            rows: vec![],
        };

        let bytes = to_csv(&result).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "district,block\n");
    }

    #[test]
    fn test_json_serialization() {
        let rows = to_json_rows(&sample_result());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["district"], "CHIRANG");
        assert_eq!(rows[0]["total_students"], 120);
        assert_eq!(rows[1]["total_students"], serde_json::Value::Null);
    }

    #[test]
    fn test_empty_result_set_is_empty_json_array() {
        let result = ResultSet {
            columns: vec!["district".to_string()],
            rows: vec![],
        };

        assert!(to_json_rows(&result).is_empty());
    }

    #[test]
    fn test_csv_and_json_agree_on_values_and_order() {
        let result = sample_result();
        let json_rows = to_json_rows(&result);
        let csv_text = String::from_utf8(to_csv(&result).unwrap()).unwrap();

        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();

        for (record, json_row) in reader.records().map(|r| r.unwrap()).zip(json_rows.iter()) {
            for (column, field) in headers.iter().zip(record.iter()) {
                let json_field = &json_row[column];
                let json_as_string = match json_field {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                assert_eq!(field, json_as_string);
            }
        }
    }
}
