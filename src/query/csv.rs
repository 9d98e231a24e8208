//! CSV rendering for grid exports.

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::{Map, Value as JsonValue};

use crate::config::ColumnConfig;
use crate::error::{GridError, GridResult};

/// Render rows as CSV: a header of column labels, then one line per row in
/// column order. Lines are `\n`-separated with no trailing newline.
///
/// Quoting follows the JSON type of each cell, not its text: strings are
/// always quoted, numbers and booleans never are, and null is empty.
pub fn export_csv(columns: &[ColumnConfig], rows: &[Map<String, JsonValue>]) -> GridResult<String> {
    // Cells arrive already quoted
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let write_err = |e: csv::Error| GridError::Validation(format!("Failed to write CSV: {}", e));

    writer
        .write_record(columns.iter().map(|c| quoted(&c.label)))
        .map_err(write_err)?;

    for row in rows {
        let record: Vec<String> = columns.iter().map(|c| cell(row.get(&c.id))).collect();
        writer.write_record(&record).map_err(write_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| GridError::Validation(format!("Failed to flush CSV: {}", e)))?;
    let mut out = String::from_utf8(bytes)
        .map_err(|e| GridError::Validation(format!("CSV is not valid UTF-8: {}", e)))?;
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => quoted(s),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(nested) => quoted(&nested.to_string()),
    }
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnType;
    use serde_json::json;

    fn column(id: &str, label: &str, column_type: ColumnType) -> ColumnConfig {
        ColumnConfig {
            id: id.into(),
            label: label.into(),
            column_type,
            width: None,
            min_width: None,
            max_width: None,
            pinned: None,
            editable: false,
            options: None,
            required_permissions: vec![],
        }
    }

    fn columns() -> Vec<ColumnConfig> {
        vec![
            column("id", "ID", ColumnType::Number),
            column("name", "Name", ColumnType::String),
        ]
    }

    #[test]
    fn test_header_and_rows() {
        let rows: Vec<_> = [json!({"id": 1, "name": "Ada"}), json!({"id": 2, "name": "Bob"})]
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();

        let out = export_csv(&columns(), &rows).unwrap();
        assert_eq!(out, "\"ID\",\"Name\"\n1,\"Ada\"\n2,\"Bob\"");
        assert_eq!(out.lines().count(), rows.len() + 1);
    }

    #[test]
    fn test_quotes_are_doubled() {
        let rows = vec![json!({"id": 3, "name": "The \"Boss\""}).as_object().cloned().unwrap()];
        let out = export_csv(&columns(), &rows).unwrap();
        assert!(out.ends_with("3,\"The \"\"Boss\"\"\""));
    }

    #[test]
    fn test_missing_values_are_empty() {
        let rows = vec![json!({"id": 4}).as_object().cloned().unwrap()];
        let out = export_csv(&columns(), &rows).unwrap();
        assert_eq!(out.lines().nth(1), Some("4,"));

        let rows = vec![json!({"id": null, "name": null}).as_object().cloned().unwrap()];
        assert_eq!(export_csv(&columns(), &rows).unwrap().lines().nth(1), Some(","));
    }

    #[test]
    fn test_quoting_follows_json_type() {
        let columns = vec![
            column("zip", "Zip", ColumnType::String),
            column("active", "Active", ColumnType::Boolean),
            column("score", "Score", ColumnType::Number),
        ];
        let rows = vec![
            json!({"zip": "02134", "active": true, "score": 1.5}).as_object().cloned().unwrap(),
            json!({"zip": "true", "active": false, "score": -3}).as_object().cloned().unwrap(),
        ];

        let out = export_csv(&columns, &rows).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "\"Zip\",\"Active\",\"Score\"");
        assert_eq!(lines[1], "\"02134\",true,1.5");
        assert_eq!(lines[2], "\"true\",false,-3");
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(export_csv(&columns(), &[]).unwrap(), "\"ID\",\"Name\"");
    }
}
