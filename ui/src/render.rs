use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use db::DatabaseResult;
use serde_json::Value;

/// Render query results as a terminal table.
pub fn results_table(result: &DatabaseResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(result.headers.iter().map(|(name, _)| name.as_str()));

    for row in &result.rows {
        table.add_row(row.iter().map(cell));
    }

    table
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Column list of a table as shown to the model, e.g. `` `id` int4, `name` text ``.
pub fn schema_line(columns: &[(String, String)]) -> String {
    columns
        .iter()
        .map(|(name, ty)| format!("`{name}` {ty}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_headers_and_nulls() {
        let result = DatabaseResult {
            headers: vec![
                ("Player".to_string(), "TEXT".to_string()),
                ("No.".to_string(), "INT4".to_string()),
            ],
            rows: vec![vec![json!("Antonio Lang"), Value::Null]],
        };

        let rendered = results_table(&result).to_string();
        assert!(rendered.contains("Player"));
        assert!(rendered.contains("Antonio Lang"));
        assert!(rendered.contains("NULL"));
    }

    #[test]
    fn schema_line_quotes_names() {
        let columns = vec![
            ("id".to_string(), "int4".to_string()),
            ("Years in Toronto".to_string(), "text".to_string()),
        ];
        assert_eq!(schema_line(&columns), "`id` int4, `Years in Toronto` text");
    }
}
