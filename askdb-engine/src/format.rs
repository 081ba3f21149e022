//! Tabular text rendering for query results.

use serde_json::Value;

/// Result-table cells longer than this are truncated with a trailing
/// ellipsis marker.
const MAX_CELL_LEN: usize = 50;

/// Textual form of one value. Missing fields arrive as `Null` and render
/// as an empty cell; nested structures render as their serialized JSON
/// form -- result tables show full values, unlike the schema preview.
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        other => other.to_string(),
    }
}

/// Truncate to `max` characters, replacing the tail with `...`.
pub(crate) fn clip(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

/// Escape literal table delimiters so a cell value cannot be mistaken
/// for a column boundary.
fn escape_delimiters(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Render records as a markdown table: header row, separator row, one
/// body row per record, values aligned to `columns`.
pub fn markdown_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    let header = format!("| {} |", columns.join(" | "));
    let separator = format!("| {} |", vec!["---"; columns.len()].join(" | "));

    let mut out = vec![header, separator];
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| escape_delimiters(&clip(&cell_text(value), MAX_CELL_LEN)))
            .collect();
        out.push(format!("| {} |", cells.join(" | ")));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn body_row_count_matches_records_and_header_matches_columns() {
        let columns = cols(&["id", "name"]);
        let rows = vec![
            vec![json!(1), json!("alpha")],
            vec![json!(2), json!("beta")],
            vec![json!(3), json!("gamma")],
        ];
        let table = markdown_table(&columns, &rows);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 2 + rows.len());
        assert_eq!(lines[0].matches(" | ").count() + 1, columns.len());
        assert_eq!(lines[1], "| --- | --- |");
    }

    #[test]
    fn long_values_are_truncated_with_ellipsis() {
        let long = "x".repeat(80);
        let table = markdown_table(&cols(&["v"]), &[vec![json!(long)]]);
        let body = table.lines().nth(2).unwrap();
        assert!(body.contains(&format!("{}...", "x".repeat(47))));
        assert!(!body.contains(&"x".repeat(48)));
    }

    #[test]
    fn pipe_characters_are_escaped_inside_cells() {
        let table = markdown_table(&cols(&["v"]), &[vec![json!("a|b")]]);
        assert!(table.lines().nth(2).unwrap().contains("a\\|b"));
    }

    #[test]
    fn missing_fields_render_as_empty_cells() {
        let table = markdown_table(
            &cols(&["a", "b"]),
            &[vec![json!(1), Value::Null]],
        );
        assert_eq!(table.lines().nth(2).unwrap(), "| 1 |  |");
    }

    #[test]
    fn nested_values_render_serialized() {
        let table = markdown_table(
            &cols(&["v"]),
            &[vec![json!({"city": "Pune", "zip": "411001"})]],
        );
        let body = table.lines().nth(2).unwrap();
        assert!(body.contains(r#"{"city":"Pune","zip":"411001"}"#));
        assert!(!body.contains("complex structure"));
    }

    #[test]
    fn empty_record_set_still_renders_header_and_separator() {
        let table = markdown_table(&cols(&["a", "b"]), &[]);
        assert_eq!(table, "| a | b |\n| --- | --- |");
    }
}
