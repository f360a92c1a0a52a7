//! Presentation and export: HTML fragments and CSV payloads
//!
//! Everything renders from [`Table`], a loosely-typed grid built from JSON
//! records, so live API rows and stored rows share one path.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::fmt::Write as _;
use std::mem::take;

/// One rendered cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    /// Clickable cell; `text` is the raw value and is what CSV exports
    Link { href: String, text: String },
}

impl Cell {
    /// Raw textual value
    pub fn text(&self) -> &str {
        match self {
            Cell::Empty => "",
            Cell::Text(t) => t,
            Cell::Link { text, .. } => text,
        }
    }

    fn from_value(value: Option<&Value>) -> Cell {
        match value {
            None | Some(Value::Null) => Cell::Empty,
            Some(Value::String(s)) if s.is_empty() => Cell::Empty,
            Some(Value::String(s)) => Cell::Text(s.clone()),
            Some(other) => Cell::Text(other.to_string()),
        }
    }
}

/// Column-named grid of cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build from JSON objects; columns are the union of keys in first-seen order
    pub fn from_records(records: &[Value]) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            if let Value::Object(map) = record {
                for key in map.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| Cell::from_value(record.get(col)))
                    .collect()
            })
            .collect();

        Table { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in column `name`
    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a constant-valued column
    pub fn with_constant_column(mut self, name: &str, value: &str) -> Table {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Text(value.to_string()));
        }
        self
    }
}

/// Stack labeled tables into one, tagging every row with its label
///
/// A single table is returned as-is. Columns are the union across tables.
pub fn combine_labeled(labeled: Vec<(String, Table)>, label_column: &str) -> Table {
    if labeled.len() == 1 {
        return labeled.into_iter().next().map(|(_, t)| t).unwrap_or_default();
    }

    let mut columns: Vec<String> = Vec::new();
    for (_, table) in &labeled {
        for col in &table.columns {
            if !columns.contains(col) {
                columns.push(col.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for (label, table) in labeled {
        let positions: Vec<Option<usize>> =
            columns.iter().map(|col| table.column_index(col)).collect();
        for row in table.rows {
            let mut out: Vec<Cell> = positions
                .iter()
                .map(|pos| {
                    pos.and_then(|i| row.get(i).cloned())
                        .unwrap_or(Cell::Empty)
                })
                .collect();
            out.push(Cell::Text(label.clone()));
            rows.push(out);
        }
    }

    columns.push(label_column.to_string());
    Table { columns, rows }
}

/* ---------------- HTML ---------------- */

/// Escape text for HTML element and attribute content
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Shown instead of an empty table
pub const NO_RESULTS_HTML: &str = r#"<p class="no-results">No results</p>"#;

/// HTML `<table>` fragment, or the no-results indicator for an empty table
pub fn render_html_table(table: &Table) -> String {
    if table.is_empty() {
        return NO_RESULTS_HTML.to_string();
    }

    let mut html = String::from("<table class=\"dataframe\">\n<thead><tr>");
    for col in &table.columns {
        let _ = write!(html, "<th>{}</th>", escape_html(col));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            match cell {
                Cell::Empty => html.push_str("<td></td>"),
                Cell::Text(t) => {
                    let _ = write!(html, "<td>{}</td>", escape_html(t));
                }
                Cell::Link { href, text } => {
                    let _ = write!(
                        html,
                        "<td><a href=\"{}\" target=\"_blank\">{}</a></td>",
                        escape_html(href),
                        escape_html(text)
                    );
                }
            }
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>");
    html
}

/// Minimal standalone page around a body fragment
pub fn render_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
        body = body
    )
}

/* ---------------- CSV ---------------- */

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row(out: &mut String, row: &[&str]) {
    let mut first = true;
    for cell in row {
        if !first {
            out.push(',');
        }
        first = false;
        if needs_quotes(cell) {
            let _ = write!(out, "\"{}\"", cell.replace('"', "\"\""));
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// CSV text with a header row; an empty table yields only the header
pub fn to_csv(table: &Table) -> String {
    let mut out = String::new();
    let header: Vec<&str> = table.columns.iter().map(String::as_str).collect();
    write_row(&mut out, &header);
    for row in &table.rows {
        let cells: Vec<&str> = row.iter().map(Cell::text).collect();
        write_row(&mut out, &cells);
    }
    out
}

/// Parse CSV text (quotes and CRLF tolerant) into rows of fields
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// `text/csv` attachment response
pub fn csv_response(filename: &str, table: &Table) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        to_csv(table),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_records(&[
            json!({"unique_id": "a", "payee": "Acme, Inc.", "amount": 10.5}),
            json!({"unique_id": "b", "purpose": "Said \"hi\"", "payee": null}),
        ])
    }

    #[test]
    fn test_from_records_column_union() {
        let t = sample();
        assert_eq!(t.columns, vec!["unique_id", "payee", "amount", "purpose"]);
        assert_eq!(t.cell(0, "amount"), Some(&Cell::Text("10.5".into())));
        assert_eq!(t.cell(1, "payee"), Some(&Cell::Empty));
        assert_eq!(t.cell(0, "purpose"), Some(&Cell::Empty));
    }

    #[test]
    fn test_csv_quoting_round_trip() {
        let csv = to_csv(&sample());
        let parsed = parse_csv(&csv);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], vec!["unique_id", "payee", "amount", "purpose"]);
        assert_eq!(parsed[1][1], "Acme, Inc.");
        assert_eq!(parsed[2][3], "Said \"hi\"");
    }

    #[test]
    fn test_csv_empty_table_is_header_only() {
        let table = Table {
            columns: vec!["a".into(), "b".into()],
            rows: vec![],
        };
        assert_eq!(to_csv(&table), "a,b\n");
    }

    #[test]
    fn test_links_export_raw_value() {
        let table = Table {
            columns: vec!["fec_committee_id".into()],
            rows: vec![vec![Cell::Link {
                href: "https://www.fec.gov/data/committee/C1/".into(),
                text: "C1".into(),
            }]],
        };
        assert_eq!(to_csv(&table), "fec_committee_id\nC1\n");
        assert!(render_html_table(&table)
            .contains("<a href=\"https://www.fec.gov/data/committee/C1/\" target=\"_blank\">C1</a>"));
    }

    #[test]
    fn test_html_escapes_and_no_results() {
        let table = Table::from_records(&[json!({"payee": "<script>"})]);
        let html = render_html_table(&table);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));

        assert_eq!(render_html_table(&Table::default()), NO_RESULTS_HTML);
    }

    #[test]
    fn test_combine_labeled_adds_query_column() {
        let a = Table::from_records(&[json!({"unique_id": "1"})]);
        let b = Table::from_records(&[json!({"unique_id": "2", "extra": "x"})]);

        let combined = combine_labeled(vec![("date".into(), a), ("api".into(), b)], "query");

        assert_eq!(combined.columns, vec!["unique_id", "extra", "query"]);
        assert_eq!(combined.rows.len(), 2);
        assert_eq!(combined.cell(0, "query"), Some(&Cell::Text("date".into())));
        assert_eq!(combined.cell(0, "extra"), Some(&Cell::Empty));
        assert_eq!(combined.cell(1, "query"), Some(&Cell::Text("api".into())));
    }

    #[test]
    fn test_combine_aligns_differently_ordered_columns() {
        let a = Table::from_records(&[json!({"payee": "P1", "unique_id": "1"})]);
        let b = Table::from_records(&[
            json!({"unique_id": "2", "amount": "5", "payee": "P2"}),
            json!({"unique_id": "3"}),
        ]);

        let combined = combine_labeled(vec![("date".into(), a), ("api".into(), b)], "query");

        assert_eq!(combined.columns, vec!["payee", "unique_id", "amount", "query"]);
        assert_eq!(combined.rows.len(), 3);
        assert_eq!(combined.cell(0, "unique_id"), Some(&Cell::Text("1".into())));
        assert_eq!(combined.cell(1, "payee"), Some(&Cell::Text("P2".into())));
        assert_eq!(combined.cell(1, "amount"), Some(&Cell::Text("5".into())));
        assert_eq!(combined.cell(2, "payee"), Some(&Cell::Empty));
        assert_eq!(combined.cell(2, "query"), Some(&Cell::Text("api".into())));
    }

    #[test]
    fn test_combine_single_table_unchanged() {
        let a = Table::from_records(&[json!({"unique_id": "1"})]);
        let combined = combine_labeled(vec![("date".into(), a.clone())], "query");
        assert_eq!(combined, a);
    }

    #[test]
    fn test_parse_csv_crlf_and_trailing_row() {
        let rows = parse_csv("a,b\r\n1,2\r\n3,4");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"], vec!["3", "4"]]);
    }
}
