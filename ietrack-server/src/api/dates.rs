//! Multi-source date query

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use std::fmt::Write as _;

use super::{parse_date, AppError};
use crate::export::{combine_labeled, csv_response, escape_html, render_html_table, render_page};
use crate::reconcile::{linkify, query_by_categories, shape, Category, DATA_COLUMNS};
use crate::AppState;

/// Column tagging each exported row with its source category
pub const QUERY_COLUMN: &str = "query";
pub const DATES_CSV_FILENAME: &str = "date_data.csv";

#[derive(Debug, Default, Deserialize)]
pub struct DatesQuery {
    pub date: Option<String>,
    /// Comma-separated subset of `api,date,date_received,dissemination_date`
    pub categories: Option<String>,
    #[serde(default)]
    pub download: bool,
}

/// GET /dates
///
/// One result set per requested category for a required date.
pub async fn by_date(
    State(state): State<AppState>,
    Query(query): Query<DatesQuery>,
) -> Result<Response, AppError> {
    let raw_date = query
        .date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("date is required".to_string()))?;
    let date = parse_date(Some(raw_date), state.settings.today())?;
    let categories =
        Category::parse_list(query.categories.as_deref()).map_err(AppError::InvalidInput)?;

    let labeled = query_by_categories(
        state.store.as_ref(),
        state.upstream.as_ref(),
        &categories,
        date,
    )
    .await?;
    let shaped: Vec<(String, _)> = labeled
        .into_iter()
        .map(|(label, table)| (label, shape(table, &DATA_COLUMNS)))
        .collect();

    if query.download {
        let combined = combine_labeled(shaped, QUERY_COLUMN);
        return Ok(csv_response(DATES_CSV_FILENAME, &combined));
    }

    let date_label = date.format("%Y-%m-%d").to_string();
    let labels: Vec<&str> = categories.iter().map(Category::label).collect();
    let mut body = format!(
        "<p><a href=\"/dates?date={}&amp;categories={}&amp;download=true\">Download CSV</a></p>\n",
        escape_html(&date_label),
        labels.join(",")
    );
    for (label, table) in shaped {
        let _ = writeln!(
            body,
            "<h2>{} ({} rows)</h2>\n{}",
            escape_html(&label),
            table.len(),
            render_html_table(&linkify(table))
        );
    }

    Ok(Html(render_page(
        &format!("Independent expenditures dated {}", date_label),
        &body,
    ))
    .into_response())
}
