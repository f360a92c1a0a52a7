//! 24/48-hour filings listing and scraped details

use axum::{
    extract::{Query, State},
    response::Html,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_date, AppError};
use crate::export::{render_html_table, render_page, Table};
use crate::filings::{daily_filings, detail_urls, scrape_filings};
use crate::reconcile::linkify;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FilingsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailsQuery {
    pub token: Option<String>,
}

/// GET /filings
///
/// The day's F6/F24 filings, plus a one-time link to their scraped details.
pub async fn daily(
    State(state): State<AppState>,
    Query(query): Query<FilingsQuery>,
) -> Result<Html<String>, AppError> {
    let date = parse_date(query.date.as_deref(), state.settings.today())?;
    let filings = daily_filings(state.upstream.as_ref(), date).await?;
    let urls = detail_urls(&filings);

    let mut body = String::new();
    if !urls.is_empty() {
        let count = urls.len();
        let token = state.form_cache.insert(urls).await;
        tracing::debug!(%token, count, "Stored filing detail URLs");
        body.push_str(&format!(
            "<p><a href=\"/filings/details?token={}\">View {} filing details</a></p>\n",
            token, count
        ));
    }
    body.push_str(&render_html_table(&linkify(Table::from_records(&filings))));

    let title = format!("24- and 48- Hour Filings for {}", date.format("%Y-%m-%d"));
    Ok(Html(render_page(&title, &body)))
}

/// GET /filings/details
pub async fn details(
    State(state): State<AppState>,
    Query(query): Query<DetailsQuery>,
) -> Result<Html<String>, AppError> {
    let raw = query
        .token
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput("token is required".to_string()))?;
    let token = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidInput(format!("malformed token {:?}", raw)))?;

    let urls = state
        .form_cache
        .take(token)
        .await
        .ok_or_else(|| AppError::NotFound("token unknown or expired".to_string()))?;

    let rows = scrape_filings(state.scraper.as_ref(), &urls).await;
    let table = linkify(Table::from_records(&rows));

    Ok(Html(render_page(
        "24- and 48- Hour Filing Details",
        &render_html_table(&table),
    )))
}
