//! Transaction listings: stored rows, the live feed, and per-committee rows

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use std::fmt::Write as _;

use super::{parse_date, AppError};
use crate::client::{fetch_committee, Endpoint};
use crate::export::{csv_response, escape_html, render_html_table, render_page, Table};
use crate::reconcile::{
    fallback_records, linkify, load_with_fallback, shape, sort_values, to_values, DATA_COLUMNS,
    DISPLAY_COLUMNS,
};
use crate::store::RecordQuery;
use crate::sync::already_synced;
use crate::AppState;
use ietrack_common::DateField;

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    /// Listing date, `YYYY-MM-DD`; defaults to the business date
    pub date: Option<String>,
    /// List rows received in the trailing window instead of one date
    pub days: Option<u32>,
    #[serde(default)]
    pub download: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub download: bool,
}

/// HTML listing body; `values` are already in display order
fn listing_html(values: &[serde_json::Value]) -> String {
    render_html_table(&linkify(shape(Table::from_records(values), &DISPLAY_COLUMNS)))
}

fn fallback_note(date: &str) -> String {
    format!(
        "<p class=\"fallback\">No transactions for {}; showing the most recent stored records.</p>",
        escape_html(date)
    )
}

/// GET /
///
/// Stored rows for one date (or a received-date window), falling back to
/// the most recent rows when nothing matches.
pub async fn home(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Response, AppError> {
    let today = state.settings.today();
    let date = parse_date(query.date.as_deref(), today)?;

    let primary = match query.days {
        Some(days) if days > 0 => RecordQuery::ReceivedWithin { today: date, days },
        _ => RecordQuery::OnDate {
            field: DateField::Date,
            date,
        },
    };
    let listing =
        load_with_fallback(state.store.as_ref(), primary, date, state.settings.fallback).await?;
    let values = to_values(&listing.records);
    let date_label = date.format("%Y-%m-%d").to_string();

    if query.download {
        let table = shape(Table::from_records(&values), &DATA_COLUMNS);
        return Ok(csv_response(&format!("ie_{}.csv", date_label), &table));
    }

    let fresh = already_synced(state.store.as_ref(), today).await?;
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p class=\"banner\">{}</p>",
        if fresh {
            "New transactions today!"
        } else {
            "No new transactions yet today."
        }
    );
    if listing.fell_back {
        body.push_str(&fallback_note(&date_label));
    }
    let _ = write!(
        body,
        "\n<p><a href=\"/?date={}&amp;download=true\">Download CSV</a></p>\n",
        escape_html(&date_label)
    );
    body.push_str(&listing_html(&values));

    Ok(Html(render_page(
        &format!("Independent Expenditures for {}", date_label),
        &body,
    ))
    .into_response())
}

/// GET /live
///
/// Today's live feed; stored recent rows stand in when the feed is empty.
pub async fn live(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let today = state.settings.today();
    let mut values = state
        .upstream
        .fetch_all(&Endpoint::IndependentExpenditures(today))
        .await?;

    let fell_back = values.is_empty();
    if fell_back {
        let records = fallback_records(state.store.as_ref(), today, state.settings.fallback).await?;
        values = to_values(&records);
    } else {
        sort_values(&mut values);
    }

    let date_label = today.format("%Y-%m-%d").to_string();
    if query.download {
        let table = shape(Table::from_records(&values), &DATA_COLUMNS);
        return Ok(csv_response(&format!("ie_{}.csv", date_label), &table));
    }

    let mut body = String::new();
    if fell_back {
        body.push_str(&fallback_note(&date_label));
    }
    body.push_str("\n<p><a href=\"/live?download=true\">Download CSV</a></p>\n");
    body.push_str(&listing_html(&values));

    Ok(Html(render_page(&format!("Live feed for {}", date_label), &body)).into_response())
}

/// Committee ids are short uppercase alphanumerics (e.g. `C00799031`)
fn is_valid_committee_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 16 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// GET /committee/:committee_id
pub async fn committee(
    State(state): State<AppState>,
    Path(committee_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    if !is_valid_committee_id(&committee_id) {
        return Err(AppError::InvalidInput(format!(
            "committee id {:?}",
            committee_id
        )));
    }

    let mut values = state
        .upstream
        .fetch_all(&Endpoint::CommitteeIndependentExpenditures(
            committee_id.clone(),
        ))
        .await?;
    sort_values(&mut values);

    if query.download {
        let table = shape(Table::from_records(&values), &DATA_COLUMNS);
        return Ok(csv_response(&format!("{}_ie.csv", committee_id), &table));
    }

    // The committee name only decorates the heading
    let name = match fetch_committee(state.upstream.as_ref(), &committee_id).await {
        Ok(found) => found.and_then(|c| c.name),
        Err(e) => {
            tracing::warn!(committee_id = %committee_id, error = %e, "Committee lookup failed");
            None
        }
    };
    let title = match name {
        Some(name) => format!("{} ({})", name, committee_id),
        None => committee_id.clone(),
    };

    let mut body = format!(
        "<p><a href=\"/committee/{}?download=true\">Download CSV</a></p>\n",
        escape_html(&committee_id)
    );
    body.push_str(&render_html_table(&linkify(shape(
        Table::from_records(&values),
        &DATA_COLUMNS,
    ))));

    Ok(Html(render_page(
        &format!("Independent expenditures by {}", title),
        &body,
    ))
    .into_response())
}
