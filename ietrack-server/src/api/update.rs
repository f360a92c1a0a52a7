//! Manual sync trigger

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{parse_date, AppError};
use crate::sync::{SyncOptions, SyncOutcome};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    /// Date to sync; defaults to the business date
    pub date: Option<String>,
    /// Send a notification for new rows (default true)
    pub notify: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

fn summary(outcome: &SyncOutcome) -> String {
    match outcome.inserted {
        0 => "No new transactions.".to_string(),
        n => format!("Successfully updated with {} new transactions.", n),
    }
}

/// GET|POST /update
pub async fn trigger_sync(
    State(state): State<AppState>,
    Query(query): Query<UpdateQuery>,
) -> Result<Json<UpdateResponse>, AppError> {
    let date = parse_date(query.date.as_deref(), state.settings.today())?;
    let options = SyncOptions {
        notify: query.notify.unwrap_or(true),
    };

    let outcome = state.pipeline.run(date, options).await?;
    Ok(Json(UpdateResponse {
        message: summary(&outcome),
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_summary_text() {
        let mut outcome = SyncOutcome {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            fetched: 3,
            inserted: 0,
            notified: false,
        };
        assert_eq!(summary(&outcome), "No new transactions.");
        outcome.inserted = 2;
        assert_eq!(summary(&outcome), "Successfully updated with 2 new transactions.");
    }
}
