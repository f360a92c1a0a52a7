//! Handler error type and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::client::ApiError;
use crate::reconcile::QueryError;
use crate::sync::SyncError;

/// Errors surfaced by HTTP handlers
#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    NotFound(String),
    Conflict(String),
    Upstream(ApiError),
    Store(String),
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        AppError::Upstream(e)
    }
}

impl From<ietrack_common::Error> for AppError {
    fn from(e: ietrack_common::Error) -> Self {
        use ietrack_common::Error;
        match e {
            Error::InvalidInput(msg) => AppError::InvalidInput(msg),
            Error::NotFound(msg) => AppError::NotFound(msg),
            Error::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Upstream(e) => e.into(),
            QueryError::Store(e) => e.into(),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Upstream(e) => e.into(),
            SyncError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Invalid input: {}", msg) }),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Not found: {}", msg) }),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                json!({ "error": format!("Conflict: {}", msg) }),
            ),
            AppError::Upstream(e) => {
                tracing::warn!(error = %e, "Upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "error": e.to_string(),
                        "upstream_status": e.status_code(),
                    }),
                )
            }
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("Store error: {}", msg) }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                AppError::Upstream(ApiError::RetriesExhausted { attempts: 5 }),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let e: AppError = SyncError::Store(ietrack_common::Error::Conflict("dup".into())).into();
        assert!(matches!(e, AppError::Conflict(_)));
    }
}
