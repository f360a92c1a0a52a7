//! ProPublica Campaign Finance API client
//!
//! Paginated GETs (20 records per page, `offset` query parameter) with a
//! static `X-API-Key` credential. Gateway hiccups are retried a fixed number
//! of times; any other non-200 answer fails the call immediately.

use async_trait::async_trait;
use chrono::NaiveDate;
use ietrack_common::models::Committee;
use ietrack_common::time::date_path;
use ietrack_common::Transaction;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Records per upstream page
pub const PAGE_SIZE: u32 = 20;
/// Body substring marking a retryable gateway failure (matched case-insensitively)
pub const TRANSIENT_MARKER: &str = "bad gateway";
/// Used when an error body carries no readable `message`
pub const MESSAGE_UNAVAILABLE: &str = "message unavailable";
const USER_AGENT: &str = concat!("ietrack/", env!("CARGO_PKG_VERSION"));

/// Upstream API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Upstream gateway still failing after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ApiError {
    /// Status code to surface to the caller, when the upstream gave one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Upstream resources; paths are never assembled from raw request strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `independent_expenditures/<y>/<m>/<d>.json`
    IndependentExpenditures(NaiveDate),
    /// `committees/<id>/independent_expenditures.json`
    CommitteeIndependentExpenditures(String),
    /// `filings/<y>/<m>/<d>.json`
    Filings(NaiveDate),
    /// `committees/<id>.json`
    Committee(String),
}

impl Endpoint {
    /// Path relative to the cycle-scoped API root
    pub fn path(&self) -> String {
        match self {
            Endpoint::IndependentExpenditures(date) => {
                format!("independent_expenditures/{}.json", date_path(*date))
            }
            Endpoint::CommitteeIndependentExpenditures(id) => {
                format!("committees/{}/independent_expenditures.json", id)
            }
            Endpoint::Filings(date) => format!("filings/{}.json", date_path(*date)),
            Endpoint::Committee(id) => format!("committees/{}.json", id),
        }
    }
}

/// Retry and pacing knobs
#[derive(Debug, Clone)]
pub struct ClientTuning {
    /// Total attempts per page when the gateway marker is seen
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Courtesy pause after each non-empty page
    pub page_delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientTuning {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(3),
            page_delay: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientTuning {
    /// Same budget, no waiting (tests and replays)
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Source of upstream result pages
///
/// `ProPublicaClient` is the production implementation; tests substitute
/// canned pages.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// One page of `results` starting at `offset`
    async fn fetch_page(&self, endpoint: &Endpoint, offset: u32) -> Result<Vec<Value>, ApiError>;

    /// Pause between consecutive non-empty pages
    fn page_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Every page of `endpoint`, until the first empty page
    ///
    /// Strictly sequential. Any page failure discards what was fetched so far.
    async fn fetch_all(&self, endpoint: &Endpoint) -> Result<Vec<Value>, ApiError> {
        let mut bucket = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(endpoint, offset).await?;
            if page.is_empty() {
                break;
            }

            tracing::debug!(
                endpoint = %endpoint.path(),
                offset,
                records = page.len(),
                "Fetched page"
            );
            bucket.extend(page);
            offset += PAGE_SIZE;

            let delay = self.page_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(bucket)
    }
}

/// All independent-expenditure records for one date, typed
pub async fn fetch_transactions(
    upstream: &dyn Upstream,
    date: NaiveDate,
) -> Result<Vec<Transaction>, ApiError> {
    let raw = upstream
        .fetch_all(&Endpoint::IndependentExpenditures(date))
        .await?;

    raw.into_iter()
        .map(|value| {
            Transaction::from_value(value)
                .map_err(|e| ApiError::ParseError(format!("malformed transaction record: {}", e)))
        })
        .collect()
}

/// Committee summary; `None` when the API knows no such committee
pub async fn fetch_committee(
    upstream: &dyn Upstream,
    committee_id: &str,
) -> Result<Option<Committee>, ApiError> {
    let page = upstream
        .fetch_page(&Endpoint::Committee(committee_id.to_string()), 0)
        .await?;

    match page.into_iter().next() {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ApiError::ParseError(e.to_string())),
        None => Ok(None),
    }
}

/// ProPublica API client
pub struct ProPublicaClient {
    http_client: reqwest::Client,
    api_root: String,
    api_key: String,
    tuning: ClientTuning,
}

impl ProPublicaClient {
    /// `api_root` is the cycle-scoped root, e.g. `https://.../v1/2024`
    pub fn new(api_root: String, api_key: String, tuning: ClientTuning) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(tuning.timeout)
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_root: api_root.trim_end_matches('/').to_string(),
            api_key,
            tuning,
        })
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}", self.api_root, endpoint.path())
    }
}

#[async_trait]
impl Upstream for ProPublicaClient {
    async fn fetch_page(&self, endpoint: &Endpoint, offset: u32) -> Result<Vec<Value>, ApiError> {
        let url = self.url_for(endpoint);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(url = %url, offset, attempt, "Querying ProPublica API");

            let response = self
                .http_client
                .get(&url)
                .header("X-API-Key", &self.api_key)
                .query(&[("offset", offset)])
                .send()
                .await
                .map_err(|e| ApiError::NetworkError(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ApiError::NetworkError(e.to_string()))?;

            // Gateway markers only count when the body is not a readable page
            let parsed = (status == StatusCode::OK).then(|| parse_results(&body));
            if !matches!(parsed, Some(Ok(_))) && is_transient(&body) {
                if attempt >= self.tuning.max_attempts {
                    tracing::error!(
                        url = %url,
                        attempts = attempt,
                        "Upstream gateway error persisted, giving up"
                    );
                    return Err(ApiError::RetriesExhausted { attempts: attempt });
                }
                tracing::warn!(
                    url = %url,
                    attempt,
                    status = status.as_u16(),
                    "Transient gateway error, retrying after {:?}",
                    self.tuning.retry_delay
                );
                tokio::time::sleep(self.tuning.retry_delay).await;
                continue;
            }

            return match parsed {
                Some(result) => result,
                None => Err(ApiError::Status {
                    code: status.as_u16(),
                    message: error_message(&body),
                }),
            };
        }
    }

    fn page_delay(&self) -> Duration {
        self.tuning.page_delay
    }
}

fn is_transient(body: &str) -> bool {
    body.to_ascii_lowercase().contains(TRANSIENT_MARKER)
}

/// `message` field of a JSON error body, or the fallback text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| MESSAGE_UNAVAILABLE.to_string())
}

/// `results` array of a successful response
fn parse_results(body: &str) -> Result<Vec<Value>, ApiError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ApiError::ParseError(e.to_string()))?;

    match value.get("results") {
        Some(Value::Array(results)) => Ok(results.clone()),
        Some(Value::Null) => Ok(Vec::new()),
        _ => Err(ApiError::ParseError(
            "response has no results array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_paths() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        assert_eq!(
            Endpoint::IndependentExpenditures(d).path(),
            "independent_expenditures/2024/03/03.json"
        );
        assert_eq!(
            Endpoint::CommitteeIndependentExpenditures("C00799031".into()).path(),
            "committees/C00799031/independent_expenditures.json"
        );
        assert_eq!(Endpoint::Filings(d).path(), "filings/2024/03/03.json");
        assert_eq!(Endpoint::Committee("C1".into()).path(), "committees/C1.json");
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(error_message(r#"{"status":"ERROR","message":"Bad key"}"#), "Bad key");
        assert_eq!(error_message("<html>nope</html>"), MESSAGE_UNAVAILABLE);
        assert_eq!(error_message(r#"{"message": 5}"#), MESSAGE_UNAVAILABLE);
    }

    #[test]
    fn test_transient_marker_case_insensitive() {
        assert!(is_transient("<h1>502 Bad Gateway</h1>"));
        assert!(is_transient("BAD GATEWAY"));
        assert!(!is_transient(r#"{"results": []}"#));
    }

    #[test]
    fn test_parse_results() {
        let ok = parse_results(r#"{"status":"OK","results":[{"unique_id":"a"}]}"#).unwrap();
        assert_eq!(ok, vec![json!({"unique_id": "a"})]);
        assert!(parse_results(r#"{"results": null}"#).unwrap().is_empty());
        assert!(matches!(parse_results(r#"{"status":"OK"}"#), Err(ApiError::ParseError(_))));
        assert!(matches!(parse_results("not json"), Err(ApiError::ParseError(_))));
    }

    #[test]
    fn test_client_creation_trims_root() {
        let client = ProPublicaClient::new(
            "http://127.0.0.1:1/v1/2024/".into(),
            "key".into(),
            ClientTuning::immediate(),
        )
        .unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            client.url_for(&Endpoint::Filings(d)),
            "http://127.0.0.1:1/v1/2024/filings/2024/01/05.json"
        );
    }

    #[test]
    fn test_default_tuning() {
        let t = ClientTuning::default();
        assert_eq!(t.max_attempts, 5);
        assert_eq!(t.retry_delay, Duration::from_secs(3));
        assert_eq!(t.timeout, Duration::from_secs(30));
        assert_eq!(t.page_delay, Duration::from_secs(3));
        assert!(ClientTuning::immediate().page_delay.is_zero());
    }

    /// Serves pages of the given sizes, noting when each was requested
    struct PacedUpstream {
        sizes: Vec<usize>,
        requested_at: std::sync::Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl Upstream for PacedUpstream {
        async fn fetch_page(&self, _endpoint: &Endpoint, offset: u32) -> Result<Vec<Value>, ApiError> {
            self.requested_at
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            let index = (offset / PAGE_SIZE) as usize;
            let size = self.sizes.get(index).copied().unwrap_or(0);
            Ok((0..size).map(|i| json!({"unique_id": format!("{}-{}", index, i)})).collect())
        }

        fn page_delay(&self) -> Duration {
            Duration::from_secs(3)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_pauses_after_each_non_empty_page() {
        let upstream = PacedUpstream {
            sizes: vec![20, 20, 5],
            requested_at: std::sync::Mutex::new(Vec::new()),
        };
        let start = tokio::time::Instant::now();

        let records = upstream
            .fetch_all(&Endpoint::Filings(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()))
            .await
            .unwrap();

        assert_eq!(records.len(), 45);
        let elapsed = start.elapsed();
        // three non-empty pages, nothing after the empty one
        assert!(elapsed >= Duration::from_secs(9), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(12), "elapsed {:?}", elapsed);

        let requested_at = upstream.requested_at.lock().unwrap();
        assert_eq!(requested_at.len(), 4);
        for pair in requested_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_empty_feed_does_not_pause() {
        let upstream = PacedUpstream {
            sizes: Vec::new(),
            requested_at: std::sync::Mutex::new(Vec::new()),
        };
        let start = tokio::time::Instant::now();

        let records = upstream
            .fetch_all(&Endpoint::Filings(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
