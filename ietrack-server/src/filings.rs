//! 24/48-hour filings
//!
//! The daily filings feed lists expedited reports (forms F6 and F24) before
//! they reach the expenditure feed. Their details only exist on the
//! regulator's HTML pages, which are scraped here on demand.

use crate::client::{ApiError, Endpoint, Upstream};
use async_trait::async_trait;
use chrono::NaiveDate;
use ietrack_common::models::{FormType, QuickFiling};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Form types reported in the daily filings listing
pub const QUICK_FORM_TYPES: [&str; 2] = ["F6", "F24"];
/// Page text identifying a 48-hour notice
pub const FORTY_EIGHT_MARKER: &str = "48 HOUR NOTICE";

const USER_AGENT: &str = concat!("ietrack/", env!("CARGO_PKG_VERSION"));
/// Default spacing between detail-page requests
pub const SCRAPE_INTERVAL: Duration = Duration::from_millis(1000);

/// Labels preceding each field on a detail page, in page order
const CAPTIONS: [(&str, Field); 6] = [
    ("FILING ID #:", Field::FilingId),
    ("COMMITTEE ID #:", Field::CommitteeId),
    ("COMMITTEE NAME:", Field::CommitteeName),
    ("CANDIDATE ID #:", Field::CandidateId),
    ("CANDIDATE NAME:", Field::CandidateName),
    ("OFFICE SOUGHT:", Field::OfficeSought),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FilingId,
    CommitteeId,
    CommitteeName,
    CandidateId,
    CandidateName,
    OfficeSought,
}

/// Detail page failures; reported per row, never for the whole request
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// F6/F24 entries of the daily filings feed
pub async fn daily_filings(upstream: &dyn Upstream, date: NaiveDate) -> Result<Vec<Value>, ApiError> {
    let filings = upstream.fetch_all(&Endpoint::Filings(date)).await?;
    let total = filings.len();

    let quick: Vec<Value> = filings
        .into_iter()
        .filter(|f| {
            f.get("form_type")
                .and_then(Value::as_str)
                .map(|t| QUICK_FORM_TYPES.contains(&t.trim()))
                .unwrap_or(false)
        })
        .collect();

    tracing::debug!(%date, total, quick = quick.len(), "Filtered daily filings");
    Ok(quick)
}

/// Detail-page URLs (`fec_uri`) of the given filings, without repeats
pub fn detail_urls(filings: &[Value]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for filing in filings {
        if let Some(url) = filing.get("fec_uri").and_then(Value::as_str) {
            let url = url.trim();
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

/// Source of detail-page HTML
#[async_trait]
pub trait FormScraper: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError>;
}

/// Earliest moment the next detail-page request may go out
struct RequestPacer {
    next_slot: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RequestPacer {
    fn new(interval: Duration) -> Self {
        Self {
            next_slot: Mutex::new(None),
            interval,
        }
    }

    /// Claim the next slot, sleeping until it opens
    async fn claim(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();

        if let Some(slot) = *next_slot {
            if slot > now {
                tracing::debug!(wait = ?(slot - now), "Pacing filing page request");
                tokio::time::sleep_until(slot).await;
            }
        }

        *next_slot = Some(Instant::now() + self.interval);
    }
}

/// Fetches detail pages over HTTP, at most one per `interval`
pub struct HttpFormScraper {
    http_client: reqwest::Client,
    pacer: RequestPacer,
}

impl HttpFormScraper {
    pub fn new(interval: Duration) -> Result<Self, ScrapeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScrapeError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            pacer: RequestPacer::new(interval),
        })
    }
}

#[async_trait]
impl FormScraper for HttpFormScraper {
    async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
        self.pacer.claim().await;
        tracing::debug!(url, "Fetching filing detail page");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ScrapeError::NetworkError(e.to_string()))
    }
}

/// Remove markup and collapse whitespace
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text following `caption`, up to the next known caption
fn caption_value(text: &str, upper: &str, caption: &str) -> Option<String> {
    let start = upper.find(caption)? + caption.len();
    let end = CAPTIONS
        .iter()
        .filter_map(|(c, _)| upper[start..].find(c).map(|i| start + i))
        .min()
        .unwrap_or(text.len());

    let value = text.get(start..end)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Normalize one detail page into a filing record
///
/// The 48-hour marker selects form "48" with the `/f65` transactions view;
/// anything else is a 24-hour report with the `/se` expenditures view.
pub fn parse_filing_page(url: &str, html: &str) -> Result<QuickFiling, ScrapeError> {
    let text = strip_tags(html);
    // ASCII uppercasing keeps byte offsets aligned with `text`
    let upper = text.to_ascii_uppercase();

    let mut filing = QuickFiling {
        filing_id: None,
        form_type: FormType::TwentyFour,
        fec_committee_id: None,
        fec_committee_name: None,
        candidate_id: None,
        candidate_name: None,
        office_sought: None,
        expenditures_link: None,
        transactions_link: None,
        source_url: url.to_string(),
    };

    let mut found = 0;
    for (caption, field) in CAPTIONS {
        let Some(value) = caption_value(&text, &upper, caption) else {
            continue;
        };
        found += 1;
        let slot = match field {
            Field::FilingId => &mut filing.filing_id,
            Field::CommitteeId => &mut filing.fec_committee_id,
            Field::CommitteeName => &mut filing.fec_committee_name,
            Field::CandidateId => &mut filing.candidate_id,
            Field::CandidateName => &mut filing.candidate_name,
            Field::OfficeSought => &mut filing.office_sought,
        };
        *slot = Some(value);
    }

    if found == 0 {
        return Err(ScrapeError::ParseError(
            "no labeled fields found on page".to_string(),
        ));
    }

    let base = url.trim_end_matches('/');
    if upper.contains(FORTY_EIGHT_MARKER) {
        filing.form_type = FormType::FortyEight;
        filing.transactions_link = Some(format!("{}/f65", base));
    } else {
        filing.expenditures_link = Some(format!("{}/se", base));
    }

    Ok(filing)
}

/// One output row per URL; failures become `{source_url, error}` rows
pub async fn scrape_filings(scraper: &dyn FormScraper, urls: &[String]) -> Vec<Value> {
    let mut rows = Vec::with_capacity(urls.len());

    for url in urls {
        let parsed = match scraper.fetch_html(url).await {
            Ok(html) => parse_filing_page(url, &html),
            Err(e) => Err(e),
        };

        match parsed.and_then(|f| {
            serde_json::to_value(&f).map_err(|e| ScrapeError::ParseError(e.to_string()))
        }) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not scrape filing page");
                rows.push(json!({ "source_url": url, "error": e.to_string() }));
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_requests() {
        let pacer = RequestPacer::new(Duration::from_secs(1));
        let start = Instant::now();

        pacer.claim().await;
        assert!(start.elapsed() < Duration::from_secs(1));
        pacer.claim().await;
        pacer.claim().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_does_not_wait_after_idle_gap() {
        let pacer = RequestPacer::new(Duration::from_secs(1));
        pacer.claim().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = Instant::now();
        pacer.claim().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    const F24_PAGE: &str = r#"<html><body>
        <h2>SCHEDULE E</h2>
        <table>
          <tr><td>FILING ID #:</td><td>1780001</td></tr>
          <tr><td>Committee ID #:</td><td>C00799031</td></tr>
          <tr><td>Committee Name:</td><td>Fairshake &amp; Friends PAC</td></tr>
          <tr><td>Candidate ID #:</td><td>H4CA12345</td></tr>
          <tr><td>Candidate Name:</td><td>Doe, Jane</td></tr>
          <tr><td>Office Sought:</td><td>House</td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn test_parse_24_hour_page() {
        let url = "https://docquery.fec.gov/cgi-bin/forms/C00799031/1780001/";
        let filing = parse_filing_page(url, F24_PAGE).unwrap();

        assert_eq!(filing.form_type, FormType::TwentyFour);
        assert_eq!(filing.filing_id.as_deref(), Some("1780001"));
        assert_eq!(filing.fec_committee_id.as_deref(), Some("C00799031"));
        assert_eq!(filing.fec_committee_name.as_deref(), Some("Fairshake & Friends PAC"));
        assert_eq!(filing.candidate_name.as_deref(), Some("Doe, Jane"));
        assert_eq!(filing.office_sought.as_deref(), Some("House"));
        assert_eq!(
            filing.expenditures_link.as_deref(),
            Some("https://docquery.fec.gov/cgi-bin/forms/C00799031/1780001/se")
        );
        assert!(filing.transactions_link.is_none());
    }

    #[test]
    fn test_parse_48_hour_page() {
        let html = format!("<h1>48 HOUR NOTICE OF CONTRIBUTIONS</h1>{}", F24_PAGE);
        let filing = parse_filing_page("https://x.test/f/1", &html).unwrap();

        assert_eq!(filing.form_type, FormType::FortyEight);
        assert_eq!(filing.transactions_link.as_deref(), Some("https://x.test/f/1/f65"));
        assert!(filing.expenditures_link.is_none());
    }

    #[test]
    fn test_parse_page_without_captions_fails() {
        let result = parse_filing_page("https://x.test/f/1", "<p>Service unavailable</p>");
        assert!(matches!(result, Err(ScrapeError::ParseError(_))));
    }

    #[test]
    fn test_strip_tags_collapses_whitespace() {
        assert_eq!(strip_tags("<td>a</td>\n  <td>b&nbsp;c</td>"), "a b c");
    }

    #[test]
    fn test_detail_urls_dedupes_and_skips_missing() {
        let filings = vec![
            json!({"fec_uri": "https://a/1/"}),
            json!({"fec_uri": ""}),
            json!({"form_type": "F24"}),
            json!({"fec_uri": "https://a/1/"}),
            json!({"fec_uri": "https://a/2/"}),
        ];
        assert_eq!(detail_urls(&filings), vec!["https://a/1/", "https://a/2/"]);
    }

    struct CannedScraper;

    #[async_trait]
    impl FormScraper for CannedScraper {
        async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
            if url.ends_with("/ok/") {
                Ok(F24_PAGE.to_string())
            } else {
                Err(ScrapeError::Status(404))
            }
        }
    }

    #[tokio::test]
    async fn test_scrape_failures_become_error_rows() {
        let urls = vec!["https://a/ok/".to_string(), "https://a/missing/".to_string()];
        let rows = scrape_filings(&CannedScraper, &urls).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["form_type"], "24");
        assert_eq!(rows[0]["source_url"], "https://a/ok/");
        assert_eq!(rows[1]["source_url"], "https://a/missing/");
        assert_eq!(rows[1]["error"], "HTTP 404");
    }
}
