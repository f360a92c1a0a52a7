//! Shared fakes for server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use ietrack_common::db::init_in_memory;
use ietrack_server::client::{ApiError, Endpoint, Upstream, PAGE_SIZE};
use ietrack_server::filings::{FormScraper, ScrapeError};
use ietrack_server::notify::Notifier;
use ietrack_server::reconcile::FallbackPolicy;
use ietrack_server::store::SqliteRecordStore;
use ietrack_server::{AppState, Settings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Upstream record as the API would return it
pub fn api_record(id: &str, date: &str, received: &str) -> Value {
    json!({
        "unique_id": id,
        "fec_committee_id": "C00799031",
        "fec_committee_name": "Example Action Fund",
        "candidate_name": "Doe, Jane",
        "office": "H",
        "state": "PA",
        "district": 7,
        "amount": 2500.0,
        "date": date,
        "date_received": received,
        "dissemination_date": date,
        "purpose": "Digital ads",
        "payee": "Ad Shop LLC",
        "support_or_oppose": "S",
        "transaction_id": format!("SE.{}", id),
        "fec_uri": format!("https://docquery.fec.gov/cgi-bin/forms/C00799031/{}/", id),
        "filing_id": 1780001,
    })
}

/// In-memory upstream serving canned records in pages of 20
#[derive(Default)]
pub struct FakeUpstream {
    records: Mutex<HashMap<String, Vec<Value>>>,
    /// Endpoint path → offset at which pages start failing
    fail_at: Mutex<HashMap<String, u32>>,
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, endpoint: Endpoint, records: Vec<Value>) {
        self.records.lock().unwrap().insert(endpoint.path(), records);
    }

    pub fn fail_from(&self, endpoint: Endpoint, offset: u32) {
        self.fail_at.lock().unwrap().insert(endpoint.path(), offset);
    }

    pub fn clear_failures(&self) {
        self.fail_at.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_page(&self, endpoint: &Endpoint, offset: u32) -> Result<Vec<Value>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = endpoint.path();

        if let Some(&fail_offset) = self.fail_at.lock().unwrap().get(&path) {
            if offset >= fail_offset {
                return Err(ApiError::Status {
                    code: 500,
                    message: "Internal Server Error".to_string(),
                });
            }
        }

        let records = self.records.lock().unwrap();
        let all = records.get(&path).cloned().unwrap_or_default();
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(PAGE_SIZE as usize)
            .collect())
    }
}

/// Serves fixed HTML per URL; unknown URLs are 404s
#[derive(Default)]
pub struct FakeScraper {
    pages: HashMap<String, String>,
}

impl FakeScraper {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl FormScraper for FakeScraper {
    async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or(ScrapeError::Status(404))
    }
}

/// Records every message; optionally reports delivery failure
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, html: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), html.to_string()));
        !self.fail
    }
}

pub async fn memory_store() -> Arc<SqliteRecordStore> {
    Arc::new(SqliteRecordStore::new(init_in_memory().await.unwrap()))
}

pub fn settings(today: NaiveDate) -> Settings {
    Settings {
        utc_offset_hours: -5,
        today_override: Some(today),
        fallback: FallbackPolicy { rows: 12, days: 0 },
    }
}

/// Everything a router test needs to poke at
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<SqliteRecordStore>,
    pub upstream: Arc<FakeUpstream>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn test_app(today: NaiveDate, scraper: FakeScraper) -> TestApp {
    let store = memory_store().await;
    let upstream = Arc::new(FakeUpstream::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let state = AppState::new(
        store.clone(),
        upstream.clone(),
        Arc::new(scraper),
        notifier.clone(),
        settings(today),
    );

    TestApp {
        state,
        store,
        upstream,
        notifier,
    }
}
