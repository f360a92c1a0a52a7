//! ietrack-server library - independent expenditure sync and reconciliation
//!
//! Pulls transactions from the ProPublica campaign finance API into a local
//! SQLite table and serves listings, multi-source date queries and CSV
//! exports over HTTP.

use axum::Router;
use chrono::NaiveDate;
use ietrack_common::config::AppConfig;
use ietrack_common::time::business_today;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod client;
pub mod export;
pub mod filings;
pub mod form_cache;
pub mod notify;
pub mod reconcile;
pub mod store;
pub mod sync;

use client::Upstream;
use filings::FormScraper;
use form_cache::FormUrlCache;
use notify::Notifier;
use reconcile::FallbackPolicy;
use store::RecordStore;
use sync::SyncPipeline;

/// Request-independent settings derived from configuration
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub utc_offset_hours: i32,
    pub today_override: Option<NaiveDate>,
    pub fallback: FallbackPolicy,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            utc_offset_hours: config.utc_offset_hours,
            today_override: config.today_override,
            fallback: FallbackPolicy {
                rows: config.fallback_rows,
                days: config.fallback_days,
            },
        }
    }

    /// Current business date
    pub fn today(&self) -> NaiveDate {
        business_today(self.utc_offset_hours, self.today_override)
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub upstream: Arc<dyn Upstream>,
    pub scraper: Arc<dyn FormScraper>,
    pub pipeline: Arc<SyncPipeline>,
    pub form_cache: Arc<FormUrlCache>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        upstream: Arc<dyn Upstream>,
        scraper: Arc<dyn FormScraper>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        let pipeline = Arc::new(SyncPipeline::new(
            Arc::clone(&upstream),
            Arc::clone(&store),
            notifier,
        ));

        Self {
            store,
            upstream,
            scraper,
            pipeline,
            form_cache: Arc::new(FormUrlCache::default()),
            settings,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/", get(api::home))
        .route("/live", get(api::live))
        .route("/committee/:committee_id", get(api::committee))
        .route("/dates", get(api::by_date))
        .route("/update", get(api::trigger_sync).post(api::trigger_sync))
        .route("/filings", get(api::daily_filings))
        .route("/filings/details", get(api::filing_details))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
