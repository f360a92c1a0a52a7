//! Synchronization pipeline: fetch, dedupe, persist, notify
//!
//! A run walks `Fetching → Deduping → Persisting → Notifying → Done`. Only
//! fetching can fail the run before anything is written; a fetch failure
//! discards every page already fetched.

use crate::client::{fetch_transactions, ApiError, Upstream};
use crate::export::{render_html_table, Table};
use crate::notify::Notifier;
use crate::reconcile::{shape, to_values, DATA_COLUMNS};
use crate::store::{IdScope, RecordStore};
use chrono::NaiveDate;
use ietrack_common::{Error, Transaction};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Pipeline stage, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Fetching,
    Deduping,
    Persisting,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Fetching => "fetching",
            SyncState::Deduping => "deduping",
            SyncState::Persisting => "persisting",
            SyncState::Notifying => "notifying",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Send a notification when new rows were stored
    pub notify: bool,
}

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub date: NaiveDate,
    /// Records returned by the upstream feed
    pub fetched: usize,
    /// Records newly written
    pub inserted: usize,
    /// Whether a notification was handed off
    pub notified: bool,
}

#[derive(Debug, ThisError)]
pub enum SyncError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] ApiError),

    #[error("store error: {0}")]
    Store(#[from] Error),
}

/// Subject line for a new-records notification
pub fn notification_subject(date: NaiveDate) -> String {
    format!("New Independent Expenditures for {}!", date.format("%Y-%m-%d"))
}

/// Records whose id is neither stored nor repeated earlier in the batch
pub fn filter_new(batch: Vec<Transaction>, existing: &HashSet<String>) -> Vec<Transaction> {
    let mut seen: HashSet<String> = HashSet::new();
    batch
        .into_iter()
        .filter(|r| !existing.contains(&r.unique_id) && seen.insert(r.unique_id.clone()))
        .collect()
}

/// Whether the newest stored transaction is dated `today`
pub async fn already_synced(store: &dyn RecordStore, today: NaiveDate) -> Result<bool, Error> {
    Ok(store.latest_date().await? == Some(today))
}

/// Serialized fetch/dedupe/persist runs over one store
pub struct SyncPipeline {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    run_lock: Mutex<()>,
}

impl SyncPipeline {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            upstream,
            store,
            notifier,
            run_lock: Mutex::new(()),
        }
    }

    fn transition(date: NaiveDate, state: SyncState) {
        debug!(%date, state = %state, "Sync state");
    }

    /// One run for `date`; concurrent callers queue behind the run lock
    pub async fn run(&self, date: NaiveDate, options: SyncOptions) -> Result<SyncOutcome, SyncError> {
        let _guard = self.run_lock.lock().await;
        info!(%date, notify = options.notify, "Starting sync run");

        Self::transition(date, SyncState::Fetching);
        let batch = match fetch_transactions(self.upstream.as_ref(), date).await {
            Ok(batch) => batch,
            Err(e) => {
                Self::transition(date, SyncState::Failed);
                error!(%date, error = %e, "Sync run failed while fetching");
                return Err(e.into());
            }
        };
        let fetched = batch.len();

        Self::transition(date, SyncState::Deduping);
        let existing = self.store.existing_ids(IdScope::All).await?;
        let fresh = filter_new(batch, &existing);
        debug!(%date, fetched, new = fresh.len(), "Deduplicated batch");

        Self::transition(date, SyncState::Persisting);
        if fresh.is_empty() {
            Self::transition(date, SyncState::Done);
            info!(%date, fetched, "No new transactions");
            return Ok(SyncOutcome {
                date,
                fetched,
                inserted: 0,
                notified: false,
            });
        }
        let inserted = self.store.append(&fresh).await?;

        let mut notified = false;
        if options.notify {
            Self::transition(date, SyncState::Notifying);
            notified = self.notify(date, &fresh).await;
        }

        Self::transition(date, SyncState::Done);
        info!(%date, fetched, inserted, notified, "Sync run complete");
        Ok(SyncOutcome {
            date,
            fetched,
            inserted,
            notified,
        })
    }

    async fn notify(&self, date: NaiveDate, fresh: &[Transaction]) -> bool {
        let preview = shape(Table::from_records(&to_values(fresh)), &DATA_COLUMNS);
        let sent = self
            .notifier
            .send(&notification_subject(date), &render_html_table(&preview))
            .await;
        if !sent {
            warn!(%date, "Notification not delivered; records are stored");
        }
        sent
    }
}
