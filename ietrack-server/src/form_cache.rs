//! Short-lived hand-off of detail-page URLs between two requests
//!
//! The filings listing stores the URLs it found under a random token; the
//! details request redeems the token exactly once.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// How long a token stays redeemable
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct Entry {
    created: Instant,
    urls: Vec<String>,
}

pub struct FormUrlCache {
    entries: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl Default for FormUrlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl FormUrlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Store `urls` and return the token that redeems them
    pub async fn insert(&self, urls: Vec<String>) -> Uuid {
        let token = Uuid::new_v4();
        let mut entries = self.entries.lock().await;
        self.purge_expired(&mut entries);
        entries.insert(
            token,
            Entry {
                created: Instant::now(),
                urls,
            },
        );
        token
    }

    /// URLs stored under `token`; `None` if unknown, expired or already taken
    pub async fn take(&self, token: Uuid) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().await;
        self.purge_expired(&mut entries);
        entries.remove(&token).map(|e| e.urls)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn purge_expired(&self, entries: &mut HashMap<Uuid, Entry>) {
        let before = entries.len();
        entries.retain(|_, e| e.created.elapsed() < self.ttl);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "Expired form URL tokens");
        }
    }
}
