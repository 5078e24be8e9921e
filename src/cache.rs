// src/cache.rs
//! Freshness-bounded in-memory snapshot of the last ingestion result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::model::NewsItem;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub items: Arc<Vec<NewsItem>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    snapshot: Snapshot,
    stored_at: Instant,
    invalidated: bool,
}

/// Owned by the aggregator; no process-wide state.
#[derive(Debug)]
pub struct NewsCache {
    ttl: Duration,
    entry: RwLock<Option<Entry>>,
}

impl Default for NewsCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl NewsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The snapshot, only while younger than the TTL and not invalidated.
    pub fn fresh(&self) -> Option<Snapshot> {
        let g = self.entry.read();
        g.as_ref()
            .filter(|e| !e.invalidated && e.stored_at.elapsed() < self.ttl)
            .map(|e| e.snapshot.clone())
    }

    /// The last stored snapshot regardless of age.
    pub fn last(&self) -> Option<Snapshot> {
        self.entry.read().as_ref().map(|e| e.snapshot.clone())
    }

    pub fn put(&self, items: Vec<NewsItem>) -> Snapshot {
        self.put_with(items, Utc::now())
    }

    /// Store items that were produced at `updated_at` rather than now.
    pub fn put_with(&self, items: Vec<NewsItem>, updated_at: DateTime<Utc>) -> Snapshot {
        let snapshot = Snapshot {
            items: Arc::new(items),
            updated_at,
        };
        *self.entry.write() = Some(Entry {
            snapshot: snapshot.clone(),
            stored_at: Instant::now(),
            invalidated: false,
        });
        snapshot
    }

    /// Force the next read to refresh. The stale snapshot stays available
    /// through [`NewsCache::last`].
    pub fn invalidate(&self) {
        if let Some(e) = self.entry.write().as_mut() {
            e.invalidated = true;
        }
    }
}
