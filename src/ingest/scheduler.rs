// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;

#[derive(Clone, Copy, Debug)]
pub struct RetentionCfg {
    pub every: Duration,
    pub keep_days: i64,
}

/// Prune on a fixed interval, starting now.
pub fn spawn_retention_task(aggregator: Arc<Aggregator>, cfg: RetentionCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.every.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            match aggregator.prune(cfg.keep_days).await {
                Ok(deleted) => {
                    counter!("store_pruned_total").increment(deleted as u64);
                    tracing::info!(target: "ingest", deleted, keep_days = cfg.keep_days, "retention prune");
                }
                Err(e) => tracing::warn!(target: "ingest", error = ?e, "retention prune failed"),
            }
        }
    })
}

/// `None` when `every` is zero.
pub fn spawn_refresh_task(aggregator: Arc<Aggregator>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let snap = aggregator.get_items().await;
            tracing::debug!(target: "ingest", items = snap.items.len(), "cache warm tick");
        }
    }))
}
