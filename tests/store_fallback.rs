// tests/store_fallback.rs
//
// Cache + store behaviour of the Aggregator across passes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use haber_okuyoruz::aggregator::Aggregator;
use haber_okuyoruz::error::FetchError;
use haber_okuyoruz::ingest::types::{FeedFetcher, FeedSource};
use haber_okuyoruz::store::NewsStore;

const EKONOMI: &str = include_str!("fixtures/ekonomi.xml");

/// Serves the fixture until switched off; counts calls.
struct Switchable {
    up: AtomicBool,
    calls: AtomicUsize,
}

impl Switchable {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FeedFetcher for Switchable {
    async fn fetch(&self, _source: &FeedSource) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(EKONOMI.to_string())
        } else {
            Err(FetchError::Status(503))
        }
    }
}

fn sources() -> Vec<FeedSource> {
    vec![FeedSource::new("Ekonomi", "https://ekonomi.test/rss", None)]
}

#[tokio::test]
async fn fresh_cache_skips_fetching() {
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone()).with_cache_ttl(Duration::from_secs(60));

    let a = agg.get_items().await;
    let b = agg.get_items().await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.items.len(), 2);
    assert!(Arc::ptr_eq(&a.items, &b.items));
}

#[tokio::test]
async fn concurrent_readers_share_one_pass() {
    let fetcher = Switchable::new();
    let agg = Arc::new(
        Aggregator::new(sources(), fetcher.clone()).with_cache_ttl(Duration::from_secs(60)),
    );

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let agg = Arc::clone(&agg);
            tokio::spawn(async move { agg.get_items().await.items.len() })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.expect("join"), 2);
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_pass_falls_back_to_persisted_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(NewsStore::new(dir.path().join("news.json")));
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone())
        .with_cache_ttl(Duration::ZERO)
        .with_store(Arc::clone(&store));

    let first = agg.get_items().await;
    assert_eq!(first.items.len(), 2);
    assert_eq!(store.total().await, 2);

    fetcher.up.store(false, Ordering::SeqCst);
    let second = agg.get_items().await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.items.len(), 2);
    assert!(second
        .items
        .iter()
        .any(|i| i.link == "https://ekonomi.test/faiz"));
}

#[tokio::test]
async fn failed_pass_without_store_serves_last_snapshot() {
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone()).with_cache_ttl(Duration::ZERO);

    assert_eq!(agg.get_items().await.items.len(), 2);
    fetcher.up.store(false, Ordering::SeqCst);
    assert_eq!(agg.get_items().await.items.len(), 2);
}

#[tokio::test]
async fn refresh_reports_error_and_keeps_stale_snapshot() {
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone()).with_cache_ttl(Duration::from_secs(60));

    let summary = agg.refresh().await.expect("refresh");
    assert_eq!(summary.items, 2);
    assert_eq!(summary.failed, 0);

    fetcher.up.store(false, Ordering::SeqCst);
    assert!(agg.refresh().await.is_err());
    assert!(agg.cache().fresh().is_none());
    assert_eq!(agg.get_items().await.items.len(), 2);
}

#[tokio::test]
async fn repeated_passes_do_not_duplicate_stored_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(NewsStore::new(dir.path().join("news.json")));
    let agg = Aggregator::new(sources(), Switchable::new()).with_store(Arc::clone(&store));

    let r1 = agg.ingest_once().await.expect("pass 1");
    let r2 = agg.ingest_once().await.expect("pass 2");
    assert_eq!(r1.persisted, Some(2));
    assert_eq!(r2.persisted, Some(0));
    assert_eq!(store.total().await, 2);
}

#[tokio::test]
async fn snapshot_fallback_keeps_original_timestamp() {
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone()).with_cache_ttl(Duration::ZERO);

    let fresh = agg.get_items().await;
    fetcher.up.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stale = agg.get_items().await;
    assert_eq!(stale.items.len(), 2);
    assert_eq!(stale.updated_at, fresh.updated_at);
}

#[tokio::test]
async fn store_fallback_is_not_stamped_newer_than_the_last_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(NewsStore::new(dir.path().join("news.json")));
    let fetcher = Switchable::new();
    let agg = Aggregator::new(sources(), fetcher.clone())
        .with_cache_ttl(Duration::ZERO)
        .with_store(store);

    let fresh = agg.get_items().await;
    fetcher.up.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stale = agg.get_items().await;
    assert_eq!(stale.items.len(), 2);
    assert!(stale.updated_at <= fresh.updated_at);
}
