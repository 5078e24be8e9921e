// src/aggregator.rs
//! Orchestrates one ingestion pass and serves snapshots through the cache.
//!
//! Pass: fetch all sources → parse → build items → dedup → categorize →
//! AI enrichment → importance sort + publish filter → persist → cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::analyze::ai_adapter::{DisabledClient, DynAiClient};
use crate::analyze::categorizer::{Categorizer, KeywordTable};
use crate::analyze::importance::{enrich, filter_publishable, sort_by_importance, EnrichParams};
use crate::analyze::rate_limiter::RateLimiter;
use crate::analyze::summarizer::Summarizer;
use crate::cache::{NewsCache, Snapshot};
use crate::config::app::AppConfig;
use crate::error::{FetchError, IngestError};
use crate::ingest::dedup::dedupe_items;
use crate::ingest::fetcher::{fetch_all, HttpFetcher};
use crate::ingest::parser::{parser_by_name, TolerantParser};
use crate::ingest::types::{FeedFetcher, FeedParser, FeedSource};
use crate::ingest::{build_item, ensure_metrics_described};
use crate::model::NewsItem;
use crate::store::NewsStore;

/// Everything one pass produced, including what went wrong along the way.
#[derive(Debug)]
pub struct IngestReport {
    pub items: Vec<NewsItem>,
    pub fetched: usize,
    pub failures: Vec<(String, FetchError)>,
    /// Human-readable, one per failed source.
    pub warnings: Vec<String>,
    pub merged: usize,
    /// Newly inserted into the store; `None` when there is no store or the write failed.
    pub persisted: Option<usize>,
}

/// Compact view of the last pass for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub at: DateTime<Utc>,
    pub fetched: usize,
    pub failed: usize,
    pub items: usize,
    pub merged: usize,
    pub persisted: Option<usize>,
    pub warnings: Vec<String>,
}

impl From<&IngestReport> for IngestSummary {
    fn from(r: &IngestReport) -> Self {
        Self {
            at: Utc::now(),
            fetched: r.fetched,
            failed: r.failures.len(),
            items: r.items.len(),
            merged: r.merged,
            persisted: r.persisted,
            warnings: r.warnings.clone(),
        }
    }
}

pub struct Aggregator {
    sources: Vec<FeedSource>,
    pinned: HashSet<String>,
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn FeedParser>,
    summarizer: Summarizer,
    categorizer: Categorizer,
    ai: DynAiClient,
    limiter: RateLimiter,
    enrich: EnrichParams,
    fetch_timeout: Duration,
    cache: NewsCache,
    store: Option<Arc<NewsStore>>,
    refresh_lock: tokio::sync::Mutex<()>,
    last_summary: parking_lot::Mutex<Option<IngestSummary>>,
}

fn pinned_names(sources: &[FeedSource]) -> HashSet<String> {
    sources
        .iter()
        .filter(|s| s.pinned)
        .map(|s| s.name.clone())
        .collect()
}

impl Aggregator {
    /// Defaults: tolerant parser, AI off, 8 s fetch timeout, 5 min cache, no store.
    pub fn new(sources: Vec<FeedSource>, fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self {
            pinned: pinned_names(&sources),
            sources,
            fetcher,
            parser: Arc::new(TolerantParser),
            summarizer: Summarizer::default(),
            categorizer: Categorizer::default(),
            ai: Arc::new(DisabledClient),
            limiter: RateLimiter::new(1, Duration::from_millis(200)),
            enrich: EnrichParams::default(),
            fetch_timeout: Duration::from_millis(crate::ingest::fetcher::DEFAULT_FETCH_TIMEOUT_MS),
            cache: NewsCache::default(),
            store: None,
            refresh_lock: tokio::sync::Mutex::new(()),
            last_summary: parking_lot::Mutex::new(None),
        }
    }

    /// Wire everything from configuration, with the HTTP fetcher.
    pub fn from_config(
        cfg: &AppConfig,
        sources: Vec<FeedSource>,
        ai: DynAiClient,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.sources.fetch_timeout_ms);
        let fetcher = HttpFetcher::new(timeout)?;
        let table = match &cfg.categorizer.keywords_path {
            Some(p) => KeywordTable::load_from(p)?,
            None => KeywordTable::builtin(),
        };
        Ok(Self::new(sources, Arc::new(fetcher))
            .with_parser(Arc::from(parser_by_name(&cfg.sources.parser)))
            .with_summarizer(Summarizer::new(
                cfg.summarizer.sentence_count,
                cfg.summarizer.preview_limit,
            ))
            .with_categorizer(Categorizer::new(table, cfg.categorizer.params.clone()))
            .with_ai(
                ai,
                RateLimiter::new(
                    cfg.enrich.concurrency,
                    Duration::from_millis(cfg.enrich.min_delay_ms),
                ),
            )
            .with_enrich(EnrichParams {
                max_items: cfg.enrich.max_items,
                summary_max_items: cfg.enrich.summary_max_items,
            })
            .with_fetch_timeout(timeout)
            .with_cache_ttl(Duration::from_secs(cfg.cache.ttl_secs))
            .with_store(Arc::new(NewsStore::new(cfg.store.path.clone()))))
    }

    pub fn with_parser(mut self, parser: Arc<dyn FeedParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn with_ai(mut self, ai: DynAiClient, limiter: RateLimiter) -> Self {
        self.ai = ai;
        self.limiter = limiter;
        self
    }

    pub fn with_enrich(mut self, params: EnrichParams) -> Self {
        self.enrich = params;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = NewsCache::new(ttl);
        self
    }

    pub fn with_store(mut self, store: Arc<NewsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn store(&self) -> Option<&Arc<NewsStore>> {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &NewsCache {
        &self.cache
    }

    pub fn last_summary(&self) -> Option<IngestSummary> {
        self.last_summary.lock().clone()
    }

    /// One full pass, uncached. Fails only when nothing could be fetched.
    pub async fn ingest_once(&self) -> Result<IngestReport, IngestError> {
        ensure_metrics_described();
        if self.sources.is_empty() {
            return Err(IngestError::NoSources);
        }
        let t0 = Instant::now();
        let now = Utc::now();

        let report = fetch_all(Arc::clone(&self.fetcher), &self.sources, self.fetch_timeout).await;
        let failures: Vec<(String, FetchError)> = report
            .failures()
            .map(|(s, r)| (s.name.clone(), r.clone()))
            .collect();
        let fetched = report.success_count();
        if fetched == 0 {
            return Err(IngestError::AllSourcesFailed {
                failed: failures.len(),
            });
        }
        let warnings = failures
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect();

        let mut built = Vec::new();
        for (source, body) in report.fetched() {
            let raws = self.parser.parse(body);
            tracing::debug!(target: "ingest", source = %source.name, items = raws.len(), "parsed feed");
            built.extend(
                raws.into_iter()
                    .map(|raw| build_item(raw, source, &self.summarizer, now)),
            );
        }

        let (mut items, merged) = dedupe_items(built);

        let by_name: HashMap<&str, &FeedSource> =
            self.sources.iter().map(|s| (s.name.as_str(), s)).collect();
        for it in items.iter_mut() {
            let (declared, pinned) = by_name
                .get(it.source.as_str())
                .map(|s| (s.category, s.pinned))
                .unwrap_or((None, false));
            it.category = self
                .categorizer
                .categorize(&it.title, &it.description, declared, pinned);
        }

        let (items, stats) =
            enrich(items, self.ai.as_ref(), &self.limiter, &self.enrich, &self.pinned).await;
        let mut items = filter_publishable(items);
        sort_by_importance(&mut items);

        let persisted = match &self.store {
            Some(store) => match store.upsert_many(&items).await {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, "persisting items failed");
                    None
                }
            },
            None => None,
        };

        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);
        gauge!("ingest_items_last_run").set(items.len() as f64);
        histogram!("ingest_pass_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(
            target: "ingest",
            fetched,
            failed = failures.len(),
            items = items.len(),
            merged,
            analyzed = stats.analyzed,
            ai_failed = stats.failed,
            persisted = ?persisted,
            "ingest pass done"
        );

        let report = IngestReport {
            items,
            fetched,
            failures,
            warnings,
            merged,
            persisted,
        };
        *self.last_summary.lock() = Some(IngestSummary::from(&report));
        Ok(report)
    }

    /// Fresh cache, else a new pass; on failure the last persisted items,
    /// then the last in-memory snapshot, then nothing.
    pub async fn get_items(&self) -> Snapshot {
        if let Some(s) = self.cache.fresh() {
            return s;
        }
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(s) = self.cache.fresh() {
            return s;
        }
        match self.ingest_once().await {
            Ok(report) => self.cache.put(report.items),
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "ingest failed, serving fallback");
                self.fallback().await
            }
        }
    }

    /// Drop the cache and run a pass now. On failure the stale snapshot is
    /// still there for the fallback path.
    pub async fn refresh(&self) -> Result<IngestSummary, IngestError> {
        let _guard = self.refresh_lock.lock().await;
        self.cache.invalidate();
        let report = self.ingest_once().await?;
        let summary = IngestSummary::from(&report);
        self.cache.put(report.items);
        Ok(summary)
    }

    /// Fallback snapshots keep the time their data was produced.
    async fn fallback(&self) -> Snapshot {
        let last = self.cache.last();
        if let Some(store) = &self.store {
            let stored = filter_publishable(store.all().await);
            if !stored.is_empty() {
                let produced = stored
                    .iter()
                    .filter_map(|i| i.updated_at)
                    .max()
                    .or_else(|| last.as_ref().map(|s| s.updated_at))
                    .unwrap_or_else(Utc::now);
                return self.cache.put_with(stored, produced);
            }
        }
        if let Some(last) = last {
            return self.cache.put_with(last.items.as_ref().clone(), last.updated_at);
        }
        self.cache.put(Vec::new())
    }

    /// Retention pruning against the store; no-op without one.
    pub async fn prune(&self, days: i64) -> anyhow::Result<usize> {
        match &self.store {
            Some(store) => store.prune_older_than(days, Utc::now()).await,
            None => Ok(0),
        }
    }
}
