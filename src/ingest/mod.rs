// src/ingest/mod.rs
pub mod dedup;
pub mod discovery;
pub mod fetcher;
pub mod parser;
pub mod scheduler;
pub mod sources;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::analyze::summarizer::Summarizer;
use crate::ingest::types::{FeedSource, RawItem};
use crate::model::{Category, NewsItem};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_items_parsed_total",
            "Items parsed out of fetched feeds."
        );
        describe_counter!(
            "ingest_source_failures_total",
            "Feed sources that failed to fetch (timeout, status, network)."
        );
        describe_counter!(
            "ingest_dedup_merged_total",
            "Items folded into an earlier report of the same story."
        );
        describe_counter!("ingest_runs_total", "Completed ingestion passes.");
        describe_counter!(
            "ingest_ai_failures_total",
            "AI analysis calls that failed and fell back to defaults."
        );
        describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("ingest_pass_ms", "Full ingestion pass time in milliseconds.");
        describe_counter!("store_pruned_total", "Items removed by retention pruning.");
        describe_counter!("sources_discovered_total", "Suggested feeds that passed verification.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingestion pipeline last ran."
        );
        describe_gauge!("ingest_items_last_run", "Items produced by the last pass.");
    });
}

/// Turn a parsed feed entry into a `NewsItem` attributed to `source`.
///
/// A missing or unparseable date becomes `now`. Category starts as the
/// source's declared one and is settled by the categorizer after dedup.
pub fn build_item(
    raw: RawItem,
    source: &FeedSource,
    summarizer: &Summarizer,
    now: DateTime<Utc>,
) -> NewsItem {
    let published_at = raw.published_at.unwrap_or(now);
    let link = raw.link.trim().to_string();
    let title = raw.title;
    let description = raw.description;

    let summary_basis = if description.is_empty() {
        &title
    } else {
        &description
    };
    let summary = summarizer.summarize(summary_basis);
    let preview_basis = [&summary, &description, &title]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .cloned()
        .unwrap_or_default();
    let preview = summarizer.preview(&preview_basis);

    NewsItem {
        id: NewsItem::derive_id(&title, &link, published_at),
        title,
        link,
        published_at,
        description,
        summary,
        preview,
        source: source.name.clone(),
        sources: vec![source.name.clone()],
        category: source.category.unwrap_or(Category::Gundem),
        importance: None,
        tags: Vec::new(),
        ai_summary: None,
        should_publish: None,
        created_at: None,
        updated_at: None,
    }
}
