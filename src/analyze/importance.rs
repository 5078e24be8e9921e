// src/analyze/importance.rs
//! Importance / publish stage sitting on the AI boundary.

use std::cmp::Ordering;
use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use metrics::counter;

use super::ai_adapter::{AiClient, Analysis};
use super::rate_limiter::RateLimiter;
use crate::model::{Category, NewsItem};

#[derive(Debug, Clone)]
pub struct EnrichParams {
    pub max_items: usize,
    pub summary_max_items: usize,
}

impl Default for EnrichParams {
    fn default() -> Self {
        Self {
            max_items: 20,
            summary_max_items: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub analyzed: usize,
    pub failed: usize,
    pub summarized: usize,
}

/// Write a verdict onto an item. The AI category only applies when it names a
/// known category and the item's source is not pinned.
pub fn apply_analysis(item: &mut NewsItem, analysis: Analysis, pinned: bool) {
    item.importance = Some(analysis.importance.clamp(1, 10));
    item.tags = analysis.tags;
    item.should_publish = Some(analysis.should_publish);
    if pinned {
        return;
    }
    if let Some(cat) = analysis
        .category
        .as_deref()
        .and_then(|c| c.parse::<Category>().ok())
    {
        item.category = cat;
    }
}

/// Score the freshest `max_items` items through `ai`, paced by `limiter`
/// (which also bounds how many calls run at once).
/// Items beyond the limit are left untouched. With a disabled client every
/// item gets the neutral verdict.
pub async fn enrich(
    mut items: Vec<NewsItem>,
    ai: &dyn AiClient,
    limiter: &RateLimiter,
    params: &EnrichParams,
    pinned_sources: &HashSet<String>,
) -> (Vec<NewsItem>, EnrichStats) {
    let mut stats = EnrichStats::default();

    if !ai.is_enabled() {
        for it in items.iter_mut() {
            apply_analysis(it, Analysis::default(), true);
        }
        return (items, stats);
    }

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    // Up to `limiter.concurrency()` calls in flight; results are applied by index.
    let n = params.max_items.min(items.len());
    let mut verdicts: Vec<(usize, Option<Analysis>)> = stream::iter(0..n)
        .map(|i| {
            let it = &items[i];
            async move {
                let _permit = limiter.acquire().await;
                (i, ai.analyze(it).await)
            }
        })
        .buffer_unordered(limiter.concurrency())
        .collect()
        .await;
    verdicts.sort_by_key(|(i, _)| *i);

    for (i, verdict) in verdicts {
        let it = &mut items[i];
        let pinned = pinned_sources.contains(&it.source);
        match verdict {
            Some(a) => {
                apply_analysis(it, a, pinned);
                stats.analyzed += 1;
            }
            None => {
                tracing::warn!(
                    target: "ingest",
                    provider = ai.provider_name(),
                    title = %it.title,
                    "ai analysis failed, using defaults"
                );
                counter!("ingest_ai_failures_total").increment(1);
                apply_analysis(it, Analysis::default(), true);
                stats.failed += 1;
            }
        }
    }

    let wanted: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, it)| !it.description.trim().is_empty() && it.ai_summary.is_none())
        .map(|(i, _)| i)
        .take(params.summary_max_items)
        .collect();
    let summaries: Vec<(usize, Option<String>)> = stream::iter(wanted)
        .map(|i| {
            let it = &items[i];
            async move {
                let _permit = limiter.acquire().await;
                (i, ai.summarize(it).await)
            }
        })
        .buffer_unordered(limiter.concurrency())
        .collect()
        .await;

    for (i, summary) in summaries {
        if let Some(s) = summary {
            items[i].ai_summary = Some(s);
            stats.summarized += 1;
        }
    }

    (items, stats)
}

/// Importance desc (absent counts as neutral 5), then newest first.
pub fn sort_by_importance(items: &mut [NewsItem]) {
    items.sort_by(|a, b| {
        b.importance_or_neutral()
            .cmp(&a.importance_or_neutral())
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
}

/// Drops only items explicitly marked not publishable.
pub fn filter_publishable(items: Vec<NewsItem>) -> Vec<NewsItem> {
    items
        .into_iter()
        .filter(|i| i.should_publish != Some(false))
        .collect()
}

/// Importance ordering used by queries: absent sorts lowest.
pub fn cmp_importance_for_query(a: &NewsItem, b: &NewsItem) -> Ordering {
    b.importance
        .unwrap_or(0)
        .cmp(&a.importance.unwrap_or(0))
        .then_with(|| b.published_at.cmp(&a.published_at))
}
