// src/query.rs
//! Filtering, ordering and paging over an item snapshot.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::analyze::importance::cmp_importance_for_query;
use crate::analyze::text::fold;
use crate::config::app::QueryCfg;
use crate::model::{Category, NewsItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Today,
    Week,
    Month,
}

impl TimeWindow {
    pub fn span(&self) -> ChronoDuration {
        match self {
            TimeWindow::Today => ChronoDuration::hours(24),
            TimeWindow::Week => ChronoDuration::days(7),
            TimeWindow::Month => ChronoDuration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Importance,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsQuery {
    pub q: Option<String>,
    pub source: Option<String>,
    /// Category name in any accepted spelling; empty or `all` means every category.
    pub category: Option<String>,
    pub importance_min: Option<u8>,
    pub window: Option<TimeWindow>,
    pub sort: Option<SortOrder>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    pub updated_at: DateTime<Utc>,
    /// Matches before paging.
    pub total: usize,
    pub categories: Vec<Category>,
    pub sources: Vec<String>,
    pub items: Vec<NewsItem>,
}

enum CategoryFilter {
    Any,
    Only(Category),
    /// Unknown name: nothing can match.
    Nothing,
}

impl NewsQuery {
    fn category_filter(&self) -> CategoryFilter {
        match self.category.as_deref().map(str::trim) {
            None | Some("") => CategoryFilter::Any,
            Some(c) if c.eq_ignore_ascii_case("all") || fold(c) == "tümü" => CategoryFilter::Any,
            Some(c) => match c.parse() {
                Ok(cat) => CategoryFilter::Only(cat),
                Err(_) => CategoryFilter::Nothing,
            },
        }
    }

    /// Effective page size: default when absent, never above the configured max.
    pub fn effective_limit(&self, cfg: &QueryCfg) -> usize {
        self.limit
            .unwrap_or(cfg.default_limit)
            .min(cfg.max_limit)
    }

    /// Returns (total matches, requested page).
    pub fn apply(
        &self,
        items: &[NewsItem],
        now: DateTime<Utc>,
        cfg: &QueryCfg,
    ) -> (usize, Vec<NewsItem>) {
        let needle = self
            .q
            .as_deref()
            .map(|q| fold(q.trim()))
            .filter(|q| !q.is_empty());
        let source = self
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let category = self.category_filter();
        let since = self.window.map(|w| now - w.span());

        let mut matched: Vec<NewsItem> = items
            .iter()
            .filter(|it| {
                source.map_or(true, |s| it.source == s || it.sources.iter().any(|x| x == s))
            })
            .filter(|it| match &category {
                CategoryFilter::Any => true,
                CategoryFilter::Only(c) => it.category == *c,
                CategoryFilter::Nothing => false,
            })
            .filter(|it| {
                self.importance_min
                    .map_or(true, |min| it.importance.unwrap_or(0) >= min)
            })
            .filter(|it| since.map_or(true, |t| it.published_at >= t))
            .filter(|it| {
                needle.as_deref().map_or(true, |n| {
                    fold(&format!("{} {} {}", it.title, it.summary, it.description)).contains(n)
                })
            })
            .cloned()
            .collect();

        match self.sort.unwrap_or_default() {
            SortOrder::Newest => matched.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
            SortOrder::Oldest => matched.sort_by(|a, b| a.published_at.cmp(&b.published_at)),
            SortOrder::Importance => matched.sort_by(cmp_importance_for_query),
        }

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.effective_limit(cfg))
            .collect();
        (total, page)
    }
}
