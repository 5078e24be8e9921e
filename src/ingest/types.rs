// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::model::Category;

/// A named outlet publishing a feed at `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    /// Pinned sources always keep their declared category.
    #[serde(default)]
    pub pinned: bool,
}

impl FeedSource {
    pub fn new(name: &str, url: &str, category: Option<Category>) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            homepage: None,
            category,
            pinned: false,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// One feed entry after markup cleanup, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    /// `None` when the feed omitted the date or it did not parse.
    pub published_at: Option<DateTime<Utc>>,
    pub description: String,
}

/// Per-source result of a fetch fan-out.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched { source: FeedSource, body: String },
    Failed { source: FeedSource, reason: FetchError },
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FetchError>;
}

/// Swappable feed parser. The default implementation is the tolerant scanner.
pub trait FeedParser: Send + Sync {
    fn parse(&self, text: &str) -> Vec<RawItem>;
    fn name(&self) -> &'static str;
}
