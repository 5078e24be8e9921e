// src/ingest/discovery.rs
//! Model-assisted source discovery. Suggested feeds are fetched and parsed
//! before they are kept; only the user source file is rewritten.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyze::ai_adapter::{AiClient, SourceSuggestion};
use crate::ingest::parser::parse_feed;
use crate::ingest::sources::{
    dedupe_sources, load_sources_from, name_from_url, persist_sources, resolve_sources,
};
use crate::ingest::types::{FeedFetcher, FeedSource};

pub const MAX_AI_SOURCES: usize = 20;

static RE_FEED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(rss|feed|channel)\b").expect("feed marker regex"));

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOpts {
    pub max: usize,
    pub timeout: Duration,
}

impl Default for DiscoveryOpts {
    fn default() -> Self {
        Self {
            max: MAX_AI_SOURCES,
            timeout: Duration::from_millis(crate::ingest::fetcher::DEFAULT_FETCH_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub suggested: usize,
    pub added: Vec<FeedSource>,
    /// Every active source after the merge, defaults included when enabled.
    pub sources: Vec<FeedSource>,
}

fn is_http_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn into_candidate(s: SourceSuggestion) -> FeedSource {
    let name = s
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| name_from_url(&s.feed_url));
    let category = s.category.as_deref().and_then(|c| c.parse().ok());
    let mut src = FeedSource::new(name.trim(), &s.feed_url, category);
    src.homepage = s.homepage;
    src
}

/// A feed passes when it downloads in time, carries an RSS/Atom root, and
/// yields at least one item.
pub async fn verify_feed(fetcher: &dyn FeedFetcher, source: &FeedSource, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, fetcher.fetch(source)).await {
        Ok(Ok(body)) => RE_FEED_MARKER.is_match(&body) && !parse_feed(&body).is_empty(),
        Ok(Err(e)) => {
            tracing::debug!(target: "ingest", url = %source.url, error = %e, "candidate feed rejected");
            false
        }
        Err(_) => {
            tracing::debug!(target: "ingest", url = %source.url, "candidate feed timed out");
            false
        }
    }
}

/// Ask the model for feeds, drop malformed or already known URLs, and keep
/// the ones that verify. Nothing is written.
pub async fn discover_sources(
    ai: &dyn AiClient,
    fetcher: Arc<dyn FeedFetcher>,
    known: &[FeedSource],
    opts: DiscoveryOpts,
) -> Result<(usize, Vec<FeedSource>)> {
    if !ai.is_enabled() {
        bail!("source discovery needs an enabled AI client");
    }
    let suggestions = ai.suggest_sources(opts.max).await;
    let suggested = suggestions.len();

    let mut seen: HashSet<String> = known.iter().map(|s| s.url.trim().to_lowercase()).collect();
    let candidates: Vec<FeedSource> = suggestions
        .into_iter()
        .take(opts.max)
        .filter(|s| is_http_url(&s.feed_url))
        .filter(|s| seen.insert(s.feed_url.to_lowercase()))
        .map(into_candidate)
        .collect();

    let checks = join_all(
        candidates
            .iter()
            .map(|c| verify_feed(fetcher.as_ref(), c, opts.timeout)),
    )
    .await;
    let verified: Vec<FeedSource> = candidates
        .into_iter()
        .zip(checks)
        .filter_map(|(c, ok)| ok.then_some(c))
        .collect();

    counter!("sources_discovered_total").increment(verified.len() as u64);
    tracing::info!(
        target: "ingest",
        provider = ai.provider_name(),
        suggested,
        verified = verified.len(),
        "source discovery finished"
    );
    Ok((suggested, verified))
}

/// Discover, then append the verified feeds to the source file at `path`.
/// Built-in outlets are never written to the file.
pub async fn refresh_sources_with_ai(
    ai: &dyn AiClient,
    fetcher: Arc<dyn FeedFetcher>,
    path: &Path,
    include_defaults: bool,
    opts: DiscoveryOpts,
) -> Result<DiscoveryReport> {
    let stored = if path.exists() {
        load_sources_from(path)?
    } else {
        Vec::new()
    };
    let known = resolve_sources(include_defaults, stored.clone());
    let (suggested, added) = discover_sources(ai, fetcher, &known, opts).await?;

    let mut file = stored;
    file.extend(added.iter().cloned());
    let file = dedupe_sources(file);
    if !added.is_empty() {
        persist_sources(path, &file)?;
    }

    Ok(DiscoveryReport {
        suggested,
        added,
        sources: resolve_sources(include_defaults, file),
    })
}

/// Normalize the source file in place: repeats and entries shadowed by the
/// built-in outlets are removed. A missing file stays missing.
pub fn warmup_sources(path: &Path, include_defaults: bool) -> Result<Vec<FeedSource>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let stored = load_sources_from(path)?;
    let builtin: HashSet<String> = if include_defaults {
        resolve_sources(true, Vec::new())
            .into_iter()
            .map(|s| s.url.to_lowercase())
            .collect()
    } else {
        HashSet::new()
    };
    let cleaned: Vec<FeedSource> = dedupe_sources(stored.clone())
        .into_iter()
        .filter(|s| !builtin.contains(&s.url.to_lowercase()))
        .collect();
    if cleaned.len() != stored.len() {
        tracing::info!(
            target: "ingest",
            before = stored.len(),
            after = cleaned.len(),
            "source file normalized"
        );
        persist_sources(path, &cleaned)?;
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{Analysis, DisabledClient};
    use crate::error::FetchError;
    use crate::model::{Category, NewsItem};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;

    const RSS: &str = "<rss><channel><item><title>Haber</title>\
                       <link>https://x.test/1</link></item></channel></rss>";

    struct Suggests(Vec<SourceSuggestion>);

    impl AiClient for Suggests {
        fn analyze<'a>(
            &'a self,
            _item: &'a NewsItem,
        ) -> Pin<Box<dyn Future<Output = Option<Analysis>> + Send + 'a>> {
            Box::pin(async { None })
        }
        fn summarize<'a>(
            &'a self,
            _item: &'a NewsItem,
        ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
            Box::pin(async { None })
        }
        fn suggest_sources<'a>(
            &'a self,
            _max: usize,
        ) -> Pin<Box<dyn Future<Output = Vec<SourceSuggestion>> + Send + 'a>> {
            let out = self.0.clone();
            Box::pin(async move { out })
        }
        fn provider_name(&self) -> &'static str {
            "test"
        }
    }

    struct Pages(HashMap<String, Result<String, FetchError>>);

    #[async_trait::async_trait]
    impl FeedFetcher for Pages {
        async fn fetch(&self, source: &FeedSource) -> Result<String, FetchError> {
            self.0
                .get(&source.url)
                .cloned()
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    fn suggestion(url: &str, category: Option<&str>) -> SourceSuggestion {
        SourceSuggestion {
            name: None,
            homepage: None,
            feed_url: url.into(),
            category: category.map(Into::into),
        }
    }

    #[tokio::test]
    async fn only_verified_unknown_feeds_are_kept() {
        let ai = Suggests(vec![
            suggestion("https://iyi.test/rss", Some("spor")),
            suggestion("https://bos.test/rss", None),
            suggestion("https://html.test/", None),
            suggestion("ftp://eski.test/rss", None),
            suggestion("https://www.ntv.com.tr/gundem.rss", None),
            suggestion("https://IYI.test/rss", None),
        ]);
        let pages = Pages(HashMap::from([
            ("https://iyi.test/rss".to_string(), Ok(RSS.to_string())),
            ("https://bos.test/rss".to_string(), Ok("<rss><channel></channel></rss>".to_string())),
            ("https://html.test/".to_string(), Ok("<html><item><title>x</title></item></html>".to_string())),
        ]));
        let known = resolve_sources(true, Vec::new());

        let (suggested, kept) = discover_sources(&ai, Arc::new(pages), &known, DiscoveryOpts::default())
            .await
            .unwrap();
        assert_eq!(suggested, 6);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://iyi.test/rss");
        assert_eq!(kept[0].name, "iyi.test");
        assert_eq!(kept[0].category, Some(Category::Spor));
    }

    #[tokio::test]
    async fn disabled_client_is_an_error() {
        let r = discover_sources(&DisabledClient, Arc::new(Pages(HashMap::new())), &[], DiscoveryOpts::default()).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn refresh_appends_to_the_file_without_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sources.json");
        std::fs::write(&path, r#"[{"name": "Yerel", "url": "https://yerel.test/rss"}]"#).unwrap();

        let ai = Suggests(vec![suggestion("https://yeni.test/rss", None)]);
        let pages = Pages(HashMap::from([("https://yeni.test/rss".to_string(), Ok(RSS.to_string()))]));

        let report = refresh_sources_with_ai(&ai, Arc::new(pages), &path, true, DiscoveryOpts::default())
            .await
            .unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.sources.len(), resolve_sources(true, Vec::new()).len() + 2);

        let on_disk = load_sources_from(&path).unwrap();
        let urls: Vec<&str> = on_disk.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://yerel.test/rss", "https://yeni.test/rss"]);
    }

    #[test]
    fn warmup_drops_repeats_and_builtin_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sources.json");
        assert!(warmup_sources(&path, true).unwrap().is_empty());
        assert!(!path.exists());

        std::fs::write(
            &path,
            r#"[{"url": "https://a.test/rss"}, {"url": "https://A.test/rss"},
                {"url": "https://www.trthaber.com/manset.rss"}]"#,
        )
        .unwrap();
        let out = warmup_sources(&path, true).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(load_sources_from(&path).unwrap().len(), 1);
        assert_eq!(warmup_sources(&path, false).unwrap().len(), 1);
    }
}
