// src/ingest/fetcher.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, histogram};

use crate::error::FetchError;
use crate::ingest::types::{FeedFetcher, FeedSource, FetchOutcome};

pub const USER_AGENT: &str = "HaberOkuyoruzBot/1.0 (+https://haberokuyoruz.com)";
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 8_000;

const ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// reqwest-backed fetcher shared by every source.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(&source.url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout_ms)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        resp.text().await.map_err(|e| FetchError::Body(e.to_string()))
    }
}

/// Settled results of one fan-out, in source order.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    pub fn fetched(&self) -> impl Iterator<Item = (&FeedSource, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            FetchOutcome::Fetched { source, body } => Some((source, body.as_str())),
            FetchOutcome::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FeedSource, &FetchError)> {
        self.outcomes.iter().filter_map(|o| match o {
            FetchOutcome::Failed { source, reason } => Some((source, reason)),
            FetchOutcome::Fetched { .. } => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.len() - self.failure_count()
    }
}

/// Fetch every source concurrently. Each request gets its own deadline; one
/// slow or failing source never cancels the others.
pub async fn fetch_all(
    fetcher: Arc<dyn FeedFetcher>,
    sources: &[FeedSource],
    timeout: Duration,
) -> FetchReport {
    crate::ingest::ensure_metrics_described();
    let t0 = Instant::now();

    let tasks = sources.iter().cloned().map(|source| {
        let fetcher = Arc::clone(&fetcher);
        async move {
            let started = Instant::now();
            let res = match tokio::time::timeout(timeout, fetcher.fetch(&source)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
            };
            histogram!("ingest_fetch_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
            match res {
                Ok(body) => FetchOutcome::Fetched { source, body },
                Err(reason) => {
                    tracing::warn!(
                        target: "ingest",
                        source = %source.name,
                        url = %source.url,
                        error = %reason,
                        "feed fetch failed"
                    );
                    counter!("ingest_source_failures_total").increment(1);
                    FetchOutcome::Failed { source, reason }
                }
            }
        }
    });

    let outcomes = join_all(tasks).await;
    let report = FetchReport { outcomes };
    tracing::debug!(
        target: "ingest",
        ok = report.success_count(),
        failed = report.failure_count(),
        ms = t0.elapsed().as_millis() as u64,
        "fetch fan-out settled"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedFetcher;

    #[async_trait]
    impl FeedFetcher for ScriptedFetcher {
        async fn fetch(&self, source: &FeedSource) -> Result<String, FetchError> {
            match source.name.as_str() {
                "yavas" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok("geç".into())
                }
                "hata" => Err(FetchError::Status(503)),
                other => Ok(format!("<rss>{other}</rss>")),
            }
        }
    }

    #[tokio::test]
    async fn outcomes_keep_source_order_and_settle_all() {
        let sources = vec![
            FeedSource::new("a", "http://a.test", None),
            FeedSource::new("hata", "http://h.test", None),
            FeedSource::new("yavas", "http://y.test", None),
            FeedSource::new("b", "http://b.test", None),
        ];
        let report = fetch_all(Arc::new(ScriptedFetcher), &sources, Duration::from_millis(50)).await;

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.success_count(), 2);
        let names: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| match o {
                FetchOutcome::Fetched { source, .. } | FetchOutcome::Failed { source, .. } => {
                    source.name.as_str()
                }
            })
            .collect();
        assert_eq!(names, vec!["a", "hata", "yavas", "b"]);

        let reasons: Vec<&FetchError> = report.failures().map(|(_, r)| r).collect();
        assert_eq!(reasons, vec![&FetchError::Status(503), &FetchError::Timeout(50)]);
    }

    #[tokio::test]
    async fn empty_source_list_yields_empty_report() {
        let report = fetch_all(Arc::new(ScriptedFetcher), &[], Duration::from_millis(50)).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.failure_count(), 0);
    }
}
