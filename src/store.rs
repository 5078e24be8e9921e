// src/store.rs
//! Durable JSON-file store of every item seen in the retention window.
//!
//! File shape: `{"news": [...], "lastCleanup": "<rfc3339>" | null}`. Each
//! mutation is read-modify-write of the whole file under one async lock; the
//! new content goes to a temp file that is renamed over the old one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{Category, NewsItem};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    #[serde(default)]
    news: Vec<NewsItem>,
    #[serde(default)]
    last_cleanup: Option<DateTime<Utc>>,
}

pub struct NewsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl NewsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is an empty store; an unreadable one is logged and treated as empty.
    async fn read_file(&self) -> StoreFile {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoreFile::default(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "store read failed");
                return StoreFile::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "store file unparseable");
                StoreFile::default()
            }
        }
    }

    async fn write_file(&self, file: &StoreFile) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating store dir {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(file).context("serializing store")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// Insert or update by natural key. Returns how many items were new.
    pub async fn upsert_many(&self, items: &[NewsItem]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await;
        let now = Utc::now();

        let mut index: HashMap<String, usize> = file
            .news
            .iter()
            .enumerate()
            .map(|(i, it)| (it.store_key().to_string(), i))
            .collect();

        let mut inserted = 0usize;
        for item in items {
            let key = item.store_key().to_string();
            match index.get(&key) {
                Some(&at) => merge_existing(&mut file.news[at], item, now),
                None => {
                    let mut fresh = item.clone();
                    fresh.created_at = Some(now);
                    fresh.updated_at = Some(now);
                    if !fresh.sources.contains(&fresh.source) && !fresh.source.is_empty() {
                        fresh.sources.insert(0, fresh.source.clone());
                    }
                    index.insert(key, file.news.len());
                    file.news.push(fresh);
                    inserted += 1;
                }
            }
        }

        self.write_file(&file).await?;
        Ok(inserted)
    }

    /// Every stored item, newest first.
    pub async fn all(&self) -> Vec<NewsItem> {
        let mut news = self.read_file().await.news;
        news.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        news
    }

    pub async fn page(&self, limit: usize, offset: usize) -> Vec<NewsItem> {
        self.all().await.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn total(&self) -> usize {
        self.read_file().await.news.len()
    }

    pub async fn count_by_category(&self) -> BTreeMap<Category, usize> {
        let mut out = BTreeMap::new();
        for it in self.read_file().await.news {
            *out.entry(it.category).or_insert(0) += 1;
        }
        out
    }

    pub async fn count_by_source(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for it in self.read_file().await.news {
            let name = if it.source.is_empty() {
                "Bilinmeyen".to_string()
            } else {
                it.source
            };
            *out.entry(name).or_insert(0) += 1;
        }
        out
    }

    pub async fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        self.read_file().await.last_cleanup
    }

    /// Delete items published more than `days` before `now`. Returns how many went.
    pub async fn prune_older_than(&self, days: i64, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await;
        let cutoff = now - ChronoDuration::days(days);
        let before = file.news.len();
        file.news.retain(|it| it.published_at >= cutoff);
        let deleted = before - file.news.len();
        file.last_cleanup = Some(now);
        self.write_file(&file).await?;
        Ok(deleted)
    }
}

fn take_if_set(target: &mut String, new: &str) {
    if !new.trim().is_empty() {
        *target = new.to_string();
    }
}

/// Field-level fill: non-empty new values win, empty ones keep the stored value.
fn merge_existing(existing: &mut NewsItem, new: &NewsItem, now: DateTime<Utc>) {
    take_if_set(&mut existing.id, &new.id);
    take_if_set(&mut existing.title, &new.title);
    take_if_set(&mut existing.link, &new.link);
    take_if_set(&mut existing.description, &new.description);
    take_if_set(&mut existing.summary, &new.summary);
    take_if_set(&mut existing.preview, &new.preview);
    take_if_set(&mut existing.source, &new.source);

    // A general label never overwrites a specific one.
    if !new.category.is_default() || existing.category.is_default() {
        existing.category = new.category;
    }
    if new.published_at < existing.published_at {
        existing.published_at = new.published_at;
    }
    for s in std::iter::once(&new.source).chain(new.sources.iter()) {
        if !s.is_empty() && !existing.sources.contains(s) {
            existing.sources.push(s.clone());
        }
    }
    if !existing.source.is_empty() && !existing.sources.contains(&existing.source) {
        existing.sources.insert(0, existing.source.clone());
    }
    if new.importance.is_some() {
        existing.importance = new.importance;
    }
    if !new.tags.is_empty() {
        existing.tags = new.tags.clone();
    }
    if new.ai_summary.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        existing.ai_summary = new.ai_summary.clone();
    }
    if new.should_publish.is_some() {
        existing.should_publish = new.should_publish;
    }
    if existing.created_at.is_none() {
        existing.created_at = Some(now);
    }
    existing.updated_at = Some(now);
}
