// src/config/app.rs
//! Service configuration (`config/app.toml`). Every field has a default so a
//! missing file or a partial file both work.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analyze::categorizer::CategorizerParams;

pub const ENV_CONFIG_PATH: &str = "HABER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheCfg {
    pub ttl_secs: u64,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesCfg {
    pub include_defaults: bool,
    /// Extra source file; `None` uses the standard lookup.
    pub path: Option<PathBuf>,
    /// "tolerant" | "strict"
    pub parser: String,
    pub fetch_timeout_ms: u64,
    /// Ask the AI client for new feeds at startup and append verified ones
    /// to the source file.
    pub discover_on_start: bool,
    pub discover_max: usize,
}

impl Default for SourcesCfg {
    fn default() -> Self {
        Self {
            include_defaults: true,
            path: None,
            parser: "tolerant".to_string(),
            fetch_timeout_ms: crate::ingest::fetcher::DEFAULT_FETCH_TIMEOUT_MS,
            discover_on_start: false,
            discover_max: crate::ingest::discovery::MAX_AI_SOURCES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub path: PathBuf,
    pub retention_days: i64,
    pub prune_every_secs: u64,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/news.json"),
            retention_days: 30,
            prune_every_secs: 6 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichCfg {
    pub max_items: usize,
    pub summary_max_items: usize,
    pub concurrency: usize,
    pub min_delay_ms: u64,
}

impl Default for EnrichCfg {
    fn default() -> Self {
        Self {
            max_items: 20,
            summary_max_items: 20,
            concurrency: 1,
            min_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategorizerCfg {
    /// Keyword table override; the embedded table is used when `None`.
    pub keywords_path: Option<PathBuf>,
    #[serde(flatten)]
    pub params: CategorizerParams,
}

impl Default for CategorizerCfg {
    fn default() -> Self {
        Self {
            keywords_path: None,
            params: CategorizerParams::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerCfg {
    pub sentence_count: usize,
    pub preview_limit: usize,
}

impl Default for SummarizerCfg {
    fn default() -> Self {
        Self {
            sentence_count: crate::analyze::summarizer::DEFAULT_SENTENCE_COUNT,
            preview_limit: crate::analyze::summarizer::DEFAULT_PREVIEW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryCfg {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryCfg {
    fn default() -> Self {
        Self {
            default_limit: 60,
            max_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshCfg {
    /// Periodic cache warm-up; 0 disables it.
    pub warm_every_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ai_config_path: PathBuf,
    pub cache: CacheCfg,
    pub sources: SourcesCfg,
    pub store: StoreCfg,
    pub enrich: EnrichCfg,
    pub categorizer: CategorizerCfg,
    pub summarizer: SummarizerCfg,
    pub query: QueryCfg,
    pub refresh: RefreshCfg,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_config_path: PathBuf::from("config/ai.json"),
            cache: CacheCfg::default(),
            sources: SourcesCfg::default(),
            store: StoreCfg::default(),
            enrich: EnrichCfg::default(),
            categorizer: CategorizerCfg::default(),
            summarizer: SummarizerCfg::default(),
            query: QueryCfg::default(),
            refresh: RefreshCfg::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing app config")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// $HABER_CONFIG_PATH, else `config/app.toml`, else defaults; then env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::info!(path = %path.display(), "no app config file, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u64>("HABER_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = env_parse::<u64>("SOURCE_FETCH_TIMEOUT_MS").filter(|v| *v > 0) {
            self.sources.fetch_timeout_ms = v;
        }
        if let Some(v) = env_parse::<usize>("GEMINI_SUMMARY_MAX_ITEMS") {
            self.enrich.summary_max_items = v;
        }
        if let Ok(p) = std::env::var("HABER_STORE_PATH") {
            if !p.trim().is_empty() {
                self.store.path = PathBuf::from(p.trim());
            }
        }
    }
}
