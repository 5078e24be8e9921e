// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_daily_limit() -> u32 {
    500
}
fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "gemini" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Real (uncached) calls allowed per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// "ENV" means: read from GEMINI_API_KEY, then GOOGLE_API_KEY.
    #[serde(default)]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            timeout_ms: default_timeout_ms(),
            api_key: String::new(),
        }
    }
}

fn key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .filter_map(|k| env::var(k).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "gemini" => key_from_env().ok_or_else(|| {
                    anyhow::anyhow!("Missing GEMINI_API_KEY / GOOGLE_API_KEY env var")
                })?,
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_ms == 0 {
            cfg.timeout_ms = default_timeout_ms();
        }

        Ok(cfg)
    }

    /// Environment-only configuration: enabled exactly when an API key is set.
    /// `GEMINI_MODEL` and `GEMINI_TIMEOUT_MS` override the defaults.
    pub fn from_env() -> Self {
        let api_key = key_from_env().unwrap_or_default();
        let mut cfg = Self {
            enabled: !api_key.is_empty(),
            api_key,
            ..Self::default()
        };
        if let Ok(m) = env::var("GEMINI_MODEL") {
            if !m.trim().is_empty() {
                cfg.model = m.trim().to_string();
            }
        }
        if let Some(ms) = env::var("GEMINI_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            cfg.timeout_ms = ms;
        }
        cfg
    }

    /// `path` when it exists and parses, else [`AiConfig::from_env`].
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::from_env();
        }
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = ?e, path = %path.display(), "ai config unusable, using env");
                Self::from_env()
            }
        }
    }
}
