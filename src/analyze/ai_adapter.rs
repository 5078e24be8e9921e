//! AI adapter: provider abstraction + file cache + daily limit.
//!
//! The model is asked for a small JSON verdict per item (importance, category,
//! tags, publish flag) and, separately, for a short neutral summary.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ai::AiConfig;
use crate::model::NewsItem;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Per-item verdict. `Default` is the neutral verdict used whenever the
/// analyzer is off or a call fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Analysis {
    pub importance: u8,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub should_publish: bool,
}

/// One feed proposed by the model during source discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSuggestion {
    pub name: Option<String>,
    pub homepage: Option<String>,
    pub feed_url: String,
    pub category: Option<String>,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            importance: 5,
            category: None,
            tags: Vec::new(),
            should_publish: true,
        }
    }
}

/// Trait object used by the enrichment stage and tests.
pub trait AiClient: Send + Sync {
    fn analyze<'a>(
        &'a self,
        item: &'a NewsItem,
    ) -> Pin<Box<dyn Future<Output = Option<Analysis>> + Send + 'a>>;
    fn summarize<'a>(
        &'a self,
        item: &'a NewsItem,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    /// Candidate feeds proposed by the model, unverified. Empty when the
    /// client cannot make the call.
    fn suggest_sources<'a>(
        &'a self,
        _max: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<SourceSuggestion>> + Send + 'a>> {
        Box::pin(async { Vec::new() })
    }
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider (Gemini) wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(CachingClient::new(
            MockProvider::default(),
            default_cache_dir(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "gemini" if !config.api_key.is_empty() => {
            match GeminiProvider::new(
                &config.api_key,
                &config.model,
                Duration::from_millis(config.timeout_ms),
            ) {
                Ok(p) => Arc::new(CachingClient::new(
                    p,
                    default_cache_dir(),
                    config.daily_limit,
                )),
                Err(e) => {
                    tracing::warn!(error = ?e, "gemini client init failed, ai disabled");
                    Arc::new(DisabledClient)
                }
            }
        }
        "mock" => Arc::new(CachingClient::new(
            MockProvider::default(),
            default_cache_dir(),
            config.daily_limit,
        )),
        other => {
            tracing::warn!(provider = other, "ai provider unusable (unknown or no key), ai disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Prompts
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Analysis,
    Summary,
    Sources,
}

impl PromptKind {
    fn tag(&self) -> &'static str {
        match self {
            PromptKind::Analysis => "analysis",
            PromptKind::Summary => "summary",
            PromptKind::Sources => "sources",
        }
    }

    /// (temperature, max output tokens)
    fn generation(&self) -> (f32, u32) {
        match self {
            PromptKind::Analysis => (0.3, 200),
            PromptKind::Summary => (0.25, 160),
            PromptKind::Sources => (0.2, 600),
        }
    }
}

fn clip(text: &str, limit: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= limit {
        return normalized;
    }
    let cut: String = normalized.chars().take(limit.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn body_of(item: &NewsItem) -> &str {
    [&item.description, &item.summary, &item.preview]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .map(|s| s.as_str())
        .unwrap_or("")
}

pub fn analysis_prompt(item: &NewsItem) -> String {
    let text = clip(&format!("{}\n\n{}", item.title, body_of(item)), 1500);
    format!(
        "Sen bir haber editörüsün. Aşağıdaki haberi analiz et ve JSON formatında cevap ver:\n\n\
         Haber:\n{text}\n\n\
         Görevlerin:\n\
         1. Önem skoru: 1-10 arası (10 = çok önemli, 1 = önemsiz)\n\
         2. Kategori: gündem, spor, ekonomi, teknoloji, sağlık, siyaset, kültür, dünya (sadece bir tane)\n\
         3. Etiketler: Haberin konusuyla ilgili 2-4 kelime\n\
         4. Yayınla mı: true/false (spam, tekrar, önemsiz haberler için false)\n\n\
         SADECE JSON döndür:\n\
         {{\"importance\": 7, \"category\": \"ekonomi\", \"tags\": [\"dolar\", \"enflasyon\"], \"shouldPublish\": true}}"
    )
}

pub fn summary_prompt(item: &NewsItem) -> String {
    let body = clip(body_of(item), 1200);
    let title = clip(&item.title, 200);
    let source = if item.source.is_empty() {
        "Bilinmeyen kaynak"
    } else {
        item.source.as_str()
    };
    let body = if body.is_empty() {
        "Metin bulunamadı.".to_string()
    } else {
        body
    };
    format!(
        "Sen Türkçe yazan kısa haber özetleyicisisin. 2 cümleyi geçme, yorumsuz ve tarafsız kal, en önemli bilgileri sırala.\n\
         Kaynak: {source}\nBaşlık: {title}\nHaber içeriği: {body}\n\n\
         Çıktı formatı:\n- En az 1 en fazla 2 cümlelik net özet.\n- Gereksiz süsleme yapma, yorum katma."
    )
}

pub fn sources_prompt(max: usize) -> String {
    format!(
        "Türkçe haber okuyucu için güvenilir ve erişilebilir RSS kaynakları listesi oluştur.\n\
         - Türkiye merkezli veya Türkçe yayın yapan global kaynaklar olsun.\n\
         - Aşırı yerel/mini blog, paywall veya sürekli 403 veren siteleri ekleme.\n\
         - JSON array olarak ver. Her eleman: {{\"name\": \"...\", \"homepage\": \"...\", \"rss\": \"...\", \"category\": \"gundem|ekonomi|spor|teknoloji|dunya|saglik|kultur\"}}.\n\
         - En fazla {max} kaynak."
    )
}

// ------------------------------------------------------------
// Response parsing
// ------------------------------------------------------------

static RE_JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json block regex"));

/// Extract the verdict from a model reply. The JSON may be wrapped in prose
/// or a markdown fence. `None` when no parseable object is present.
pub fn parse_analysis(text: &str) -> Option<Analysis> {
    let block = RE_JSON_BLOCK.find(text)?.as_str();
    let v: serde_json::Value = serde_json::from_str(block).ok()?;
    let obj = v.as_object()?;

    let importance = obj
        .get("importance")
        .and_then(|i| i.as_f64())
        .filter(|i| *i != 0.0 && i.is_finite())
        .map(|i| i.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(5);
    let category = obj
        .get("category")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let tags = obj
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let should_publish = !matches!(obj.get("shouldPublish"), Some(serde_json::Value::Bool(false)));

    Some(Analysis {
        importance,
        category,
        tags,
        should_publish,
    })
}

static RE_JSON_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("json array regex"));

/// Feed suggestions from a model reply. The feed URL is read from `rss`,
/// `feed` or `url`, in that order; entries without one are skipped.
pub fn parse_source_suggestions(text: &str) -> Vec<SourceSuggestion> {
    let Some(block) = RE_JSON_ARRAY.find(text) else {
        return Vec::new();
    };
    let Ok(serde_json::Value::Array(entries)) = serde_json::from_str(block.as_str()) else {
        return Vec::new();
    };
    let field = |obj: &serde_json::Map<String, serde_json::Value>, keys: &[&str]| {
        keys.iter()
            .filter_map(|k| obj.get(*k).and_then(|v| v.as_str()))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    };
    entries
        .iter()
        .filter_map(|e| e.as_object())
        .filter_map(|obj| {
            Some(SourceSuggestion {
                feed_url: field(obj, &["rss", "feed", "url"])?,
                name: field(obj, &["name"]),
                homepage: field(obj, &["homepage", "site"]),
                category: field(obj, &["category"]),
            })
        })
        .collect()
}

/// Single line, collapsed whitespace, bounded length.
pub fn sanitize_summary(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= 600 {
        return collapsed;
    }
    collapsed.chars().take(600).collect::<String>().trim_end().to_string()
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call and returns the model text.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        kind: PromptKind,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// Google Gemini `generateContent` provider.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::fetcher::USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
        })
    }
}

impl Provider for GeminiProvider {
    fn complete<'a>(
        &'a self,
        kind: PromptKind,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                role: &'a str,
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct GenerationConfig {
                temperature: f32,
                max_output_tokens: u32,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
                generation_config: GenerationConfig,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Option<RespContent>,
            }
            #[derive(Deserialize)]
            struct RespContent {
                #[serde(default)]
                parts: Vec<RespPart>,
            }
            #[derive(Deserialize)]
            struct RespPart {
                #[serde(default)]
                text: String,
            }

            let (temperature, max_output_tokens) = kind.generation();
            let req = Req {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature,
                    max_output_tokens,
                },
            };

            let resp = match self
                .http
                .post(&self.endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, provider = "gemini", "ai request failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                tracing::warn!(status = resp.status().as_u16(), provider = "gemini", "ai non-success status");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let text: String = body
                .candidates
                .first()
                .and_then(|c| c.content.as_ref())
                .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
                .unwrap_or_default();
            let text = text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
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
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Fixed replies for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub analysis: String,
    pub summary: String,
    pub sources: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            analysis: r#"{"importance": 5, "category": null, "tags": ["mock"], "shouldPublish": true}"#
                .to_string(),
            summary: "Özet (mock).".to_string(),
            sources: "[]".to_string(),
        }
    }
}

impl Provider for MockProvider {
    fn complete<'a>(
        &'a self,
        kind: PromptKind,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = match kind {
            PromptKind::Analysis => self.analysis.clone(),
            PromptKind::Summary => self.summary.clone(),
            PromptKind::Sources => self.sources.clone(),
        };
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(error = %e, dir = %cache_dir.display(), "ai cache dir unavailable");
        }
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made today (cache hits excluded).
    pub fn calls_today(&self) -> u32 {
        let g = self.counter.lock();
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    async fn complete_cached(&self, kind: PromptKind, prompt: &str) -> Option<String> {
        // Cache hits do not count against the limit.
        let key = cache_key(kind, prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Some(hit.text);
        }

        let text = self.complete_counted(kind, prompt).await?;
        let _ = write_cache_file(&self.cache_dir, &key, &CacheEntry { text: text.clone() });
        Some(text)
    }

    /// Daily limit check, then the real call. Nothing is cached.
    async fn complete_counted(&self, kind: PromptKind, prompt: &str) -> Option<String> {
        {
            let mut g = self.counter.lock();
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                tracing::debug!(provider = self.inner.name(), "ai daily limit reached");
                return None;
            }
        }

        let text = self.inner.complete(kind, prompt).await?;
        let mut g = self.counter.lock();
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Some(text)
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn analyze<'a>(
        &'a self,
        item: &'a NewsItem,
    ) -> Pin<Box<dyn Future<Output = Option<Analysis>> + Send + 'a>> {
        Box::pin(async move {
            let prompt = analysis_prompt(item);
            let text = self.complete_cached(PromptKind::Analysis, &prompt).await?;
            parse_analysis(&text)
        })
    }
    fn summarize<'a>(
        &'a self,
        item: &'a NewsItem,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let prompt = summary_prompt(item);
            let text = self.complete_cached(PromptKind::Summary, &prompt).await?;
            let cleaned = sanitize_summary(&text);
            if cleaned.is_empty() {
                None
            } else {
                Some(cleaned)
            }
        })
    }
    /// Discovery always asks the model; a cached list would never change.
    fn suggest_sources<'a>(
        &'a self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<SourceSuggestion>> + Send + 'a>> {
        Box::pin(async move {
            let prompt = sources_prompt(max);
            match self.complete_counted(PromptKind::Sources, &prompt).await {
                Some(text) => parse_source_suggestions(&text),
                None => Vec::new(),
            }
        })
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    text: String,
}

fn cache_key(kind: PromptKind, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.tag().as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CacheEntry> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_atomic(path: &Path, json: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, value: &CacheEntry) -> io::Result<()> {
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    write_atomic(&cache_path(dir, key), &json)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let json = serde_json::to_string(dc).map_err(io::Error::other)?;
    write_atomic(&counter_path(dir), &json)
}
