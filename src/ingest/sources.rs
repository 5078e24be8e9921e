// src/ingest/sources.rs
//! Feed source registry: built-in outlets plus an optional user file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedSource;
use crate::model::Category;

const ENV_PATH: &str = "HABER_SOURCES_PATH";

/// Outlets every deployment starts with. The regional feeds are pinned so their
/// items always land in the regional category.
pub fn default_sources() -> Vec<FeedSource> {
    use Category::*;
    let general = [
        ("TRT Haber", "https://www.trthaber.com/manset.rss", Gundem),
        ("Anadolu Ajansı", "https://www.aa.com.tr/tr/rss/default?cat=guncel", Gundem),
        ("Habertürk", "https://www.haberturk.com/rss/manset.xml", Gundem),
        ("NTV", "https://www.ntv.com.tr/gundem.rss", Gundem),
        ("Sözcü", "https://www.sozcu.com.tr/rss/anasayfa.xml", Gundem),
        ("Sabah", "https://www.sabah.com.tr/rss/gundem.xml", Gundem),
        ("Hürriyet", "https://www.hurriyet.com.tr/rss/gundem", Gundem),
        ("Milliyet", "https://www.milliyet.com.tr/rss/rssNew/gundemRSS.xml", Gundem),
        ("Cumhuriyet", "https://www.cumhuriyet.com.tr/rss/son_dakika.xml", Gundem),
        ("CNN Türk", "https://www.cnnturk.com/feed/rss/turkiye/news", Gundem),
        ("Mynet Haber", "https://www.mynet.com/haber/rss/kategori/gundem", Gundem),
        ("SonDakika.com", "https://www.sondakika.com/rss/", Gundem),
        ("En Son Haber", "https://www.ensonhaber.com/rss/ensonhaber.xml", Gundem),
        ("TRT Spor", "https://www.trthaber.com/spor.rss", Spor),
        ("Fanatik", "https://www.fanatik.com.tr/rss/spor.xml", Spor),
        ("NTV Spor", "https://www.ntv.com.tr/spor.rss", Spor),
        ("TRT Ekonomi", "https://www.trthaber.com/ekonomi.rss", Ekonomi),
        ("NTV Teknoloji", "https://www.ntv.com.tr/teknoloji.rss", Teknoloji),
    ];
    let regional = [
        ("Karaman Gündem", "https://www.karamangundem.com/rss"),
        ("Karaman Haber", "https://www.karamanhaber.com/feed/"),
        ("Karamandan", "https://www.karamandan.com/rss"),
    ];

    general
        .iter()
        .map(|(name, url, cat)| FeedSource::new(name, url, Some(*cat)))
        .chain(
            regional
                .iter()
                .map(|(name, url)| FeedSource::new(name, url, Some(Karaman)).pinned()),
        )
        .collect()
}

/// Lenient on-disk shape: name and category are optional, unknown categories
/// are dropped rather than failing the whole file.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    #[serde(default)]
    name: Option<String>,
    url: String,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    pinned: bool,
}

impl SourceEntry {
    fn into_source(self) -> FeedSource {
        let url = self.url.trim().to_string();
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| name_from_url(&url));
        let category = self.category.as_deref().and_then(|c| match c.parse() {
            Ok(cat) => Some(cat),
            Err(e) => {
                tracing::debug!(target: "ingest", source = %name, error = %e, "ignoring source category");
                None
            }
        });
        FeedSource {
            name,
            url,
            homepage: self.homepage.filter(|h| !h.trim().is_empty()),
            category,
            pinned: self.pinned,
        }
    }
}

/// Host without a leading `www.`, or the raw string when it does not parse.
pub fn name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// Load extra sources from an explicit path. Supports JSON or TOML.
pub fn load_sources_from(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Resolve the user source file:
/// 1) $HABER_SOURCES_PATH
/// 2) data/sources.json
/// 3) data/sources.toml
///
/// No file means no extra sources.
pub fn load_sources_default() -> Result<Vec<FeedSource>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("{ENV_PATH} points to non-existent path"));
    }
    for candidate in ["data/sources.json", "data/sources.toml"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_sources_from(&pb);
        }
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<FeedSource>> {
    let entries = if hint_ext == "toml" {
        parse_toml(s).or_else(|_| parse_json(s))
    } else {
        parse_json(s).or_else(|_| parse_toml(s))
    }
    .map_err(|e| anyhow!("unsupported sources format: {e}"))?;
    Ok(entries.into_iter().map(SourceEntry::into_source).collect())
}

fn parse_toml(s: &str) -> Result<Vec<SourceEntry>> {
    #[derive(Deserialize)]
    struct TomlSources {
        #[serde(rename = "source")]
        sources: Vec<SourceEntry>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceEntry>> {
    Ok(serde_json::from_str(s)?)
}

/// Write the user source file through a temp file and rename. The format
/// follows the extension: TOML for `.toml`, JSON otherwise.
pub fn persist_sources(path: &Path, sources: &[FeedSource]) -> Result<()> {
    #[derive(Serialize)]
    struct TomlOut<'a> {
        source: &'a [FeedSource],
    }
    let is_toml = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let body = if is_toml {
        toml::to_string_pretty(&TomlOut { source: sources })?
    } else {
        serde_json::to_string_pretty(sources)?
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Where discovered sources are written: $HABER_SOURCES_PATH, else an
/// existing `data/sources.toml`, else `data/sources.json`.
pub fn sources_path_default() -> PathBuf {
    if let Ok(p) = std::env::var(ENV_PATH) {
        return PathBuf::from(p);
    }
    let toml = PathBuf::from("data/sources.toml");
    if toml.exists() && !Path::new("data/sources.json").exists() {
        return toml;
    }
    PathBuf::from("data/sources.json")
}

/// Drop empty URLs and repeats (case-insensitive URL), keeping first occurrence.
pub fn dedupe_sources(list: Vec<FeedSource>) -> Vec<FeedSource> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter_map(|mut s| {
            s.url = s.url.trim().to_string();
            if s.url.is_empty() || !seen.insert(s.url.to_lowercase()) {
                return None;
            }
            if s.name.trim().is_empty() {
                s.name = name_from_url(&s.url);
            }
            Some(s)
        })
        .collect()
}

/// Defaults (unless disabled) followed by user sources, deduplicated.
pub fn resolve_sources(include_defaults: bool, extra: Vec<FeedSource>) -> Vec<FeedSource> {
    let mut all = if include_defaults {
        default_sources()
    } else {
        Vec::new()
    };
    all.extend(extra);
    dedupe_sources(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_are_unique_and_regional_feeds_pinned() {
        let d = default_sources();
        assert_eq!(dedupe_sources(d.clone()).len(), d.len());
        let pinned: Vec<_> = d.iter().filter(|s| s.pinned).collect();
        assert_eq!(pinned.len(), 3);
        assert!(pinned.iter().all(|s| s.category == Some(Category::Karaman)));
    }

    #[test]
    fn json_and_toml_formats_work() {
        let json = r#"[
            {"name": " Yerel ", "url": "https://yerel.test/rss", "category": "Sağlık"},
            {"url": "https://www.isimsiz.test/feed", "category": "magazin"}
        ]"#;
        let out = parse_sources(json, "json").unwrap();
        assert_eq!(out[0].name, "Yerel");
        assert_eq!(out[0].category, Some(Category::Saglik));
        assert_eq!(out[1].name, "isimsiz.test");
        assert_eq!(out[1].category, None);

        let toml = r#"
            [[source]]
            name = "Bölge"
            url = "https://bolge.test/rss"
            category = "karaman"
            pinned = true
        "#;
        let out = parse_sources(toml, "toml").unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].pinned);
        assert_eq!(out[0].category, Some(Category::Karaman));

        assert!(parse_sources("not a list", "json").is_err());
    }

    #[test]
    fn dedupe_is_case_insensitive_on_url() {
        let list = vec![
            FeedSource::new("A", "https://A.test/rss", None),
            FeedSource::new("B", " https://a.test/RSS ", None),
            FeedSource::new("", "https://c.test/rss", None),
            FeedSource::new("D", "  ", None),
        ];
        let out = dedupe_sources(list);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "A");
        assert_eq!(out[1].name, "c.test");
    }

    #[test]
    fn user_sources_follow_defaults() {
        let extra = vec![
            FeedSource::new("Kopya", "https://www.ntv.com.tr/gundem.rss", None),
            FeedSource::new("Yeni", "https://yeni.test/rss", None),
        ];
        let all = resolve_sources(true, extra.clone());
        assert_eq!(all.len(), default_sources().len() + 1);
        assert_eq!(all.last().map(|s| s.name.as_str()), Some("Yeni"));

        let only = resolve_sources(false, extra);
        assert_eq!(only.len(), 2);
    }

    #[test]
    fn persisted_sources_load_back_in_both_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spor = FeedSource::new("Spor", "https://spor.test/rss", Some(Category::Spor));
        spor.homepage = Some("https://spor.test".into());
        let list = vec![
            spor,
            FeedSource::new("Bölge", "https://bolge.test/rss", Some(Category::Karaman)).pinned(),
            FeedSource::new("Düz", "https://duz.test/rss", None),
        ];
        for name in ["alt/sources.json", "sources.toml"] {
            let p = tmp.path().join(name);
            persist_sources(&p, &list).unwrap();
            assert_eq!(load_sources_from(&p).unwrap(), list, "{name}");
            assert!(!p.with_extension("tmp").exists());
        }
    }

    #[serial_test::serial]
    #[test]
    fn default_loader_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PATH);

        assert!(load_sources_default().unwrap().is_empty());

        let p = tmp.path().join("benim.json");
        fs::write(&p, r#"[{"name": "X", "url": "https://x.test/rss"}]"#).unwrap();
        env::set_var(ENV_PATH, p.display().to_string());
        let v = load_sources_default().unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].name, "X");

        env::set_var(ENV_PATH, tmp.path().join("yok.json").display().to_string());
        assert!(load_sources_default().is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
