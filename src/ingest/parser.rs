// src/ingest/parser.rs
//! Feed parsing.
//!
//! Real-world Turkish feeds are frequently malformed (unescaped ampersands,
//! HTML entities XML does not know, unterminated items), so the default parser
//! does not rely on an XML parser succeeding. It scans for repeated
//! `<item>…</item>` segments (or Atom `<entry>`) and pulls fields out by tag
//! name. `StrictParser` is a quick-xml alternative behind the same trait.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{FeedParser, RawItem};

const TITLE_TAGS: &[&str] = &["title"];
const LINK_TAGS: &[&str] = &["link", "guid"];
const DATE_TAGS: &[&str] = &["pubDate", "dc:date", "published", "updated"];
const BODY_TAGS: &[&str] = &["description", "content:encoded", "summary", "content"];

static TAG_RES: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    TITLE_TAGS
        .iter()
        .chain(LINK_TAGS)
        .chain(DATE_TAGS)
        .chain(BODY_TAGS)
        .map(|t| (*t, compile_tag_regex(t)))
        .collect()
});
static RE_CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata regex"));
static RE_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z!][^<>]*>").expect("html tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("href regex")
});

fn compile_tag_regex(tag: &str) -> Regex {
    let t = regex::escape(tag);
    Regex::new(&format!(r"(?is)<{t}(?:\s[^>]*)?>(.*?)</{t}\s*>")).expect("tag regex")
}

/// Tolerant entry point: raw feed text in, cleaned items out. Never fails.
pub fn parse_feed(text: &str) -> Vec<RawItem> {
    let t0 = std::time::Instant::now();

    let mut blocks = segments(text, "item");
    if blocks.is_empty() {
        blocks = segments(text, "entry");
    }
    let out: Vec<RawItem> = blocks.into_iter().map(parse_block).collect();

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_parsed_total").increment(out.len() as u64);
    out
}

fn parse_block(block: &str) -> RawItem {
    let title = first_value(block, TITLE_TAGS, clean_title);
    let link = first_value(block, &LINK_TAGS[..1], clean_text)
        .or_else(|| {
            RE_HREF
                .captures(block)
                .and_then(|c| c.get(1))
                .map(|m| clean_text(m.as_str()))
                .filter(|s| !s.is_empty())
        })
        .or_else(|| first_value(block, &LINK_TAGS[1..], clean_text).filter(|g| looks_like_url(g)))
        .unwrap_or_default();
    let published_at = DATE_TAGS
        .iter()
        .filter_map(|t| tag_value(block, t))
        .find_map(|raw| parse_date(&clean_text(&raw)));
    let description = first_value(block, BODY_TAGS, clean_text).unwrap_or_default();

    RawItem {
        title: title.unwrap_or_default(),
        link,
        published_at,
        description,
    }
}

/// Bodies of every `<tag …>…</tag>` segment, matched case-insensitively.
///
/// An unterminated segment runs until the next opening tag or end of input.
pub fn segments<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        let after = start + open.len();
        match lower.as_bytes().get(after) {
            Some(b) if *b == b'>' || *b == b'/' || b.is_ascii_whitespace() => {}
            _ => {
                pos = after;
                continue;
            }
        }
        let Some(gt) = lower[after..].find('>') else {
            break;
        };
        let body_start = after + gt + 1;
        let close_at = lower[body_start..].find(&close).map(|i| body_start + i);
        let next_open = lower[body_start..].find(&open).map(|i| body_start + i);
        let body_end = match (close_at, next_open) {
            (Some(c), Some(n)) => c.min(n),
            (Some(c), None) => c,
            (None, Some(n)) => n,
            (None, None) => text.len(),
        };
        out.push(&text[body_start..body_end]);
        pos = if close_at == Some(body_end) {
            body_end + close.len()
        } else {
            body_end
        };
    }
    out
}

/// Raw inner text of the first `<tag>` in `block`.
pub fn tag_value(block: &str, tag: &str) -> Option<String> {
    let caps = match TAG_RES.get(tag) {
        Some(re) => re.captures(block),
        None => compile_tag_regex(tag).captures(block),
    }?;
    caps.get(1).map(|m| m.as_str().trim().to_string())
}

fn first_value(block: &str, tags: &[&str], clean: fn(&str) -> String) -> Option<String> {
    tags.iter()
        .filter_map(|t| tag_value(block, t))
        .map(|raw| clean(&raw))
        .find(|s| !s.is_empty())
}

/// CDATA unwrap → HTML strip → entity decode → escaped-markup strip →
/// whitespace collapse. Bodies often carry HTML escaped as entities, so the
/// decoded text is stripped once more; a bare `<` or `>` survives.
pub fn clean_text(raw: &str) -> String {
    let unwrapped = RE_CDATA.replace_all(raw, "$1");
    let stripped = RE_TAGS.replace_all(&unwrapped, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let restripped = RE_TAGS.replace_all(&decoded, " ");
    RE_WS.replace_all(&restripped, " ").trim().to_string()
}

/// Titles are plain text: real markup is removed, then entities decoded.
/// Nothing that came from an entity is treated as markup.
pub fn clean_title(raw: &str) -> String {
    let unwrapped = RE_CDATA.replace_all(raw, "$1");
    let stripped = RE_TAGS.replace_all(&unwrapped, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, dc:date). Anything else is `None`.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
        .or_else(|| {
            // chrono accepts obsolete zone names (GMT, EST) that `time` rejects.
            DateTime::parse_from_rfc2822(s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

/// Default parser: segment scanning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TolerantParser;

impl FeedParser for TolerantParser {
    fn parse(&self, text: &str) -> Vec<RawItem> {
        parse_feed(text)
    }

    fn name(&self) -> &'static str {
        "tolerant"
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "dc:date")]
    dc_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<String>,
    summary: Option<String>,
}

impl Item {
    fn into_raw(self) -> RawItem {
        let published_at = [&self.pub_date, &self.dc_date, &self.published, &self.updated]
            .into_iter()
            .flatten()
            .find_map(|d| parse_date(&clean_text(d)));
        let description = [self.description, self.content_encoded, self.summary]
            .into_iter()
            .flatten()
            .map(|d| clean_text(&d))
            .find(|d| !d.is_empty())
            .unwrap_or_default();
        RawItem {
            title: clean_title(self.title.as_deref().unwrap_or_default()),
            link: clean_text(self.link.as_deref().unwrap_or_default()),
            published_at,
            description,
        }
    }
}

/// quick-xml based parser for well-formed RSS 2.0. Falls back to the
/// tolerant scanner when the document does not parse.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictParser;

impl StrictParser {
    pub fn parse_strict(&self, text: &str) -> Result<Vec<RawItem>> {
        let xml_clean = scrub_html_entities_for_xml(text);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
        Ok(rss
            .channel
            .item
            .into_iter()
            .map(Item::into_raw)
            .collect())
    }
}

impl FeedParser for StrictParser {
    fn parse(&self, text: &str) -> Vec<RawItem> {
        match self.parse_strict(text) {
            Ok(items) => {
                counter!("ingest_items_parsed_total").increment(items.len() as u64);
                items
            }
            Err(e) => {
                tracing::debug!(target: "ingest", error = ?e, "strict parse failed, scanning instead");
                parse_feed(text)
            }
        }
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}

/// Replace HTML-only entities that XML parsers reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Pick a parser by its config name.
pub fn parser_by_name(name: &str) -> Box<dyn FeedParser> {
    match name.trim().to_ascii_lowercase().as_str() {
        "strict" => Box::new(StrictParser),
        _ => Box::new(TolerantParser),
    }
}
