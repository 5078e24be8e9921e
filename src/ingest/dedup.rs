// src/ingest/dedup.rs
use std::collections::HashMap;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::NewsItem;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Lowercased, whitespace-collapsed link; the title when there is no link.
/// Empty when both are blank, and all such items share that key.
pub fn dedup_key(item: &NewsItem) -> String {
    let basis = if item.link.trim().is_empty() {
        &item.title
    } else {
        &item.link
    };
    RE_WS.replace_all(basis.trim(), " ").to_lowercase()
}

/// Merge items reporting the same story. The first-seen item is the base and
/// keeps its position; later duplicates contribute their source name, an
/// earlier publish time, and any text the base is missing.
///
/// Returns the merged list and how many items were folded into another.
pub fn dedupe_items(items: Vec<NewsItem>) -> (Vec<NewsItem>, usize) {
    let mut out: Vec<NewsItem> = Vec::with_capacity(items.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged = 0usize;

    for item in items {
        let key = dedup_key(&item);
        match index.get(&key) {
            Some(&at) => {
                merge_into(&mut out[at], item);
                merged += 1;
            }
            None => {
                index.insert(key, out.len());
                out.push(with_own_source(item));
            }
        }
    }

    counter!("ingest_dedup_merged_total").increment(merged as u64);
    (out, merged)
}

fn with_own_source(mut item: NewsItem) -> NewsItem {
    push_unique(&mut item.sources, &item.source.clone());
    item
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !list.iter().any(|s| s == name) {
        list.push(name.to_string());
    }
}

fn fill_if_empty(target: &mut String, candidate: String) {
    if target.trim().is_empty() && !candidate.trim().is_empty() {
        *target = candidate;
    }
}

fn merge_into(base: &mut NewsItem, dup: NewsItem) {
    push_unique(&mut base.sources, &dup.source);
    for s in &dup.sources {
        push_unique(&mut base.sources, s);
    }
    if dup.published_at < base.published_at {
        base.published_at = dup.published_at;
    }
    fill_if_empty(&mut base.description, dup.description);
    fill_if_empty(&mut base.summary, dup.summary);
    fill_if_empty(&mut base.preview, dup.preview);
    if base.link.trim().is_empty() && !dup.link.trim().is_empty() {
        base.link = dup.link;
        base.id = base.link.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn item(title: &str, link: &str, source: &str, at: &str) -> NewsItem {
        let published_at = ts(at);
        NewsItem {
            id: NewsItem::derive_id(title, link, published_at),
            title: title.into(),
            link: link.into(),
            published_at,
            description: String::new(),
            summary: String::new(),
            preview: String::new(),
            source: source.into(),
            sources: vec![source.into()],
            category: Default::default(),
            importance: None,
            tags: vec![],
            ai_summary: None,
            should_publish: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn key_prefers_link_and_normalizes() {
        let a = item("X", "  HTTPS://Ornek.test/A ", "s", "2025-01-01T00:00:00Z");
        assert_eq!(dedup_key(&a), "https://ornek.test/a");
        let b = item("  Büyük   Haber ", "", "s", "2025-01-01T00:00:00Z");
        assert_eq!(dedup_key(&b), "büyük haber");
    }

    #[test]
    fn merges_sources_and_keeps_earliest_time() {
        let mut first = item("Deprem", "https://o.test/1", "A", "2025-01-01T10:00:00Z");
        first.description = String::new();
        let mut second = item("Deprem", "https://o.test/1", "B", "2025-01-01T09:00:00Z");
        second.description = "Ayrıntılar".into();
        let third = item("Deprem", "https://O.test/1", "A", "2025-01-01T11:00:00Z");

        let (out, merged) = dedupe_items(vec![first, second, third]);
        assert_eq!(merged, 2);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "A");
        assert_eq!(out[0].sources, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(out[0].published_at, ts("2025-01-01T09:00:00Z"));
        assert_eq!(out[0].description, "Ayrıntılar");
    }

    #[test]
    fn preserves_first_seen_order() {
        let (out, merged) = dedupe_items(vec![
            item("Bir", "https://o.test/1", "A", "2025-01-01T00:00:00Z"),
            item("İki", "https://o.test/2", "A", "2025-01-01T00:00:00Z"),
            item("Bir tekrar", "https://o.test/1", "B", "2025-01-01T00:00:00Z"),
            item("Üç", "", "B", "2025-01-01T00:00:00Z"),
        ]);
        assert_eq!(merged, 1);
        let titles: Vec<&str> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Bir", "İki", "Üç"]);
    }

    #[test]
    fn blank_items_collapse_into_one() {
        let mut second = item(" ", "", "B", "2025-01-01T08:00:00Z");
        second.description = "Metin".into();
        let (out, merged) = dedupe_items(vec![
            item("", "", "A", "2025-01-01T09:00:00Z"),
            item("Başlıklı", "", "A", "2025-01-01T00:00:00Z"),
            second,
        ]);
        assert_eq!(merged, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sources, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(out[0].published_at, ts("2025-01-01T08:00:00Z"));
        assert_eq!(out[0].description, "Metin");
        assert_eq!(out[1].title, "Başlıklı");
    }
}
