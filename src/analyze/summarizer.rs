//! Frequency-based extractive summarizer.
//!
//! Sentences are scored by the summed corpus frequency of their non-stop words;
//! the best `sentence_count` sentences are emitted in their original order.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{fold, words};

pub const DEFAULT_SENTENCE_COUNT: usize = 2;
pub const DEFAULT_PREVIEW_LIMIT: usize = 220;

static RE_SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+[.!?]?").expect("sentence regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Turkish function words ignored when scoring.
pub const STOP_WORDS: &[&str] = &[
    "ve", "veya", "ile", "ama", "fakat", "ancak", "ise", "için", "bir", "birkaç", "daha", "çok",
    "az", "bu", "şu", "o", "da", "de", "ki", "mi", "ne", "nasıl", "niçin", "neden", "yada",
    "olarak", "üzere", "gibi", "hem", "her", "tüm", "artık", "zaten",
];

#[derive(Debug, Clone)]
pub struct Summarizer {
    sentence_count: usize,
    preview_limit: usize,
    stop_words: HashSet<String>,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(DEFAULT_SENTENCE_COUNT, DEFAULT_PREVIEW_LIMIT)
    }
}

#[derive(Debug)]
struct Scored<'a> {
    sentence: &'a str,
    score: usize,
    index: usize,
}

impl Summarizer {
    pub fn new(sentence_count: usize, preview_limit: usize) -> Self {
        Self {
            sentence_count: sentence_count.max(1),
            preview_limit: preview_limit.max(1),
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    /// Short texts (at most `sentence_count` sentences) come back unchanged
    /// apart from whitespace collapsing.
    pub fn summarize(&self, text: &str) -> String {
        let clean = RE_WS.replace_all(text, " ").trim().to_string();
        if clean.is_empty() {
            return String::new();
        }

        let sentences: Vec<&str> = RE_SENTENCE
            .find_iter(&clean)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.len() <= self.sentence_count {
            return clean;
        }

        let folded = fold(&clean);
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for w in words(&folded).filter(|w| !self.stop_words.contains(*w)) {
            *freq.entry(w).or_insert(0) += 1;
        }

        let mut scored: Vec<Scored<'_>> = sentences
            .iter()
            .enumerate()
            .map(|(index, sentence)| {
                let f = fold(sentence);
                let score = words(&f)
                    .filter(|w| !self.stop_words.contains(*w))
                    .map(|w| freq.get(w).copied().unwrap_or(0))
                    .sum();
                Scored {
                    sentence,
                    score,
                    index,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
        scored.truncate(self.sentence_count);
        scored.sort_by_key(|s| s.index);

        scored
            .iter()
            .map(|s| s.sentence)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Char-bounded preview with a trailing ellipsis when cut.
    pub fn preview(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() <= self.preview_limit {
            return trimmed.to_string();
        }
        let cut: String = trimmed.chars().take(self.preview_limit).collect();
        format!("{}…", cut.trim_end())
    }
}
