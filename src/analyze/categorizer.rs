//! Keyword-scoring categorizer.
//!
//! The keyword table is data (`config/categories.toml`, embedded as the default)
//! so rules can be extended without touching control flow.
//!
//! Policy, in order:
//! 1. A pinned source category wins outright.
//! 2. A declared non-default source category is kept only on strong evidence:
//!    `min_source_keyword_hits` keyword matches, or a title match.
//! 3. Otherwise the best-scoring category wins (ties by table order).
//! 4. With no keyword signal the item falls back to the general category, or to
//!    the declared one when `enforce_source_threshold` is off.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::text::fold;
use crate::model::Category;

const DEFAULT_TABLE: &str = include_str!("../../config/categories.toml");

/// Thresholds for trusting a feed's declared section label.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategorizerParams {
    pub min_source_keyword_hits: usize,
    pub title_match_keeps_source: bool,
    pub enforce_source_threshold: bool,
}

impl Default for CategorizerParams {
    fn default() -> Self {
        Self {
            min_source_keyword_hits: 2,
            title_match_keeps_source: true,
            enforce_source_threshold: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TableFile {
    #[serde(rename = "category")]
    categories: Vec<TableEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableEntry {
    name: Category,
    keywords: Vec<String>,
}

/// Ordered keyword table (folded keywords).
#[derive(Debug, Clone)]
pub struct KeywordTable {
    entries: Vec<(Category, Vec<String>)>,
}

impl KeywordTable {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(s).context("parsing category keyword table")?;
        let entries = file
            .categories
            .into_iter()
            .map(|e| {
                let mut kws: Vec<String> = e
                    .keywords
                    .iter()
                    .map(|k| fold(k.trim()))
                    .filter(|k| !k.is_empty())
                    .collect();
                kws.dedup();
                (e.name, kws)
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading keyword table from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn builtin() -> Self {
        // The embedded table is covered by tests; a parse failure here is a build defect.
        Self::from_toml_str(DEFAULT_TABLE).unwrap_or(Self {
            entries: Vec::new(),
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryScore {
    pub total: usize,
    pub in_title: usize,
}

#[derive(Debug, Clone)]
pub struct Categorizer {
    table: KeywordTable,
    params: CategorizerParams,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(KeywordTable::builtin(), CategorizerParams::default())
    }
}

impl Categorizer {
    pub fn new(table: KeywordTable, params: CategorizerParams) -> Self {
        Self { table, params }
    }

    pub fn params(&self) -> &CategorizerParams {
        &self.params
    }

    /// Per-category keyword hits over title and description.
    pub fn score(&self, title: &str, description: &str) -> HashMap<Category, CategoryScore> {
        let title_f = fold(title);
        let body_f = fold(&format!("{title} {description}"));
        let mut out = HashMap::new();
        for (cat, kws) in &self.table.entries {
            let mut s = CategoryScore::default();
            for kw in kws {
                if contains_word_prefix(&body_f, kw) {
                    s.total += 1;
                    if contains_word_prefix(&title_f, kw) {
                        s.in_title += 1;
                    }
                }
            }
            if s.total > 0 {
                out.insert(*cat, s);
            }
        }
        out
    }

    pub fn categorize(
        &self,
        title: &str,
        description: &str,
        declared: Option<Category>,
        pinned: bool,
    ) -> Category {
        if pinned {
            if let Some(c) = declared {
                return c;
            }
        }

        let scores = self.score(title, description);
        let declared_specific = declared.filter(|c| !c.is_default());

        if let Some(c) = declared_specific {
            let s = scores.get(&c).cloned().unwrap_or_default();
            let strong = s.total >= self.params.min_source_keyword_hits
                || (self.params.title_match_keeps_source && s.in_title > 0);
            if strong || (!self.params.enforce_source_threshold && s.total > 0) {
                return c;
            }
        }

        let mut best: Option<(Category, usize)> = None;
        for cat in self.table.categories() {
            // A weak declared label cannot win through the general ranking.
            if declared_specific == Some(cat) && self.params.enforce_source_threshold {
                continue;
            }
            let total = scores.get(&cat).map(|s| s.total).unwrap_or(0);
            if total > best.map(|(_, t)| t).unwrap_or(0) {
                best = Some((cat, total));
            }
        }
        if let Some((cat, _)) = best {
            return cat;
        }

        match declared {
            Some(c) if !self.params.enforce_source_threshold => c,
            _ => Category::Gundem,
        }
    }
}

/// True when `needle` occurs at the start of a word in `haystack`.
/// Suffixes are allowed (`faiz` matches `faizi`), prefixes are not
/// (`maç` does not match `amaç`).
fn contains_word_prefix(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map(|c| !c.is_alphabetic())
            .unwrap_or(true)
    })
}
