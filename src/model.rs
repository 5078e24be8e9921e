//! Core data types shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed category set. Serialized with Turkish diacritics; parsing also
/// accepts the ASCII-folded spellings used by feed section labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Category {
    #[default]
    Gundem,
    Spor,
    Ekonomi,
    Teknoloji,
    Saglik,
    Siyaset,
    Kultur,
    Dunya,
    Karaman,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Gundem,
        Category::Spor,
        Category::Ekonomi,
        Category::Teknoloji,
        Category::Saglik,
        Category::Siyaset,
        Category::Kultur,
        Category::Dunya,
        Category::Karaman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Gundem => "gündem",
            Category::Spor => "spor",
            Category::Ekonomi => "ekonomi",
            Category::Teknoloji => "teknoloji",
            Category::Saglik => "sağlık",
            Category::Siyaset => "siyaset",
            Category::Kultur => "kültür",
            Category::Dunya => "dünya",
            Category::Karaman => "karaman",
        }
    }

    /// The general bucket every unclassified item lands in.
    pub fn is_default(&self) -> bool {
        *self == Category::Gundem
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = crate::analyze::text::fold(s.trim());
        let ascii: String = folded
            .chars()
            .map(|c| match c {
                'ğ' => 'g',
                'ü' => 'u',
                'ş' => 's',
                'ı' => 'i',
                'ö' => 'o',
                'ç' => 'c',
                other => other,
            })
            .collect();
        match ascii.as_str() {
            "gundem" | "genel" | "guncel" => Ok(Category::Gundem),
            "spor" => Ok(Category::Spor),
            "ekonomi" => Ok(Category::Ekonomi),
            "teknoloji" => Ok(Category::Teknoloji),
            "saglik" => Ok(Category::Saglik),
            "siyaset" | "politika" => Ok(Category::Siyaset),
            "kultur" | "kultur-sanat" | "sanat" => Ok(Category::Kultur),
            "dunya" => Ok(Category::Dunya),
            "karaman" => Ok(Category::Karaman),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One story, possibly reported by several outlets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub link: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub preview: String,
    pub source: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewsItem {
    /// Stable identity: the link when present, else title + publish time.
    pub fn derive_id(title: &str, link: &str, published_at: DateTime<Utc>) -> String {
        if link.trim().is_empty() {
            format!("{}-{}", title, published_at.to_rfc3339())
        } else {
            link.trim().to_string()
        }
    }

    /// Natural key used by the store: link, or the synthetic id for linkless items.
    pub fn store_key(&self) -> &str {
        if self.link.is_empty() {
            &self.id
        } else {
            &self.link
        }
    }

    /// Importance with the pipeline's neutral default.
    pub fn importance_or_neutral(&self) -> u8 {
        self.importance.unwrap_or(5)
    }
}
