// src/analyze/mod.rs
//! Text analysis stages: summarization, categorization, and the AI-backed
//! importance/publish step.

pub mod ai_adapter;
pub mod categorizer;
pub mod importance;
pub mod rate_limiter;
pub mod summarizer;
pub mod text;

pub use categorizer::{Categorizer, CategorizerParams, KeywordTable};
pub use importance::{enrich, filter_publishable, sort_by_importance, EnrichParams, EnrichStats};
pub use summarizer::Summarizer;
