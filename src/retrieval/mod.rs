//! Retrieval primitives shared by every workflow
//!
//! This module holds the value types exchanged with the vector store, the
//! `SemanticSearcher` seam, Reciprocal Rank Fusion, and the hybrid decorator
//! that merges dense and sparse result lists.

mod fusion;
mod hybrid;
mod memory;
mod searcher;

pub use fusion::{
    fuse_hybrid, reciprocal_rank_fusion, FusedDocument, FusionConfig, FusionError,
    FusionOutcome, RankedList, DEFAULT_RRF_K, DEFAULT_SEMANTIC_WEIGHT,
};
pub use hybrid::HybridSearcher;
pub use memory::{CorpusDocument, InMemorySearcher};
pub use searcher::SemanticSearcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known metadata keys attached by the ingestion pipeline
pub mod fields {
    pub const DOCUMENT_TITLE: &str = "document_title";
    pub const SECTION_TITLE: &str = "section_title";
    pub const CHUNK_TYPE: &str = "chunk_type";
    pub const NORMATIVE: &str = "normative";
    pub const DOCUMENT_TYPE: &str = "document_type";
}

/// Chunk metadata as delivered by the vector store payload
pub type Metadata = serde_json::Map<String, Value>;

/// Field filters passed through to the vector store
pub type Filters = BTreeMap<String, FilterValue>;

/// Clamp a score into [0.0, 1.0]; non-finite scores collapse to 0.0
pub fn clamp_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A ranked chunk returned by the search layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Opaque vector-store chunk identifier
    pub chunk_id: String,

    /// Chunk text
    pub content: String,

    /// Similarity, fused rank score, or strategy-adjusted score (0.0 to 1.0)
    pub score: f32,

    /// Payload metadata (titles, chunk type, normative flag, document type)
    #[serde(default)]
    pub metadata: Metadata,

    /// Score as produced by the search layer, recorded on the first rescoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_score: Option<f32>,
}

impl SearchResult {
    pub fn new(chunk_id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content: content.into(),
            score: clamp_score(score),
            metadata: Metadata::new(),
            base_score: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the score with a derived one, keeping the search-layer score
    pub fn rescored(mut self, score: f32) -> Self {
        if self.base_score.is_none() {
            self.base_score = Some(self.score);
        }
        self.score = clamp_score(score);
        self
    }

    /// Score before any strategy adjustment
    pub fn original_score(&self) -> f32 {
        self.base_score.unwrap_or(self.score)
    }

    /// How much strategies have moved the score
    pub fn boost(&self) -> f32 {
        self.score - self.original_score()
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn document_title(&self) -> Option<&str> {
        self.metadata_str(fields::DOCUMENT_TITLE)
    }

    pub fn section_title(&self) -> Option<&str> {
        self.metadata_str(fields::SECTION_TITLE)
    }

    pub fn chunk_type(&self) -> Option<&str> {
        self.metadata_str(fields::CHUNK_TYPE)
    }

    pub fn document_type(&self) -> Option<&str> {
        self.metadata_str(fields::DOCUMENT_TYPE)
    }

    pub fn is_normative(&self) -> bool {
        self.metadata
            .get(fields::NORMATIVE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Filter value matched against one metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Match(String),
    AnyOf(Vec<String>),
}

impl FilterValue {
    /// Whether a metadata value satisfies this filter. A missing field never matches.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };

        if let Value::Array(items) = value {
            return items.iter().any(|item| self.matches(Some(item)));
        }

        match self {
            Self::Flag(expected) => value.as_bool() == Some(*expected),
            Self::Match(expected) => value
                .as_str()
                .is_some_and(|v| v.eq_ignore_ascii_case(expected)),
            Self::AnyOf(options) => value
                .as_str()
                .is_some_and(|v| options.iter().any(|o| o.eq_ignore_ascii_case(v))),
        }
    }
}

/// Whether a metadata map satisfies every filter
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(field, filter)| filter.matches(metadata.get(field)))
}

/// Query representation produced by a strategy's preprocessing step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Raw user text
    pub original: String,

    /// Query variants and expansions, in order
    pub expanded_terms: Vec<String>,

    /// Field filters passed through to the vector store
    pub filters: Filters,

    /// Facet names, used only by faceted strategies
    pub facets: Vec<String>,
}

impl SearchQuery {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            ..Default::default()
        }
    }

    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.expanded_terms = terms;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    pub fn with_facets(mut self, facets: Vec<String>) -> Self {
        self.facets = facets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rescoring_keeps_base_score() {
        let result = SearchResult::new("c1", "text", 0.5).rescored(0.7).rescored(1.4);

        assert_eq!(result.score, 1.0);
        assert_eq!(result.base_score, Some(0.5));
        assert_eq!(result.original_score(), 0.5);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f32::NAN), 0.0);
        assert_eq!(clamp_score(0.42), 0.42);
    }

    #[test]
    fn test_metadata_accessors() {
        let result = SearchResult::new("c1", "text", 0.5)
            .with_metadata(fields::DOCUMENT_TITLE, "Wiring Handbook")
            .with_metadata(fields::NORMATIVE, true)
            .with_metadata(fields::DOCUMENT_TYPE, "standard");

        assert_eq!(result.document_title(), Some("Wiring Handbook"));
        assert_eq!(result.document_type(), Some("standard"));
        assert!(result.is_normative());
        assert_eq!(result.section_title(), None);
    }

    #[test]
    fn test_filter_matching() {
        let mut metadata = Metadata::new();
        metadata.insert("document_type".into(), json!("Standard"));
        metadata.insert("normative".into(), json!(true));
        metadata.insert("tags".into(), json!(["wiring", "connectors"]));

        let mut filters = Filters::new();
        filters.insert(
            "document_type".into(),
            FilterValue::AnyOf(vec!["standard".into(), "handbook".into()]),
        );
        filters.insert("normative".into(), FilterValue::Flag(true));
        filters.insert("tags".into(), FilterValue::Match("connectors".into()));
        assert!(matches_filters(&metadata, &filters));

        filters.insert("missing".into(), FilterValue::Match("x".into()));
        assert!(!matches_filters(&metadata, &filters));
    }
}
