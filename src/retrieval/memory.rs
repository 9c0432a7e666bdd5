//! Corpus-backed searcher for local runs and tests
//!
//! Dense scores are the fraction of distinct query terms present in a chunk;
//! sparse scores are summed term frequencies normalised by the best candidate.

use crate::error::{KbError, Result};
use crate::retrieval::{
    clamp_score, matches_filters, Filters, Metadata, SearchResult, SemanticSearcher,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "in", "is", "it", "of", "on", "or",
    "the", "to", "with",
];

/// One chunk of the in-memory corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub chunk_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CorpusDocument {
    pub fn new(chunk_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn to_result(&self, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: self.chunk_id.clone(),
            content: self.content.clone(),
            score: clamp_score(score),
            metadata: self.metadata.clone(),
            base_score: None,
        }
    }
}

struct IndexedDocument {
    document: CorpusDocument,
    term_counts: HashMap<String, usize>,
}

/// In-memory searcher over a fixed corpus
pub struct InMemorySearcher {
    documents: Vec<IndexedDocument>,
    keyword_index: bool,
}

impl InMemorySearcher {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        let documents = documents
            .into_iter()
            .map(|document| {
                let mut term_counts = HashMap::new();
                for term in tokenize(&document.content) {
                    *term_counts.entry(term).or_insert(0) += 1;
                }
                IndexedDocument {
                    document,
                    term_counts,
                }
            })
            .collect();

        Self {
            documents,
            keyword_index: true,
        }
    }

    /// Load a corpus from a JSON array of `{chunk_id, content, metadata}` objects
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to read corpus file: {}", path.display()),
        })?;
        let documents: Vec<CorpusDocument> =
            serde_json::from_str(&content).map_err(|e| KbError::Json {
                source: e,
                context: format!("Failed to parse corpus file: {}", path.display()),
            })?;

        tracing::info!("Loaded {} corpus chunks from {}", documents.len(), path.display());
        Ok(Self::new(documents))
    }

    /// Report no sparse capability, as a dense-only vector store would
    pub fn without_keyword_index(mut self) -> Self {
        self.keyword_index = false;
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn candidates<'a>(&'a self, filters: &'a Filters) -> impl Iterator<Item = &'a IndexedDocument> {
        self.documents
            .iter()
            .filter(move |d| matches_filters(&d.document.metadata, filters))
    }
}

#[async_trait]
impl SemanticSearcher for InMemorySearcher {
    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filters: &Filters,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<SearchResult> = self
            .candidates(filters)
            .filter_map(|d| {
                let hits = query_terms
                    .iter()
                    .filter(|t| d.term_counts.contains_key(*t))
                    .count();
                let score = hits as f32 / query_terms.len() as f32;
                (hits > 0 && score >= score_threshold).then(|| d.document.to_result(score))
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(n_results);

        Ok(results)
    }

    async fn keyword_search(
        &self,
        query: &str,
        n_results: usize,
        filters: &Filters,
    ) -> Result<Option<Vec<SearchResult>>> {
        if !self.keyword_index {
            return Ok(None);
        }

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        let mut scored: Vec<(&IndexedDocument, usize)> = self
            .candidates(filters)
            .map(|d| {
                let tf: usize = query_terms
                    .iter()
                    .filter_map(|t| d.term_counts.get(t))
                    .sum();
                (d, tf)
            })
            .filter(|(_, tf)| *tf > 0)
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(n_results);

        let best = scored.first().map(|(_, tf)| *tf).unwrap_or(1) as f32;
        Ok(Some(
            scored
                .into_iter()
                .map(|(d, tf)| d.document.to_result(tf as f32 / best))
                .collect(),
        ))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}
