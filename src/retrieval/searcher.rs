//! The vector-store seam consumed by the workflow core

use crate::error::Result;
use crate::retrieval::{Filters, SearchResult};
use async_trait::async_trait;

/// Dense similarity search over the knowledge base
///
/// Implementations must be idempotent and side-effect free, and must return
/// results sorted by descending score.
#[async_trait]
pub trait SemanticSearcher: Send + Sync {
    /// Dense (embedding) search
    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filters: &Filters,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Sparse / BM25 search. `None` means the backend has no sparse capability.
    async fn keyword_search(
        &self,
        _query: &str,
        _n_results: usize,
        _filters: &Filters,
    ) -> Result<Option<Vec<SearchResult>>> {
        Ok(None)
    }
}
