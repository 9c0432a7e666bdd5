//! Hybrid search combining semantic and keyword search

use crate::config::FusionSettings;
use crate::error::Result;
use crate::retrieval::{
    clamp_score, fuse_hybrid, Filters, FusionConfig, SearchResult, SemanticSearcher,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Decorator that fuses a backend's dense and sparse rankings with RRF
///
/// Fused scores are divided by the best achievable fused score so they stay
/// in [0.0, 1.0]. Backends without sparse capability pass through unchanged.
pub struct HybridSearcher {
    inner: Arc<dyn SemanticSearcher>,
    config: FusionConfig,
    candidate_multiplier: usize,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    pub fn new(inner: Arc<dyn SemanticSearcher>, config: FusionConfig) -> Self {
        Self {
            inner,
            config,
            candidate_multiplier: 2,
        }
    }

    /// Build from the `[fusion]` configuration section
    pub fn from_settings(
        inner: Arc<dyn SemanticSearcher>,
        settings: &FusionSettings,
    ) -> Result<Self> {
        let config = FusionConfig::new(settings.rrf_k, settings.semantic_weight)?;
        Ok(Self::new(inner, config).with_candidate_multiplier(settings.candidate_multiplier))
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}

#[async_trait]
impl SemanticSearcher for HybridSearcher {
    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filters: &Filters,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let candidate_limit = n_results.saturating_mul(self.candidate_multiplier);

        let (dense, sparse) = tokio::join!(
            self.inner
                .search(query, candidate_limit, filters, score_threshold),
            self.inner.keyword_search(query, candidate_limit, filters)
        );

        let mut dense = dense?;
        let sparse = match sparse {
            Ok(sparse) => sparse,
            Err(e) => {
                tracing::warn!("Keyword search failed, using dense results only: {}", e);
                None
            }
        };

        let dense_ids: Vec<String> = dense.iter().map(|r| r.chunk_id.clone()).collect();
        let sparse_ids: Option<Vec<String>> = sparse
            .as_ref()
            .map(|results| results.iter().map(|r| r.chunk_id.clone()).collect());

        let outcome = fuse_hybrid(&dense_ids, sparse_ids.as_deref(), &self.config);
        if outcome.degraded {
            dense.truncate(n_results);
            return Ok(dense);
        }

        // Dense payloads take precedence when both lists carry the chunk
        let mut by_id: HashMap<String, SearchResult> = HashMap::new();
        for result in sparse.into_iter().flatten().chain(dense) {
            by_id.insert(result.chunk_id.clone(), result);
        }

        let ceiling = self.config.score_ceiling();
        let fused: Vec<SearchResult> = outcome
            .documents
            .into_iter()
            .filter_map(|doc| {
                by_id.remove(&doc.id).map(|mut result| {
                    result.score = clamp_score((doc.score / ceiling) as f32);
                    result
                })
            })
            .take(n_results)
            .collect();

        tracing::debug!(
            "Hybrid search fused {} dense + {} sparse candidates into {} results",
            dense_ids.len(),
            sparse_ids.map(|ids| ids.len()).unwrap_or(0),
            fused.len()
        );

        Ok(fused)
    }

    async fn keyword_search(
        &self,
        query: &str,
        n_results: usize,
        filters: &Filters,
    ) -> Result<Option<Vec<SearchResult>>> {
        self.inner.keyword_search(query, n_results, filters).await
    }
}
