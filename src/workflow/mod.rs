// Fixed-sequence search orchestration shared by every workflow

use crate::config::SearchConfig;
use crate::error::{ErrorCode, KbError};
use crate::retrieval::{SearchQuery, SearchResult, SemanticSearcher};
use crate::strategies::{Params, SearchBreadth, SearchStrategy, WorkflowOutput};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;

/// Where a failed search went wrong, enough to reproduce it
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub workflow: String,
    pub query: String,
    pub params: Params,
}

/// Structured failure of a workflow search
///
/// A failed search is never reported as an empty result set; callers get
/// this instead, serialisable as `{code, message, context}`.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{code}: {message}")]
pub struct WorkflowError {
    pub code: ErrorCode,
    pub message: String,
    pub context: ErrorContext,
}

impl WorkflowError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            code,
            message: message.into(),
            context,
        }
    }

    pub fn from_error(error: &KbError, context: ErrorContext) -> Self {
        Self::new(error.code(), error.to_string(), context)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": self.message,
            "context": {
                "workflow": self.context.workflow,
                "query": self.context.query,
                "params": self.context.params,
            }
        })
    }
}

/// Drives a `SemanticSearcher` through one strategy's phases:
/// preprocess, search, adjust ranking, format.
pub struct WorkflowSearcher {
    searcher: Arc<dyn SemanticSearcher>,
    strategy: Arc<dyn SearchStrategy>,
    config: SearchConfig,
}

impl WorkflowSearcher {
    pub fn new(searcher: Arc<dyn SemanticSearcher>, strategy: Arc<dyn SearchStrategy>) -> Self {
        Self {
            searcher,
            strategy,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Swap the strategy used by subsequent searches
    pub fn set_strategy(&mut self, strategy: Arc<dyn SearchStrategy>) {
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &Arc<dyn SearchStrategy> {
        &self.strategy
    }

    /// Result count used when the caller does not pass one
    pub fn default_n_results(&self) -> usize {
        match self.strategy.breadth() {
            SearchBreadth::Precision => self.config.precision_results,
            SearchBreadth::Breadth => self.config.breadth_results,
        }
    }

    /// Run the four steps in order; any failure becomes a `WorkflowError`
    pub async fn search(
        &self,
        query: &str,
        params: &Params,
        n_results: Option<usize>,
    ) -> Result<WorkflowOutput, WorkflowError> {
        let workflow = self.strategy.name();
        let context = || ErrorContext {
            workflow: workflow.to_string(),
            query: query.to_string(),
            params: params.clone(),
        };
        let n_results = n_results.unwrap_or_else(|| self.default_n_results());
        if n_results == 0 {
            return Err(WorkflowError::new(
                ErrorCode::InvalidInput,
                "n_results must be at least 1",
                context(),
            ));
        }

        // 1. Preprocess
        let strategy = Arc::clone(&self.strategy);
        let (owned_query, owned_params) = (query.to_string(), params.clone());
        let search_query = tokio::spawn(async move {
            strategy.preprocess_query(&owned_query, &owned_params).await
        })
        .await
        .map_err(|e| join_failure(e, "preprocess_query", context()))?
        .map_err(|e| WorkflowError::from_error(&e, context()))?;

        tracing::debug!(
            "{} search: {:?} (expansions: {:?}, filters: {})",
            workflow,
            search_query.original,
            search_query.expanded_terms,
            search_query.filters.len()
        );

        // 2. Execute against the vector store under the caller's deadline
        let raw_results = self
            .execute(search_query, n_results)
            .await
            .map_err(|e| WorkflowError::from_error(&e, context()))?;
        let raw_count = raw_results.len();

        // 3. Adjust ranking
        let ranked = catch_unwind(AssertUnwindSafe(|| self.strategy.adjust_ranking(raw_results)))
            .map_err(|_| panic_failure("adjust_ranking", context()))?;

        if ranked.len() != raw_count {
            tracing::error!(
                "{} adjust_ranking returned {} results for {} inputs",
                workflow,
                ranked.len(),
                raw_count
            );
            return Err(WorkflowError::new(
                ErrorCode::InternalError,
                "adjust_ranking changed the number of results",
                context(),
            ));
        }

        // 4. Format
        let output = catch_unwind(AssertUnwindSafe(|| self.strategy.format_output(ranked, params)))
            .map_err(|_| panic_failure("format_output", context()))?
            .map_err(|e| WorkflowError::from_error(&e, context()))?;

        tracing::info!(
            "{} search returned {} results",
            workflow,
            output.total_results()
        );
        Ok(output)
    }

    async fn execute(
        &self,
        search_query: SearchQuery,
        n_results: usize,
    ) -> crate::error::Result<Vec<SearchResult>> {
        let searcher = Arc::clone(&self.searcher);
        let threshold = self.config.score_threshold;
        let handle = tokio::spawn(async move {
            searcher
                .search(
                    &search_query.original,
                    n_results,
                    &search_query.filters,
                    threshold,
                )
                .await
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.config.timeout(), handle).await {
            Ok(Ok(Ok(mut results))) => {
                results.truncate(n_results);
                Ok(results)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!("Vector search failed: {}", e);
                Err(match e.code() {
                    ErrorCode::UpstreamUnavailable | ErrorCode::InvalidInput => e,
                    _ => KbError::UpstreamUnavailable(e.to_string()),
                })
            }
            Ok(Err(join)) => Err(KbError::Internal(format!("vector search task failed: {}", join))),
            Err(_) => {
                abort.abort();
                tracing::warn!(
                    "Vector search exceeded {}ms deadline",
                    self.config.timeout_ms
                );
                Err(KbError::Timeout {
                    operation: "vector search".to_string(),
                    millis: self.config.timeout_ms,
                })
            }
        }
    }
}

fn join_failure(error: JoinError, phase: &str, context: ErrorContext) -> WorkflowError {
    if error.is_panic() {
        panic_failure(phase, context)
    } else {
        WorkflowError::new(
            ErrorCode::InternalError,
            format!("{} was cancelled", phase),
            context,
        )
    }
}

fn panic_failure(phase: &str, context: ErrorContext) -> WorkflowError {
    tracing::error!("{} strategy panicked in {}", context.workflow, phase);
    WorkflowError::new(
        ErrorCode::InternalError,
        format!("strategy panicked in {}", phase),
        context,
    )
}
