//! Workflow search strategies
//!
//! Every workflow implements the same three phases: preprocess the query,
//! adjust the ranking of what the vector store returned, and format the final
//! response. `WorkflowSearcher` drives those phases in a fixed order, so a
//! strategy never performs I/O of its own.

pub mod explore;
mod output;
pub mod plan;
pub mod rcca;
pub mod text;
pub mod trade_study;

pub use explore::ExploreStrategy;
pub use output::{ResultItem, WorkflowOutput};
pub use plan::PlanStrategy;
pub use rcca::RccaStrategy;
pub use trade_study::TradeStudyStrategy;

use crate::error::{KbError, Result};
use crate::retrieval::{clamp_score, SearchQuery, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Strategy-specific parameters (`alternatives`, `criteria`, `facets`, `category`, ...)
pub type Params = serde_json::Map<String, Value>;

/// Whether a workflow favours a short precise list or a broad one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBreadth {
    Precision,
    Breadth,
}

/// Three-phase contract shared by every workflow
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Registry key for this workflow
    fn name(&self) -> &'static str;

    /// Default result-count profile
    fn breadth(&self) -> SearchBreadth {
        SearchBreadth::Breadth
    }

    /// Build the query to execute. Asynchronous so a strategy may later call
    /// out to an expansion service; current strategies resolve immediately.
    async fn preprocess_query(&self, query: &str, params: &Params) -> Result<SearchQuery>;

    /// Re-score and re-order results. Scores stay in [0.0, 1.0] and ties keep
    /// their incoming order.
    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult>;

    /// Produce the final response; empty input yields an empty, well-formed report
    fn format_output(&self, results: Vec<SearchResult>, params: &Params) -> Result<WorkflowOutput>;
}

/// Apply a scoring function and stable-sort by the new score, best first
pub fn rerank_by<F>(results: Vec<SearchResult>, score: F) -> Vec<SearchResult>
where
    F: Fn(&SearchResult) -> f32,
{
    let mut rescored: Vec<SearchResult> = results
        .into_iter()
        .map(|result| {
            let adjusted = clamp_score(score(&result));
            if adjusted == result.score {
                result
            } else {
                result.rescored(adjusted)
            }
        })
        .collect();

    // sort_by is stable: equal scores keep vector-store order
    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    rescored
}

/// Read an optional list of strings; a comma-separated string is also accepted
pub fn string_list_param(params: &Params, key: &str) -> Result<Option<Vec<String>>> {
    let items: Vec<String> = match params.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    KbError::InvalidInput(format!("`{}` must be a list of strings", key))
                })
            })
            .collect::<Result<_>>()?,
        Some(_) => {
            return Err(KbError::InvalidInput(format!(
                "`{}` must be a list of strings",
                key
            )))
        }
    };

    Ok(Some(
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    ))
}

/// Read a required, non-empty list of strings
pub fn required_list_param(params: &Params, key: &str) -> Result<Vec<String>> {
    match string_list_param(params, key)? {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(KbError::InvalidInput(format!(
            "`{}` is required and must contain at least one entry",
            key
        ))),
    }
}

/// Read an optional string parameter
pub fn string_param(params: &Params, key: &str) -> Result<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(KbError::InvalidInput(format!("`{}` must be a string", key))),
    }
}

/// The fixed set of built-in workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Rcca,
    Trade,
    Explore,
    Plan,
}

impl Workflow {
    pub const ALL: [Workflow; 4] = [
        Workflow::Rcca,
        Workflow::Trade,
        Workflow::Explore,
        Workflow::Plan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rcca => "rcca",
            Self::Trade => "trade",
            Self::Explore => "explore",
            Self::Plan => "plan",
        }
    }

    /// Built-in strategy for this workflow
    pub fn strategy(&self) -> Arc<dyn SearchStrategy> {
        match self {
            Self::Rcca => Arc::new(RccaStrategy),
            Self::Trade => Arc::new(TradeStudyStrategy),
            Self::Explore => Arc::new(ExploreStrategy),
            Self::Plan => Arc::new(PlanStrategy),
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workflow {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KbError::InvalidInput(format!("Unknown workflow: {}", s)))
    }
}

/// Strategies keyed by workflow name
///
/// Adding a workflow means registering a strategy here; `WorkflowSearcher`
/// never changes.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn SearchStrategy>>,
}

impl StrategyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry holding the four built-in workflows
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for workflow in Workflow::ALL {
            registry.register(workflow.strategy());
        }
        registry
    }

    /// Register a strategy under its name, returning any strategy it replaced
    pub fn register(
        &mut self,
        strategy: Arc<dyn SearchStrategy>,
    ) -> Option<Arc<dyn SearchStrategy>> {
        tracing::debug!("Registering search strategy: {}", strategy.name());
        self.strategies.insert(strategy.name(), strategy)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SearchStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Look up a strategy, failing with `invalid_input` for unknown names
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SearchStrategy>> {
        self.get(name)
            .ok_or_else(|| KbError::InvalidInput(format!("No strategy registered for: {}", name)))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_rerank_is_stable_and_clamped() {
        let results = vec![
            SearchResult::new("a", "plain", 0.5),
            SearchResult::new("b", "boosted", 0.5),
            SearchResult::new("c", "plain", 0.5),
            SearchResult::new("d", "boosted", 0.95),
        ];

        let ranked = rerank_by(results, |r| {
            if r.content == "boosted" {
                r.score + 0.2
            } else {
                r.score
            }
        });

        let order: Vec<&str> = ranked.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "a", "c"]);
        assert_eq!(ranked[0].score, 1.0);
        assert_eq!(ranked[0].base_score, Some(0.95));
        assert_eq!(ranked[2].base_score, None);
    }

    #[test]
    fn test_string_list_param() {
        let p = params(json!({
            "alternatives": ["Vendor A", " ", "Vendor B "],
            "criteria": "cost, weight",
            "bad": [1, 2],
        }));

        assert_eq!(
            string_list_param(&p, "alternatives").unwrap(),
            Some(vec!["Vendor A".to_string(), "Vendor B".to_string()])
        );
        assert_eq!(
            string_list_param(&p, "criteria").unwrap(),
            Some(vec!["cost".to_string(), "weight".to_string()])
        );
        assert_eq!(string_list_param(&p, "missing").unwrap(), None);
        assert!(matches!(
            string_list_param(&p, "bad"),
            Err(KbError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_required_list_param() {
        let p = params(json!({ "criteria": [] }));
        assert!(required_list_param(&p, "criteria").is_err());
        assert!(required_list_param(&p, "alternatives").is_err());
    }

    #[test]
    fn test_string_param() {
        let p = params(json!({ "category": " risks ", "blank": "", "num": 3 }));
        assert_eq!(string_param(&p, "category").unwrap(), Some("risks".to_string()));
        assert_eq!(string_param(&p, "blank").unwrap(), None);
        assert!(string_param(&p, "num").is_err());
    }

    #[test]
    fn test_workflow_parsing() {
        assert_eq!("RCCA".parse::<Workflow>().unwrap(), Workflow::Rcca);
        assert_eq!("plan".parse::<Workflow>().unwrap(), Workflow::Plan);
        assert!("summarize".parse::<Workflow>().is_err());
    }

    #[test]
    fn test_registry_defaults() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["explore", "plan", "rcca", "trade"]);

        for workflow in Workflow::ALL {
            let strategy = registry.resolve(workflow.name()).unwrap();
            assert_eq!(strategy.name(), workflow.name());
        }
        assert!(registry.resolve("unknown").is_err());
        assert_eq!(
            registry.get("rcca").unwrap().breadth(),
            SearchBreadth::Precision
        );
    }
}
