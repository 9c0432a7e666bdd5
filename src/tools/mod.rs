//! Tool handlers exposed to the protocol layer
//!
//! Each search handler binds one workflow to a `WorkflowSearcher`, and when a
//! `project_id` is supplied records the query against that project after the
//! search completes. Recording is a separate unit of work from the search and
//! never runs inside the search deadline.

use crate::config::SearchConfig;
use crate::error::{KbError, Result};
use crate::project::{NewDecision, ProjectStatus};
use crate::retrieval::SemanticSearcher;
use crate::storage::ProjectRepository;
use crate::strategies::{Params, StrategyRegistry, Workflow};
use crate::workflow::{ErrorContext, WorkflowError, WorkflowSearcher};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Success payload or structured error
pub type ToolResult = std::result::Result<Value, WorkflowError>;

const RECENT_QUERIES: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RccaRequest {
    pub query: String,
    #[serde(default)]
    pub document_types: Option<Vec<String>>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub n_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeRequest {
    pub query: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub n_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExploreRequest {
    pub query: String,
    #[serde(default)]
    pub facets: Option<Vec<String>>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub n_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanRequest {
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub n_results: Option<usize>,
}

/// Knowledge-base tool surface
pub struct KnowledgeTools {
    searcher: Arc<dyn SemanticSearcher>,
    registry: StrategyRegistry,
    repository: Option<ProjectRepository>,
    config: SearchConfig,
}

impl KnowledgeTools {
    pub fn new(searcher: Arc<dyn SemanticSearcher>, config: SearchConfig) -> Self {
        Self {
            searcher,
            registry: StrategyRegistry::with_defaults(),
            repository: None,
            config,
        }
    }

    /// Enable project capture
    pub fn with_repository(mut self, repository: ProjectRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub async fn rcca(&self, request: RccaRequest) -> ToolResult {
        let mut params = Params::new();
        if let Some(types) = request.document_types {
            params.insert("document_types".into(), json!(types));
        }
        self.run(
            Workflow::Rcca.name(),
            &request.query,
            params,
            request.n_results,
            request.project_id.as_deref(),
        )
        .await
    }

    pub async fn trade(&self, request: TradeRequest) -> ToolResult {
        let mut params = Params::new();
        params.insert("alternatives".into(), json!(request.alternatives));
        params.insert("criteria".into(), json!(request.criteria));
        self.run(
            Workflow::Trade.name(),
            &request.query,
            params,
            request.n_results,
            request.project_id.as_deref(),
        )
        .await
    }

    pub async fn explore(&self, request: ExploreRequest) -> ToolResult {
        let mut params = Params::new();
        if let Some(facets) = request.facets {
            params.insert("facets".into(), json!(facets));
        }
        self.run(
            Workflow::Explore.name(),
            &request.query,
            params,
            request.n_results,
            request.project_id.as_deref(),
        )
        .await
    }

    pub async fn plan(&self, request: PlanRequest) -> ToolResult {
        let mut params = Params::new();
        if let Some(category) = request.category {
            params.insert("category".into(), json!(category));
        }
        self.run(
            Workflow::Plan.name(),
            &request.query,
            params,
            request.n_results,
            request.project_id.as_deref(),
        )
        .await
    }

    /// Run any registered workflow by name
    pub async fn run(
        &self,
        workflow: &str,
        query: &str,
        params: Params,
        n_results: Option<usize>,
        project_id: Option<&str>,
    ) -> ToolResult {
        let context = || ErrorContext {
            workflow: workflow.to_string(),
            query: query.to_string(),
            params: params.clone(),
        };
        let fail = |e: KbError| WorkflowError::from_error(&e, context());

        let query = self.validate_query(query).map_err(fail)?;
        let strategy = self.registry.resolve(workflow).map_err(fail)?;

        // Resolve the project before searching so a bad id fails fast
        let project = match project_id {
            Some(raw) => Some(self.require_project(raw).await.map_err(fail)?),
            None => None,
        };

        let output = WorkflowSearcher::new(Arc::clone(&self.searcher), strategy)
            .with_config(self.config.clone())
            .search(&query, &params, n_results)
            .await?;

        if let Some(project_id) = project {
            let total = output.total_results();
            let captured = query.clone();
            self.blocking(move |repo| repo.capture_query(&project_id, &captured, total))
                .await
                .map_err(fail)?;
        }

        output.to_json().map_err(fail)
    }

    /// Create a project in `PLANNING`
    pub async fn start_project(&self, name: &str, description: Option<&str>) -> ToolResult {
        let (name, description) = (name.to_string(), description.map(str::to_string));
        let context = ErrorContext {
            workflow: "start_project".into(),
            query: name.clone(),
            ..ErrorContext::default()
        };

        let project = self
            .blocking(move |repo| repo.create(&name, description.as_deref()))
            .await
            .map_err(|e| WorkflowError::from_error(&e, context))?;
        Ok(json!({ "project": project }))
    }

    /// Move a project through its lifecycle
    pub async fn transition_project(&self, project_id: &str, status: &str) -> ToolResult {
        let context = ErrorContext {
            workflow: "transition_project".into(),
            query: format!("{} -> {}", project_id, status),
            ..ErrorContext::default()
        };
        let fail = |e: KbError| WorkflowError::from_error(&e, context.clone());

        let id = parse_project_id(project_id).map_err(fail)?;
        let target: ProjectStatus = status.parse().map_err(fail)?;
        let project = self
            .blocking(move |repo| repo.transition_state(&id, target))
            .await
            .map_err(fail)?;
        Ok(json!({ "project": project }))
    }

    /// Record a decision with its supporting chunks
    pub async fn record_decision(&self, project_id: &str, decision: NewDecision) -> ToolResult {
        let context = ErrorContext {
            workflow: "record_decision".into(),
            query: decision.decision.clone(),
            ..ErrorContext::default()
        };
        let fail = |e: KbError| WorkflowError::from_error(&e, context.clone());

        let id = parse_project_id(project_id).map_err(fail)?;
        let recorded = self
            .blocking(move |repo| repo.capture_decision(&id, &decision))
            .await
            .map_err(fail)?;
        Ok(json!({ "decision": recorded }))
    }

    /// Project state plus recent queries and recorded decisions
    pub async fn project_summary(&self, project_id: &str) -> ToolResult {
        let context = ErrorContext {
            workflow: "project_summary".into(),
            query: project_id.to_string(),
            ..ErrorContext::default()
        };
        let fail = |e: KbError| WorkflowError::from_error(&e, context.clone());

        let id = parse_project_id(project_id).map_err(fail)?;
        self.blocking(move |repo| {
            let project = repo
                .get_by_id(&id)?
                .ok_or_else(|| KbError::project_not_found(id.to_string()))?;
            let history = repo.query_history(&id)?;
            let recent: Vec<_> = history.iter().rev().take(RECENT_QUERIES).collect();
            let decisions = repo
                .decisions(&id)?
                .into_iter()
                .map(|decision| {
                    let sources = repo.decision_sources(decision.id)?;
                    Ok(json!({ "decision": decision, "sources": sources }))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(json!({
                "project": project,
                "query_count": history.len(),
                "recent_queries": recent,
                "decision_count": decisions.len(),
                "decisions": decisions,
            }))
        })
        .await
        .map_err(fail)
    }

    fn validate_query(&self, query: &str) -> Result<String> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(KbError::InvalidInput("query must not be empty".into()));
        }
        let chars = trimmed.chars().count();
        if chars > self.config.max_query_chars {
            return Err(KbError::InvalidInput(format!(
                "query is {} characters; the limit is {}",
                chars, self.config.max_query_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    async fn require_project(&self, raw: &str) -> Result<Uuid> {
        let id = parse_project_id(raw)?;
        let exists = self.blocking(move |repo| repo.get_by_id(&id)).await?;
        match exists {
            Some(_) => Ok(id),
            None => Err(KbError::project_not_found(raw)),
        }
    }

    /// Run a repository call on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProjectRepository) -> Result<T> + Send + 'static,
    {
        let repo = self.repository.clone().ok_or_else(|| {
            KbError::InvalidInput("project capture is not configured".to_string())
        })?;

        tokio::task::spawn_blocking(move || f(&repo))
            .await
            .map_err(|e| KbError::Internal(format!("repository task failed: {}", e)))?
    }
}

fn parse_project_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| KbError::project_not_found(raw))
}

/// Error payload for the protocol layer
pub fn error_response(error: &WorkflowError) -> Value {
    json!({ "error": error.to_json() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::retrieval::{CorpusDocument, InMemorySearcher};

    fn tools() -> KnowledgeTools {
        let corpus = vec![
            CorpusDocument::new("c1", "Connector failure root cause was corrosion."),
            CorpusDocument::new("c2", "Connector pinout table."),
        ];
        KnowledgeTools::new(
            Arc::new(InMemorySearcher::new(corpus)),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_query_length_validated() {
        let tools = tools();

        let err = tools
            .rcca(RccaRequest {
                query: "   ".into(),
                ..RccaRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let err = tools
            .rcca(RccaRequest {
                query: "x".repeat(2001),
                ..RccaRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_trade_without_alternatives_is_invalid_input() {
        let err = tools()
            .trade(TradeRequest {
                query: "connector supplier".into(),
                criteria: vec!["cost".into()],
                ..TradeRequest::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(err.context.workflow, "trade");
        assert!(err.message.contains("alternatives"));
    }

    #[tokio::test]
    async fn test_project_id_without_repository() {
        let err = tools()
            .explore(ExploreRequest {
                query: "connector".into(),
                project_id: Some(Uuid::new_v4().to_string()),
                ..ExploreRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_explore_returns_output_json() {
        let value = tools()
            .explore(ExploreRequest {
                query: "connector".into(),
                ..ExploreRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(value["result_type"], "exploratory");
    }

    #[test]
    fn test_error_response_shape() {
        let err = WorkflowError::new(
            ErrorCode::UpstreamUnavailable,
            "timed out",
            ErrorContext::default(),
        );
        assert_eq!(error_response(&err)["error"]["code"], "upstream_unavailable");
    }
}
