//! Response structures produced by `format_output`

use crate::error::{KbError, Result};
use crate::retrieval::SearchResult;
use crate::strategies::explore::ExploratoryReport;
use crate::strategies::plan::PlanReport;
use crate::strategies::rcca::RccaReport;
use crate::strategies::trade_study::TradeStudyReport;
use serde::Serialize;

/// Final response of a workflow, discriminated by `result_type`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result_type")]
pub enum WorkflowOutput {
    #[serde(rename = "rcca_analysis")]
    RccaAnalysis(RccaReport),
    #[serde(rename = "trade_study")]
    TradeStudy(TradeStudyReport),
    #[serde(rename = "exploratory")]
    Exploratory(ExploratoryReport),
    #[serde(rename = "plan_support")]
    PlanSupport(PlanReport),
}

impl WorkflowOutput {
    pub fn result_type(&self) -> &'static str {
        match self {
            Self::RccaAnalysis(_) => "rcca_analysis",
            Self::TradeStudy(_) => "trade_study",
            Self::Exploratory(_) => "exploratory",
            Self::PlanSupport(_) => "plan_support",
        }
    }

    pub fn total_results(&self) -> usize {
        match self {
            Self::RccaAnalysis(report) => report.total_results,
            Self::TradeStudy(report) => report.total_results,
            Self::Exploratory(report) => report.total_results,
            Self::PlanSupport(report) => report.total_results,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| KbError::Json {
            source: e,
            context: format!("Failed to serialize {} output", self.result_type()),
        })
    }
}

/// A ranked chunk as presented to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub chunk_id: String,
    pub content: String,
    pub score: f32,
    pub original_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

impl From<&SearchResult> for ResultItem {
    fn from(result: &SearchResult) -> Self {
        Self {
            chunk_id: result.chunk_id.clone(),
            content: result.content.clone(),
            score: result.score,
            original_score: result.original_score(),
            document_title: result.document_title().map(str::to_string),
            section_title: result.section_title().map(str::to_string),
            document_type: result.document_type().map(str::to_string),
        }
    }
}
