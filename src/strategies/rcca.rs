//! Root-cause and corrective-action (RCCA) analysis

use crate::error::Result;
use crate::retrieval::{fields, FilterValue, SearchQuery, SearchResult};
use crate::strategies::text::{keyword_regex, matching_sentences};
use crate::strategies::{
    rerank_by, string_list_param, Params, ResultItem, SearchBreadth, SearchStrategy,
    WorkflowOutput,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Failure-analysis expansions appended to the query
pub const RCCA_EXPANSIONS: &[&str] = &["symptom", "root cause", "corrective action"];

/// Document types searched by default; `params.document_types` overrides
///
/// The filter is strict: chunks ingested without a `document_type` are
/// excluded. Pass `"document_types": []` to search every chunk.
pub const RCCA_DOCUMENT_TYPES: &[&str] =
    &["standard", "specification", "handbook", "procedure", "report"];

/// Maximum sentences kept per extracted field
pub const MAX_EXTRACTED: usize = 3;

const MULTI_SIGNAL_BOOST: f32 = 0.10;
const CAUSAL_BOOST: f32 = 0.15;
const RESOLUTION_BOOST: f32 = 0.10;

const SYMPTOM_TERMS: &[&str] = &[
    "symptom",
    "symptoms",
    "failure",
    "failures",
    "failed",
    "fault",
    "faults",
    "anomaly",
    "anomalies",
    "malfunction",
    "defect",
    "defects",
    "intermittent",
    "observed",
];

const CAUSE_TERMS: &[&str] = &[
    "root cause",
    "root causes",
    "cause",
    "caused",
    "caused by",
    "due to",
    "because",
    "resulted from",
    "attributed to",
    "led to",
];

const CAUSAL_LANGUAGE: &[&str] = &[
    "root cause",
    "root causes",
    "caused by",
    "resulted from",
    "attributed to",
    "due to",
    "led to",
];

const CONTRIBUTING_TERMS: &[&str] = &[
    "contributing factor",
    "contributing factors",
    "contributed to",
    "contributing",
    "exacerbated",
    "compounded",
    "aggravated",
];

const RESOLUTION_TERMS: &[&str] = &[
    "corrective action",
    "corrective actions",
    "preventive action",
    "preventive actions",
    "resolution",
    "resolved",
    "remedy",
    "fix",
    "fixed",
    "mitigation",
    "mitigated",
    "rework",
    "replaced",
];

static SYMPTOM_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(SYMPTOM_TERMS));
static CAUSE_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(CAUSE_TERMS));
static CAUSAL_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(CAUSAL_LANGUAGE));
static CONTRIBUTING_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(CONTRIBUTING_TERMS));
static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(RESOLUTION_TERMS));

/// Keyword classes scanned in failure-analysis text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RccaSignal {
    Symptom,
    Cause,
    ContributingFactor,
    Resolution,
}

impl RccaSignal {
    fn pattern(&self) -> &'static Regex {
        match self {
            Self::Symptom => &SYMPTOM_RE,
            Self::Cause => &CAUSE_RE,
            Self::ContributingFactor => &CONTRIBUTING_RE,
            Self::Resolution => &RESOLUTION_RE,
        }
    }

    pub fn is_present(&self, text: &str) -> bool {
        self.pattern().is_match(text)
    }

    /// Sentences of `text` carrying this signal, at most three
    pub fn extract(&self, text: &str) -> Vec<String> {
        matching_sentences(text, self.pattern(), MAX_EXTRACTED)
    }
}

/// Whether text uses explicit causal language ("caused by", "root cause", ...)
pub fn has_causal_language(text: &str) -> bool {
    CAUSAL_RE.is_match(text)
}

/// Score increment for one chunk of failure-analysis text
pub fn rcca_boost(text: &str) -> f32 {
    let signals = [RccaSignal::Symptom, RccaSignal::Cause, RccaSignal::Resolution]
        .iter()
        .filter(|s| s.is_present(text))
        .count();

    let mut boost = 0.0;
    if signals >= 2 {
        boost += MULTI_SIGNAL_BOOST;
    }
    if has_causal_language(text) {
        boost += CAUSAL_BOOST;
    }
    if RccaSignal::Resolution.is_present(text) {
        boost += RESOLUTION_BOOST;
    }
    boost
}

/// Per-result failure-analysis fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RccaExtraction {
    pub symptoms: Vec<String>,
    pub root_cause: Vec<String>,
    pub contributing_factors: Vec<String>,
    pub resolution: Vec<String>,
}

impl RccaExtraction {
    pub fn from_text(text: &str) -> Self {
        Self {
            symptoms: RccaSignal::Symptom.extract(text),
            root_cause: RccaSignal::Cause.extract(text),
            contributing_factors: RccaSignal::ContributingFactor.extract(text),
            resolution: RccaSignal::Resolution.extract(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
            && self.root_cause.is_empty()
            && self.contributing_factors.is_empty()
            && self.resolution.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RccaFinding {
    #[serde(flatten)]
    pub result: ResultItem,
    #[serde(flatten)]
    pub extraction: RccaExtraction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RccaSummary {
    pub with_symptoms: usize,
    pub with_root_cause: usize,
    pub with_resolution: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RccaReport {
    pub total_results: usize,
    pub results: Vec<RccaFinding>,
    pub summary: RccaSummary,
}

/// Root-cause analysis over failure reports and normative documents
#[derive(Debug, Clone, Copy, Default)]
pub struct RccaStrategy;

#[async_trait]
impl SearchStrategy for RccaStrategy {
    fn name(&self) -> &'static str {
        "rcca"
    }

    fn breadth(&self) -> SearchBreadth {
        SearchBreadth::Precision
    }

    async fn preprocess_query(&self, query: &str, params: &Params) -> Result<SearchQuery> {
        let terms = RCCA_EXPANSIONS
            .iter()
            .map(|expansion| format!("{} {}", query, expansion))
            .collect();

        let document_types = string_list_param(params, "document_types")?.unwrap_or_else(|| {
            RCCA_DOCUMENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect()
        });

        let mut search_query = SearchQuery::new(query).with_terms(terms);
        if !document_types.is_empty() {
            search_query = search_query
                .with_filter(fields::DOCUMENT_TYPE, FilterValue::AnyOf(document_types));
        }

        Ok(search_query)
    }

    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        rerank_by(results, |r| r.score + rcca_boost(&r.content))
    }

    fn format_output(
        &self,
        results: Vec<SearchResult>,
        _params: &Params,
    ) -> Result<WorkflowOutput> {
        let mut summary = RccaSummary::default();
        let findings: Vec<RccaFinding> = results
            .iter()
            .map(|result| {
                let extraction = RccaExtraction::from_text(&result.content);
                summary.with_symptoms += usize::from(!extraction.symptoms.is_empty());
                summary.with_root_cause += usize::from(!extraction.root_cause.is_empty());
                summary.with_resolution += usize::from(!extraction.resolution.is_empty());
                RccaFinding {
                    result: ResultItem::from(result),
                    extraction,
                }
            })
            .collect();

        Ok(WorkflowOutput::RccaAnalysis(RccaReport {
            total_results: findings.len(),
            results: findings,
            summary,
        }))
    }
}
