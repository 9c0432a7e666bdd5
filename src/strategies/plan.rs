//! Project-planning support: templates, risks, lessons learned, precedents

use crate::error::{KbError, Result};
use crate::retrieval::{SearchQuery, SearchResult};
use crate::strategies::text::{distinct_matches, keyword_regex};
use crate::strategies::{
    rerank_by, string_param, Params, ResultItem, SearchStrategy, WorkflowOutput,
};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Planning vocabulary appended to an unscoped query
pub const PLAN_EXPANSIONS: &[&str] =
    &["plan", "schedule", "milestones", "risks", "lessons learned"];

/// Planning keywords rewarded during ranking
pub const PLANNING_KEYWORDS: &[&str] = &[
    "plan",
    "planning",
    "schedule",
    "milestone",
    "milestones",
    "budget",
    "resource",
    "resources",
    "scope",
    "timeline",
    "deliverable",
    "deliverables",
];

/// Document or chunk types treated as template-like
pub const TEMPLATE_DOCUMENT_TYPES: &[&str] = &["template", "checklist", "form", "plan", "guide"];

const KEYWORD_BOOST: f32 = 0.05;
const MAX_KEYWORD_BOOST: f32 = 0.15;
const TEMPLATE_TYPE_BOOST: f32 = 0.10;

const TEMPLATE_TERMS: &[&str] = &[
    "template",
    "templates",
    "checklist",
    "outline",
    "boilerplate",
    "form",
    "worksheet",
];

const RISK_TERMS: &[&str] = &[
    "risk",
    "risks",
    "hazard",
    "hazards",
    "failure mode",
    "fmea",
    "contingency",
    "mitigation",
];

const LESSON_TERMS: &[&str] = &[
    "lesson learned",
    "lessons learned",
    "lessons",
    "retrospective",
    "post-mortem",
    "postmortem",
    "in hindsight",
];

const PRECEDENT_TERMS: &[&str] = &[
    "precedent",
    "precedents",
    "previous project",
    "prior program",
    "past project",
    "heritage",
    "historical",
];

static PLANNING_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(PLANNING_KEYWORDS));
static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(TEMPLATE_TERMS));
static RISK_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(RISK_TERMS));
static LESSON_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(LESSON_TERMS));
static PRECEDENT_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(PRECEDENT_TERMS));
static TEMPLATE_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| keyword_regex(TEMPLATE_DOCUMENT_TYPES));

/// Planning categories, in first-match order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    Templates,
    Risks,
    LessonsLearned,
    Precedents,
}

impl PlanCategory {
    pub const ALL: [PlanCategory; 4] = [
        PlanCategory::Templates,
        PlanCategory::Risks,
        PlanCategory::LessonsLearned,
        PlanCategory::Precedents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Templates => "templates",
            Self::Risks => "risks",
            Self::LessonsLearned => "lessons_learned",
            Self::Precedents => "precedents",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Self::Templates => &TEMPLATE_RE,
            Self::Risks => &RISK_RE,
            Self::LessonsLearned => &LESSON_RE,
            Self::Precedents => &PRECEDENT_RE,
        }
    }

    /// Query expansions used when a search is scoped to this category
    pub fn expansions(&self) -> &'static [&'static str] {
        match self {
            Self::Templates => &["template", "checklist"],
            Self::Risks => &["risks", "mitigation"],
            Self::LessonsLearned => &["lessons learned", "retrospective"],
            Self::Precedents => &["precedent", "previous project"],
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern().is_match(text)
    }

    /// Whether a result belongs here; template-typed documents count as templates
    pub fn covers(&self, result: &SearchResult) -> bool {
        self.matches(&result.content) || (*self == Self::Templates && is_template_like(result))
    }

    /// First category whose keywords appear in `text`, defaulting to templates
    pub fn classify(text: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|category| category.matches(text))
            .unwrap_or(Self::Templates)
    }
}

impl fmt::Display for PlanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCategory {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                KbError::InvalidInput(format!(
                    "Unknown plan category '{}'; expected one of templates, risks, \
                     lessons_learned, precedents",
                    s
                ))
            })
    }
}

fn category_param(params: &Params) -> Result<Option<PlanCategory>> {
    string_param(params, "category")?
        .map(|c| c.parse())
        .transpose()
}

/// Score increment for planning-oriented results
pub fn plan_boost(result: &SearchResult) -> f32 {
    let keywords = distinct_matches(&result.content, &PLANNING_RE) as f32;
    let mut boost = (keywords * KEYWORD_BOOST).min(MAX_KEYWORD_BOOST);
    if is_template_like(result) {
        boost += TEMPLATE_TYPE_BOOST;
    }
    boost
}

/// Whether the document or chunk type names a template-like artifact
pub fn is_template_like(result: &SearchResult) -> bool {
    [result.document_type(), result.chunk_type()]
        .into_iter()
        .flatten()
        .any(|kind| TEMPLATE_TYPE_RE.is_match(kind))
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PlanView {
    /// Results of a search scoped to one category; the rest are kept apart
    Scoped {
        category: PlanCategory,
        results: Vec<ResultItem>,
        unmatched: Vec<ResultItem>,
    },
    /// Every result placed in exactly one category; all four keys present
    Categorized {
        categories: BTreeMap<PlanCategory, Vec<ResultItem>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub total_results: usize,
    #[serde(flatten)]
    pub view: PlanView,
}

/// Planning support drawn from prior work
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStrategy;

#[async_trait]
impl SearchStrategy for PlanStrategy {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn preprocess_query(&self, query: &str, params: &Params) -> Result<SearchQuery> {
        let expansions = match category_param(params)? {
            Some(category) => category.expansions(),
            None => PLAN_EXPANSIONS,
        };
        let terms = expansions
            .iter()
            .map(|expansion| format!("{} {}", query, expansion))
            .collect();

        Ok(SearchQuery::new(query).with_terms(terms))
    }

    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        rerank_by(results, |r| r.score + plan_boost(r))
    }

    fn format_output(&self, results: Vec<SearchResult>, params: &Params) -> Result<WorkflowOutput> {
        let total_results = results.len();

        let view = match category_param(params)? {
            Some(category) => {
                let (matched, unmatched): (Vec<&SearchResult>, Vec<&SearchResult>) =
                    results.iter().partition(|r| category.covers(r));
                PlanView::Scoped {
                    category,
                    results: matched.into_iter().map(ResultItem::from).collect(),
                    unmatched: unmatched.into_iter().map(ResultItem::from).collect(),
                }
            }
            None => {
                let mut categories: BTreeMap<PlanCategory, Vec<ResultItem>> = PlanCategory::ALL
                    .into_iter()
                    .map(|c| (c, Vec::new()))
                    .collect();
                for result in &results {
                    categories
                        .entry(PlanCategory::classify(&result.content))
                        .or_default()
                        .push(ResultItem::from(result));
                }
                PlanView::Categorized { categories }
            }
        };

        Ok(WorkflowOutput::PlanSupport(PlanReport {
            total_results,
            view,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::fields;
    use serde_json::json;

    fn scoped(category: &str) -> Params {
        json!({ "category": category }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("risks".parse::<PlanCategory>().unwrap(), PlanCategory::Risks);
        assert_eq!(
            "Lessons Learned".parse::<PlanCategory>().unwrap(),
            PlanCategory::LessonsLearned
        );
        assert!(matches!(
            "budgets".parse::<PlanCategory>(),
            Err(KbError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_classify_first_match() {
        assert_eq!(
            PlanCategory::classify("Risk register checklist"),
            PlanCategory::Templates
        );
        assert_eq!(
            PlanCategory::classify("Key risk: supplier lead time"),
            PlanCategory::Risks
        );
        assert_eq!(
            PlanCategory::classify("Lessons learned from the 2019 build"),
            PlanCategory::LessonsLearned
        );
        assert_eq!(
            PlanCategory::classify("Heritage design from the X-2 program"),
            PlanCategory::Precedents
        );
        assert_eq!(PlanCategory::classify("Harness pinout"), PlanCategory::Templates);
    }

    #[tokio::test]
    async fn test_preprocess_scoped_and_unscoped() {
        let unscoped = PlanStrategy
            .preprocess_query("harness build", &Params::new())
            .await
            .unwrap();
        assert_eq!(unscoped.expanded_terms.len(), PLAN_EXPANSIONS.len());
        assert_eq!(unscoped.expanded_terms[0], "harness build plan");

        let risks = PlanStrategy
            .preprocess_query("harness build", &scoped("risks"))
            .await
            .unwrap();
        assert_eq!(
            risks.expanded_terms,
            vec!["harness build risks", "harness build mitigation"]
        );

        assert!(PlanStrategy
            .preprocess_query("harness build", &scoped("unknown"))
            .await
            .is_err());
    }

    #[test]
    fn test_plan_boost() {
        let template = SearchResult::new("t", "Build plan with schedule and budget.", 0.5)
            .with_metadata(fields::DOCUMENT_TYPE, "Plan Template");
        assert!((plan_boost(&template) - 0.25).abs() < 1e-6);

        let plain = SearchResult::new("p", "Harness pinout.", 0.5);
        assert_eq!(plan_boost(&plain), 0.0);
    }

    #[test]
    fn test_adjust_ranking_clamps() {
        let results = vec![SearchResult::new(
            "t",
            "Plan scope, schedule and budget.",
            0.95,
        )
        .with_metadata(fields::CHUNK_TYPE, "checklist")];
        let ranked = PlanStrategy.adjust_ranking(results);
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn test_format_categorized() {
        let results = vec![
            SearchResult::new("r", "Key risk: supplier lead time.", 0.9),
            SearchResult::new("x", "Harness pinout.", 0.8),
        ];
        let json = PlanStrategy
            .format_output(results, &Params::new())
            .unwrap()
            .to_json()
            .unwrap();

        assert_eq!(json["result_type"], "plan_support");
        assert_eq!(json["total_results"], 2);
        assert_eq!(json["categories"]["risks"][0]["chunk_id"], "r");
        assert_eq!(json["categories"]["templates"][0]["chunk_id"], "x");
        assert_eq!(json["categories"]["precedents"], json!([]));
    }

    #[test]
    fn test_format_scoped() {
        let results = vec![SearchResult::new("r", "Key risk: supplier lead time.", 0.9)];
        let json = PlanStrategy
            .format_output(results, &scoped("risks"))
            .unwrap()
            .to_json()
            .unwrap();

        assert_eq!(json["category"], "risks");
        assert_eq!(json["results"][0]["chunk_id"], "r");
        assert_eq!(json["unmatched"], json!([]));
        assert!(json.get("categories").is_none());
    }

    #[test]
    fn test_format_scoped_separates_other_categories() {
        let results = vec![
            SearchResult::new("pinout", "Harness pinout.", 0.9),
            SearchResult::new("tmpl", "Build checklist template.", 0.8),
            SearchResult::new("risk", "Key risk: supplier lead time.", 0.7),
            SearchResult::new("typed", "Harness build steps.", 0.6)
                .with_metadata(fields::DOCUMENT_TYPE, "checklist"),
        ];

        let risks = PlanStrategy
            .format_output(results.clone(), &scoped("risks"))
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(risks["total_results"], 4);
        let ids = |key: &str| -> Vec<String> {
            risks[key]
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r["chunk_id"].as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(ids("results"), vec!["risk"]);
        assert_eq!(ids("unmatched"), vec!["pinout", "tmpl", "typed"]);

        let templates = PlanStrategy
            .format_output(results, &scoped("templates"))
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(templates["results"].as_array().unwrap().len(), 2);
        assert_eq!(templates["results"][0]["chunk_id"], "tmpl");
        assert_eq!(templates["results"][1]["chunk_id"], "typed");
    }

    #[test]
    fn test_format_empty() {
        let json = PlanStrategy
            .format_output(vec![], &Params::new())
            .unwrap()
            .to_json()
            .unwrap();

        assert_eq!(json["total_results"], 0);
        assert_eq!(json["categories"].as_object().unwrap().len(), 4);
    }
}
