//! Multi-facet exploration of a topic

use crate::error::Result;
use crate::retrieval::{SearchQuery, SearchResult};
use crate::strategies::text::keyword_regex;
use crate::strategies::{
    rerank_by, string_list_param, Params, ResultItem, SearchStrategy, WorkflowOutput,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Facets searched when `params.facets` is absent or empty
pub const DEFAULT_FACETS: &[&str] = &["definitions", "examples", "standards", "best_practices"];

/// Facet receiving results that match no requested facet
pub const FALLBACK_FACET: &str = "best_practices";

const DEFINITION_TERMS: &[&str] = &[
    "definition",
    "definitions",
    "defined as",
    "is defined",
    "refers to",
    "means",
    "terminology",
    "glossary",
];

const EXAMPLE_TERMS: &[&str] = &[
    "example",
    "examples",
    "for instance",
    "e.g.",
    "case study",
    "illustrates",
    "illustrated",
];

const STANDARD_TERMS: &[&str] = &[
    "standard",
    "standards",
    "specification",
    "requirement",
    "requirements",
    "compliance",
    "shall",
    "must",
];

const GUIDANCE_TERMS: &[&str] = &[
    "best practice",
    "best practices",
    "recommended",
    "recommendation",
    "guideline",
    "guidelines",
    "guidance",
    "should",
    "tip",
];

static DEFINITIONS_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(DEFINITION_TERMS));
static EXAMPLES_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(EXAMPLE_TERMS));
static STANDARDS_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(STANDARD_TERMS));
static GUIDANCE_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(GUIDANCE_TERMS));

/// Ranking multipliers, checked in order; the first matching facet applies
const FACET_MULTIPLIERS: [(&str, f32); 4] = [
    ("definitions", 1.20),
    ("examples", 1.15),
    ("standards", 1.10),
    ("best_practices", 1.10),
];

const STANDARDS_MULTIPLIER: f32 = 1.10;

fn known_pattern(facet: &str) -> Option<&'static Regex> {
    match facet {
        "definitions" => Some(&DEFINITIONS_RE),
        "examples" => Some(&EXAMPLES_RE),
        "standards" => Some(&STANDARDS_RE),
        "best_practices" => Some(&GUIDANCE_RE),
        _ => None,
    }
}

/// Term pattern for a facet; an unrecognised facet matches its own name
pub fn facet_pattern(facet: &str) -> Cow<'static, Regex> {
    match known_pattern(facet) {
        Some(re) => Cow::Borrowed(re),
        None => Cow::Owned(keyword_regex(&[facet_label(facet).as_str()])),
    }
}

fn facet_label(facet: &str) -> String {
    facet.replace('_', " ")
}

/// Lowercase, underscore-separated facet name
pub fn normalize_facet(facet: &str) -> String {
    facet
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace('-', "_")
        .to_lowercase()
}

/// Score multiplier for a chunk of text; 1.0 when no facet applies
pub fn facet_multiplier(text: &str) -> f32 {
    FACET_MULTIPLIERS
        .iter()
        .find(|(facet, _)| known_pattern(facet).is_some_and(|re| re.is_match(text)))
        .map_or(1.0, |(_, multiplier)| *multiplier)
}

/// Index of the first facet in `facets` whose terms appear in `text`
pub fn classify_facet(text: &str, facets: &[String]) -> Option<usize> {
    facets
        .iter()
        .position(|facet| facet_pattern(facet).is_match(text))
}

fn requested_facets(params: &Params) -> Result<Vec<String>> {
    let requested = string_list_param(params, "facets")?.unwrap_or_default();
    let source: Vec<String> = if requested.is_empty() {
        DEFAULT_FACETS.iter().map(|f| f.to_string()).collect()
    } else {
        requested
    };

    let mut facets: Vec<String> = Vec::with_capacity(source.len());
    for facet in source.iter().map(|f| normalize_facet(f)) {
        if !facet.is_empty() && !facets.contains(&facet) {
            facets.push(facet);
        }
    }
    Ok(facets)
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetGroup {
    pub facet: String,
    pub result_count: usize,
    pub results: Vec<ResultItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetCoverage {
    /// Facets with at least one result
    pub covered: usize,
    pub total: usize,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploratoryReport {
    pub total_results: usize,
    pub facets: Vec<FacetGroup>,
    pub coverage: FacetCoverage,
}

/// Broad, facet-partitioned overview of a topic
#[derive(Debug, Clone, Copy, Default)]
pub struct ExploreStrategy;

#[async_trait]
impl SearchStrategy for ExploreStrategy {
    fn name(&self) -> &'static str {
        "explore"
    }

    async fn preprocess_query(&self, query: &str, params: &Params) -> Result<SearchQuery> {
        let facets = requested_facets(params)?;
        let terms = facets
            .iter()
            .map(|facet| format!("{} {}", query, facet_label(facet)))
            .collect();

        Ok(SearchQuery::new(query).with_terms(terms).with_facets(facets))
    }

    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        rerank_by(results, |r| {
            let multiplier = match facet_multiplier(&r.content) {
                m if m == 1.0 && r.is_normative() => STANDARDS_MULTIPLIER,
                m => m,
            };
            r.score * multiplier
        })
    }

    fn format_output(&self, results: Vec<SearchResult>, params: &Params) -> Result<WorkflowOutput> {
        let mut facets = requested_facets(params)?;
        if !facets.iter().any(|f| f == FALLBACK_FACET) {
            facets.push(FALLBACK_FACET.to_string());
        }
        let fallback = facets
            .iter()
            .position(|f| f == FALLBACK_FACET)
            .unwrap_or(facets.len() - 1);

        let mut buckets: Vec<Vec<ResultItem>> = vec![Vec::new(); facets.len()];
        for result in &results {
            let idx = classify_facet(&result.content, &facets).unwrap_or(fallback);
            buckets[idx].push(ResultItem::from(result));
        }

        let groups: Vec<FacetGroup> = facets
            .into_iter()
            .zip(buckets)
            .map(|(facet, results)| FacetGroup {
                facet,
                result_count: results.len(),
                results,
            })
            .collect();

        let missing: Vec<String> = groups
            .iter()
            .filter(|g| g.result_count == 0)
            .map(|g| g.facet.clone())
            .collect();
        let coverage = FacetCoverage {
            covered: groups.len() - missing.len(),
            total: groups.len(),
            missing,
        };

        Ok(WorkflowOutput::Exploratory(ExploratoryReport {
            total_results: results.len(),
            facets: groups,
            coverage,
        }))
    }
}
