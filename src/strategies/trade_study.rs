//! Trade-study comparison of caller-named alternatives against criteria

use crate::error::Result;
use crate::retrieval::{SearchQuery, SearchResult};
use crate::strategies::text::{
    distinct_matches, has_quantity, keyword_regex, quantities, split_sentences, term_regexes,
};
use crate::strategies::{
    required_list_param, rerank_by, Params, ResultItem, SearchStrategy, WorkflowOutput,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Criteria vocabulary recognised during ranking
pub const CRITERIA_KEYWORDS: &[&str] =
    &["cost", "performance", "weight", "reliability", "schedule"];

/// Maximum evidence snippets per (alternative, criterion)
pub const MAX_EVIDENCE: usize = 3;

const QUANTITY_BOOST: f32 = 0.10;
const CRITERION_BOOST: f32 = 0.05;
const MAX_CRITERIA_BOOST: f32 = 0.15;

static CRITERIA_RE: LazyLock<Regex> = LazyLock::new(|| keyword_regex(CRITERIA_KEYWORDS));

/// Score increment for quantitative, criteria-bearing text
pub fn trade_boost(text: &str) -> f32 {
    let mut boost = 0.0;
    if has_quantity(text) {
        boost += QUANTITY_BOOST;
    }
    let criteria = distinct_matches(text, &CRITERIA_RE) as f32;
    boost + (criteria * CRITERION_BOOST).min(MAX_CRITERIA_BOOST)
}

/// Index of the first alternative pattern found in `text`, in caller order
pub fn match_alternative(text: &str, alternatives: &[Regex]) -> Option<usize> {
    alternatives.iter().position(|alt| alt.is_match(text))
}

/// A sentence that names a criterion and carries a value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSnippet {
    pub chunk_id: String,
    pub text: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionEvidence {
    pub criterion: String,
    pub evidence: Vec<EvidenceSnippet>,
}

/// Sentences in `result` that match `criterion` alongside a quantitative value
pub fn criterion_evidence(result: &SearchResult, criterion: &Regex) -> Vec<EvidenceSnippet> {
    split_sentences(&result.content)
        .into_iter()
        .filter(|sentence| criterion.is_match(sentence))
        .filter_map(|sentence| {
            let values = quantities(sentence);
            (!values.is_empty()).then(|| EvidenceSnippet {
                chunk_id: result.chunk_id.clone(),
                text: sentence.to_string(),
                values,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AlternativeAssessment {
    pub alternative: String,
    pub result_count: usize,
    pub results: Vec<ResultItem>,
    pub criteria_evidence: Vec<CriterionEvidence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeStudyReport {
    pub total_results: usize,
    pub criteria: Vec<String>,
    pub alternatives: Vec<AlternativeAssessment>,
    /// Results that named none of the alternatives; excluded from the groups
    pub unattributed_results: usize,
}

/// Side-by-side evidence gathering for a set of alternatives
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeStudyStrategy;

#[async_trait]
impl SearchStrategy for TradeStudyStrategy {
    fn name(&self) -> &'static str {
        "trade"
    }

    async fn preprocess_query(&self, query: &str, params: &Params) -> Result<SearchQuery> {
        let alternatives = required_list_param(params, "alternatives")?;
        let criteria = required_list_param(params, "criteria")?;

        let terms = alternatives
            .iter()
            .flat_map(|alt| criteria.iter().map(move |crit| format!("{} {}", alt, crit)))
            .collect();

        Ok(SearchQuery::new(query).with_terms(terms))
    }

    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        rerank_by(results, |r| r.score + trade_boost(&r.content))
    }

    fn format_output(&self, results: Vec<SearchResult>, params: &Params) -> Result<WorkflowOutput> {
        let alternatives = required_list_param(params, "alternatives")?;
        let criteria = required_list_param(params, "criteria")?;
        let alternative_patterns = term_regexes(&alternatives);
        let criterion_patterns = term_regexes(&criteria);

        // First match wins: a result naming two alternatives counts for the earlier one
        let mut groups: Vec<Vec<&SearchResult>> = vec![Vec::new(); alternatives.len()];
        let mut unattributed = 0;
        for result in &results {
            match match_alternative(&result.content, &alternative_patterns) {
                Some(idx) => groups[idx].push(result),
                None => unattributed += 1,
            }
        }

        let assessments = alternatives
            .iter()
            .zip(groups)
            .map(|(alternative, members)| {
                let criteria_evidence = criteria
                    .iter()
                    .zip(&criterion_patterns)
                    .map(|(criterion, pattern)| CriterionEvidence {
                        criterion: criterion.clone(),
                        evidence: members
                            .iter()
                            .flat_map(|r| criterion_evidence(r, pattern))
                            .take(MAX_EVIDENCE)
                            .collect(),
                    })
                    .collect();

                AlternativeAssessment {
                    alternative: alternative.clone(),
                    result_count: members.len(),
                    results: members.into_iter().map(ResultItem::from).collect(),
                    criteria_evidence,
                }
            })
            .collect();

        Ok(WorkflowOutput::TradeStudy(TradeStudyReport {
            total_results: results.len(),
            criteria,
            alternatives: assessments,
            unattributed_results: unattributed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KbError;
    use crate::strategies::text::term_regex;
    use serde_json::json;

    fn params() -> Params {
        json!({
            "alternatives": ["Vendor A", "Vendor B"],
            "criteria": ["cost", "weight"],
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn test_preprocess_cross_product() {
        let query = TradeStudyStrategy
            .preprocess_query("harness supplier", &params())
            .await
            .unwrap();

        assert_eq!(
            query.expanded_terms,
            vec![
                "Vendor A cost",
                "Vendor A weight",
                "Vendor B cost",
                "Vendor B weight"
            ]
        );
        assert!(query.filters.is_empty());
    }

    #[tokio::test]
    async fn test_preprocess_requires_alternatives() {
        let params = json!({ "criteria": ["cost"] }).as_object().cloned().unwrap();
        let err = TradeStudyStrategy
            .preprocess_query("harness supplier", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::InvalidInput(msg) if msg.contains("alternatives")));
    }

    #[test]
    fn test_trade_boost() {
        assert!((trade_boost("Unit cost is $1,200 and weight is 2 kg") - 0.20).abs() < 1e-6);
        assert!((trade_boost("cost performance weight reliability schedule") - 0.15).abs() < 1e-6);
        assert_eq!(trade_boost("General supplier overview"), 0.0);
    }

    #[test]
    fn test_first_alternative_wins() {
        let alts = term_regexes(&["Vendor A".to_string(), "Vendor B".to_string()]);
        assert_eq!(match_alternative("Vendor B beats Vendor A", &alts), Some(0));
        assert_eq!(match_alternative("vendor b only", &alts), Some(1));
        assert_eq!(match_alternative("Vendor C", &alts), None);
    }

    #[test]
    fn test_criterion_evidence_needs_value() {
        let result = SearchResult::new(
            "r1",
            "Vendor A cost is $900 per unit. Vendor A cost is competitive. Weight is 1.2 kg.",
            0.5,
        );
        let evidence = criterion_evidence(&result, &term_regex("cost"));

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].text, "Vendor A cost is $900 per unit.");
        assert_eq!(evidence[0].values, vec!["$900"]);
    }

    #[test]
    fn test_format_groups_and_never_fabricates() {
        let results = vec![
            SearchResult::new("a1", "Vendor A harness cost is $40 per meter.", 0.8),
            SearchResult::new("x1", "General harness routing guidance.", 0.7),
            SearchResult::new("a2", "Vendor A weight is 120 g per meter.", 0.6),
        ];
        let output = TradeStudyStrategy.format_output(results, &params()).unwrap();

        let WorkflowOutput::TradeStudy(report) = output else {
            panic!("expected trade study output");
        };
        assert_eq!(report.total_results, 3);
        assert_eq!(report.unattributed_results, 1);

        let vendor_a = &report.alternatives[0];
        assert_eq!(vendor_a.result_count, 2);
        assert_eq!(vendor_a.criteria_evidence[0].evidence.len(), 1);
        assert_eq!(vendor_a.criteria_evidence[1].evidence[0].values, vec!["120 g"]);

        let vendor_b = &report.alternatives[1];
        assert_eq!(vendor_b.result_count, 0);
        assert!(vendor_b.results.is_empty());
        assert!(vendor_b
            .criteria_evidence
            .iter()
            .all(|c| c.evidence.is_empty()));
    }

    #[test]
    fn test_format_empty() {
        let json = TradeStudyStrategy
            .format_output(vec![], &params())
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(json["result_type"], "trade_study");
        assert_eq!(json["total_results"], 0);
        assert_eq!(json["alternatives"][0]["result_count"], 0);
    }
}
