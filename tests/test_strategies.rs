//! Properties every workflow strategy must hold

use kbflow::retrieval::{fields, SearchResult};
use kbflow::strategies::{Params, StrategyRegistry, Workflow};
use serde_json::json;
use std::collections::BTreeSet;

fn sample_results() -> Vec<SearchResult> {
    vec![
        SearchResult::new(
            "r1",
            "Intermittent failure was observed. The root cause was fretting caused by vibration. \
             Corrective action: gold-plated contacts.",
            0.92,
        ),
        SearchResult::new("r2", "Vendor A harness cost is $40 per meter and weight is 120 g.", 0.85)
            .with_metadata(fields::DOCUMENT_TYPE, "report"),
        SearchResult::new("r3", "A backshell is defined as the connector rear housing.", 0.80),
        SearchResult::new("r4", "Plan template with schedule, budget and milestones.", 0.99)
            .with_metadata(fields::DOCUMENT_TYPE, "template"),
        SearchResult::new("r5", "Connectors shall be keyed to prevent mismating.", 0.50)
            .with_metadata(fields::NORMATIVE, true),
        SearchResult::new("r6", "Lessons learned from the prior program harness build.", 0.50),
        SearchResult::new("r7", "Pinout table.", 0.50),
        SearchResult::new("r8", "Pinout table.", 0.50),
        SearchResult::new("r9", "Zero-score filler.", 0.0),
    ]
}

fn params_for(workflow: Workflow) -> Params {
    let value = match workflow {
        Workflow::Trade => json!({
            "alternatives": ["Vendor A", "Vendor B"],
            "criteria": ["cost", "weight"],
        }),
        _ => json!({}),
    };
    value.as_object().cloned().unwrap()
}

fn chunk_ids(results: &[SearchResult]) -> BTreeSet<String> {
    results.iter().map(|r| r.chunk_id.clone()).collect()
}

#[test]
fn test_adjust_ranking_is_a_bounded_permutation() {
    let registry = StrategyRegistry::with_defaults();

    for workflow in Workflow::ALL {
        let strategy = registry.resolve(workflow.name()).unwrap();
        let input = sample_results();
        let ranked = strategy.adjust_ranking(input.clone());

        assert_eq!(ranked.len(), input.len(), "{} dropped results", workflow);
        assert_eq!(chunk_ids(&ranked), chunk_ids(&input), "{} changed ids", workflow);
        for result in &ranked {
            assert!(
                (0.0..=1.0).contains(&result.score),
                "{} produced score {} for {}",
                workflow,
                result.score,
                result.chunk_id
            );
        }
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score, "{} not sorted", workflow);
        }
    }
}

#[test]
fn test_ties_keep_vector_store_order() {
    for workflow in Workflow::ALL {
        let ranked = workflow.strategy().adjust_ranking(sample_results());

        let r7 = ranked.iter().position(|r| r.chunk_id == "r7").unwrap();
        let r8 = ranked.iter().position(|r| r.chunk_id == "r8").unwrap();
        assert!(r7 < r8, "{} reordered identical results", workflow);
    }
}

#[test]
fn test_adjust_ranking_is_deterministic() {
    for workflow in Workflow::ALL {
        let strategy = workflow.strategy();
        let first = strategy.adjust_ranking(sample_results());
        let second = strategy.adjust_ranking(sample_results());
        assert_eq!(first, second);
    }
}

#[test]
fn test_empty_input_formats_to_well_formed_output() {
    let expected = [
        (Workflow::Rcca, "rcca_analysis"),
        (Workflow::Trade, "trade_study"),
        (Workflow::Explore, "exploratory"),
        (Workflow::Plan, "plan_support"),
    ];

    for (workflow, result_type) in expected {
        let strategy = workflow.strategy();
        let ranked = strategy.adjust_ranking(Vec::new());
        assert!(ranked.is_empty());

        let output = strategy
            .format_output(ranked, &params_for(workflow))
            .expect("empty input formats");
        let json = output.to_json().unwrap();

        assert!(!json.is_null());
        assert_eq!(json["result_type"], result_type);
        assert_eq!(json["total_results"], 0);
    }
}

#[test]
fn test_total_results_counts_every_input() {
    for workflow in Workflow::ALL {
        let strategy = workflow.strategy();
        let ranked = strategy.adjust_ranking(sample_results());
        let output = strategy
            .format_output(ranked, &params_for(workflow))
            .unwrap();
        assert_eq!(output.total_results(), sample_results().len());
    }
}

#[tokio::test]
async fn test_preprocess_keeps_original_query() {
    for workflow in Workflow::ALL {
        let query = workflow
            .strategy()
            .preprocess_query("harness connector", &params_for(workflow))
            .await
            .unwrap();

        assert_eq!(query.original, "harness connector");
        assert!(!query.expanded_terms.is_empty(), "{} produced no expansions", workflow);
    }
}

#[tokio::test]
async fn test_missing_required_params_are_invalid_input() {
    let strategy = Workflow::Trade.strategy();
    let err = strategy
        .preprocess_query("harness", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), kbflow::ErrorCode::InvalidInput);

    let err = strategy
        .format_output(Vec::new(), &Params::new())
        .unwrap_err();
    assert_eq!(err.code(), kbflow::ErrorCode::InvalidInput);
}

#[test]
fn test_rcca_boosts_are_the_largest() {
    let ranked = Workflow::Rcca.strategy().adjust_ranking(sample_results());
    let r1 = ranked.iter().find(|r| r.chunk_id == "r1").unwrap();

    assert_eq!(ranked[0].chunk_id, "r1");
    assert!(r1.boost() > 0.0);
    assert_eq!(r1.original_score(), 0.92);
}

#[test]
fn test_plan_clamps_at_one() {
    let ranked = Workflow::Plan.strategy().adjust_ranking(sample_results());
    let r4 = ranked.iter().find(|r| r.chunk_id == "r4").unwrap();
    assert_eq!(r4.score, 1.0);
    assert_eq!(r4.original_score(), 0.99);
}
