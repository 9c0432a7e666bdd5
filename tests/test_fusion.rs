//! Reciprocal Rank Fusion properties and the hybrid searcher built on it

use kbflow::retrieval::{
    fuse_hybrid, reciprocal_rank_fusion, CorpusDocument, Filters, FusedDocument, FusionConfig,
    HybridSearcher, InMemorySearcher, RankedList, SemanticSearcher, DEFAULT_RRF_K,
};
use std::sync::Arc;

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn order(docs: &[FusedDocument]) -> Vec<&str> {
    docs.iter().map(|d| d.id.as_str()).collect()
}

#[test]
fn test_first_in_both_lists_scores_two_over_k_plus_one() {
    let lists = [
        RankedList::new(ids(&["x", "a", "b"])),
        RankedList::new(ids(&["x", "c", "d"])),
    ];
    let fused = reciprocal_rank_fusion(&lists, DEFAULT_RRF_K);

    assert_eq!(fused[0].id, "x");
    assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    assert!((fused[0].score - 0.0328).abs() < 1e-4);
}

#[test]
fn test_single_list_rank_three() {
    let lists = [
        RankedList::new(ids(&["a", "b", "only"])),
        RankedList::new(ids(&["a", "b"])),
    ];
    let fused = reciprocal_rank_fusion(&lists, DEFAULT_RRF_K);

    let only = fused.iter().find(|d| d.id == "only").unwrap();
    assert!((only.score - 1.0 / 63.0).abs() < 1e-12);
    assert!((only.score - 0.01587).abs() < 1e-5);
    assert_eq!(only.best_rank, 3);
}

#[test]
fn test_full_semantic_weight_equals_semantic_ranking() {
    let semantic = ids(&["s1", "s2", "s3", "shared"]);
    let keyword = ids(&["shared", "k1", "s3"]);
    let config = FusionConfig::new(DEFAULT_RRF_K, 1.0).unwrap();

    let outcome = fuse_hybrid(&semantic, Some(&keyword), &config);

    assert!(!outcome.degraded);
    assert_eq!(order(&outcome.documents), vec!["s1", "s2", "s3", "shared"]);
}

#[test]
fn test_zero_semantic_weight_equals_keyword_ranking() {
    let semantic = ids(&["s1", "s2", "s3", "shared"]);
    let keyword = ids(&["shared", "k1", "s3"]);
    let config = FusionConfig::new(DEFAULT_RRF_K, 0.0).unwrap();

    let outcome = fuse_hybrid(&semantic, Some(&keyword), &config);

    assert_eq!(order(&outcome.documents), vec!["shared", "k1", "s3"]);
}

#[test]
fn test_missing_keyword_list_degrades_to_semantic() {
    let semantic = ids(&["s1", "s2"]);
    let outcome = fuse_hybrid(&semantic, None, &FusionConfig::default());

    assert!(outcome.degraded);
    assert_eq!(order(&outcome.documents), vec!["s1", "s2"]);
}

#[test]
fn test_document_in_both_lists_outranks_single_list_leader() {
    // b is 2nd in both lists: 2/62 beats 1/61
    let lists = [
        RankedList::new(ids(&["a", "b"])),
        RankedList::new(ids(&["c", "b"])),
    ];
    let fused = reciprocal_rank_fusion(&lists, DEFAULT_RRF_K);
    assert_eq!(order(&fused), vec!["b", "a", "c"]);
}

fn corpus() -> Vec<CorpusDocument> {
    vec![
        CorpusDocument::new("c1", "Connector corrosion caused intermittent failure")
            .with_metadata("document_type", "report"),
        CorpusDocument::new("c2", "Connector selection guide for harness design")
            .with_metadata("document_type", "handbook"),
        CorpusDocument::new("c3", "Crimp tooling calibration procedure")
            .with_metadata("document_type", "procedure"),
        CorpusDocument::new("c4", "Connector connector connector failure modes")
            .with_metadata("document_type", "standard"),
    ]
}

#[tokio::test]
async fn test_hybrid_scores_stay_in_unit_range() {
    let inner: Arc<dyn SemanticSearcher> = Arc::new(InMemorySearcher::new(corpus()));
    let hybrid = HybridSearcher::new(inner, FusionConfig::default());

    let results = hybrid
        .search("connector failure", 10, &Filters::new(), 0.0)
        .await
        .expect("hybrid search");

    assert!(!results.is_empty());
    for result in &results {
        assert!((0.0..=1.0).contains(&result.score), "score {}", result.score);
    }
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_hybrid_without_keyword_index_keeps_dense_results() {
    let dense = InMemorySearcher::new(corpus()).without_keyword_index();
    let expected = dense
        .search("connector failure", 10, &Filters::new(), 0.0)
        .await
        .unwrap();

    let hybrid = HybridSearcher::new(
        Arc::new(InMemorySearcher::new(corpus()).without_keyword_index()),
        FusionConfig::default(),
    );
    let results = hybrid
        .search("connector failure", 10, &Filters::new(), 0.0)
        .await
        .unwrap();

    assert_eq!(results, expected);
}
