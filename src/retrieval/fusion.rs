//! Reciprocal Rank Fusion algorithm for combining ranked result lists

use crate::error::KbError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Conventional RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Default bias toward the semantic list in hybrid fusion
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.7;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: k must be positive")]
    InvalidK(f64),

    #[error("Invalid semantic weight {0}: must be within [0.0, 1.0]")]
    InvalidWeight(f64),
}

impl From<FusionError> for KbError {
    fn from(err: FusionError) -> Self {
        KbError::InvalidInput(err.to_string())
    }
}

/// Configuration for hybrid fusion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f64,

    /// Weight of the semantic list; the keyword list gets `1 - semantic_weight`
    pub semantic_weight: f64,
}

impl FusionConfig {
    pub fn new(rrf_k: f64, semantic_weight: f64) -> Result<Self, FusionError> {
        if !(rrf_k > 0.0) {
            return Err(FusionError::InvalidK(rrf_k));
        }
        if !(0.0..=1.0).contains(&semantic_weight) {
            return Err(FusionError::InvalidWeight(semantic_weight));
        }

        Ok(Self {
            rrf_k,
            semantic_weight,
        })
    }

    pub fn keyword_weight(&self) -> f64 {
        1.0 - self.semantic_weight
    }

    /// Highest fused score a document can reach (rank 1 in every weighted list)
    pub fn score_ceiling(&self) -> f64 {
        (self.semantic_weight + self.keyword_weight()) / (self.rrf_k + 1.0)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
        }
    }
}

/// One input ranking, best first
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    pub ids: Vec<String>,
    /// Multiplier applied to every reciprocal-rank term of this list
    pub weight: f64,
}

impl RankedList {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids, weight: 1.0 }
    }

    pub fn weighted(ids: Vec<String>, weight: f64) -> Self {
        Self { ids, weight }
    }
}

/// A document after fusion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedDocument {
    pub id: String,
    /// Fused RRF score (higher = more relevant)
    pub score: f64,
    /// Best 1-based rank achieved in any single input list
    pub best_rank: usize,
}

/// Result of hybrid fusion, flagging a fallback to semantic-only ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionOutcome {
    pub documents: Vec<FusedDocument>,
    pub degraded: bool,
}

/// Apply Reciprocal Rank Fusion to any number of ranked lists
///
/// RRF formula: score(id) = sum over lists containing id of: weight / (k + rank)
///
/// Absence from a list contributes nothing. Lists with a non-positive weight are
/// ignored entirely, so their documents do not surface with a zero score. Ties
/// are broken by the best single-list rank, then by first appearance.
pub fn reciprocal_rank_fusion(lists: &[RankedList], k: f64) -> Vec<FusedDocument> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<FusedDocument> = Vec::new();

    for list in lists.iter().filter(|l| l.weight > 0.0) {
        let mut seen: HashSet<&str> = HashSet::new();

        for (idx, id) in list.ids.iter().enumerate() {
            // Only the first occurrence of an id counts within one list
            if !seen.insert(id.as_str()) {
                continue;
            }

            let rank = idx + 1;
            let contribution = list.weight / (k + rank as f64);

            match positions.get(id.as_str()) {
                Some(&pos) => {
                    let doc = &mut fused[pos];
                    doc.score += contribution;
                    doc.best_rank = doc.best_rank.min(rank);
                }
                None => {
                    positions.insert(id.as_str(), fused.len());
                    fused.push(FusedDocument {
                        id: id.clone(),
                        score: contribution,
                        best_rank: rank,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-appearance order for full ties
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.best_rank.cmp(&b.best_rank))
    });

    fused
}

/// Fuse a semantic ranking with an optional keyword ranking
///
/// When the keyword list is unavailable the output is the semantic ranking on
/// its own and `degraded` is set.
pub fn fuse_hybrid(
    semantic: &[String],
    keyword: Option<&[String]>,
    config: &FusionConfig,
) -> FusionOutcome {
    match keyword {
        Some(keyword) => {
            let lists = [
                RankedList::weighted(semantic.to_vec(), config.semantic_weight),
                RankedList::weighted(keyword.to_vec(), config.keyword_weight()),
            ];
            FusionOutcome {
                documents: reciprocal_rank_fusion(&lists, config.rrf_k),
                degraded: false,
            }
        }
        None => {
            tracing::warn!(
                "Keyword search unavailable, falling back to semantic-only ranking ({} candidates)",
                semantic.len()
            );
            FusionOutcome {
                documents: reciprocal_rank_fusion(
                    &[RankedList::new(semantic.to_vec())],
                    config.rrf_k,
                ),
                degraded: true,
            }
        }
    }
}
