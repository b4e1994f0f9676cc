//! Score normalization and rank fusion.
//!
//! Backends return raw, backend-native scores (inner product, a distance,
//! BM25-like relevance, or plain ranks). This module rescales them onto a
//! comparable range and, for hybrid retrieval, fuses the dense and sparse
//! sub-rankings into one ordered list.
//!
//! Everything here is deterministic: identical inputs produce identical
//! outputs, and ties keep the order the backend returned them in (all sorts
//! are stable).

use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};
use crate::strategy::{HybridRanker, IndexCapability};

/// What a backend's raw dense score means. Declared by the adapter so the
/// normalizer can pick the matching transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenseScoreKind {
    /// Higher raw score means closer (inner product, cosine similarity).
    #[default]
    Similarity,
    /// Lower raw score means closer (L2 and friends).
    Distance,
}

/// Map a raw dense score onto [0, 1], monotonically in relevance.
///
/// Similarity scores go through `(1 + s) / 2` (cosine range [-1, 1] maps to
/// [0, 1]); distances go through `1 / (1 + d)`.
pub fn normalize_dense(kind: DenseScoreKind, raw: f32) -> f32 {
    match kind {
        DenseScoreKind::Similarity => ((1.0 + raw) / 2.0).clamp(0.0, 1.0),
        DenseScoreKind::Distance => 1.0 / (1.0 + raw.max(0.0)),
    }
}

/// Rescale sparse relevance scores by the in-set maximum, yielding [0, 1].
///
/// If the set is empty or its maximum is zero, scores pass through
/// unchanged; there is nothing meaningful to divide by.
pub fn normalize_sparse(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if scores.is_empty() || max <= 0.0 {
        return scores.to_vec();
    }
    scores.iter().map(|s| s / max).collect()
}

/// Normalize a result list whose scores are already rank positions.
///
/// For ranks `r` with total `Σ r`, the final score is `(total − r) / total`,
/// pushing the top rank toward 1 and lower ranks toward 0. A zero total
/// passes through unchanged.
pub fn normalize_ranks(ranks: &[f32]) -> Vec<f32> {
    let total: f32 = ranks.iter().sum();
    if total <= 0.0 {
        return ranks.to_vec();
    }
    ranks.iter().map(|r| (total - r) / total).collect()
}

/// One entry of a ranked sub-result: the record id and its normalized
/// sub-score. Rank is implied by position, starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedId {
    /// Record id.
    pub id: String,
    /// Normalized sub-score (used by the weighted ranker).
    pub score: f32,
}

impl RankedId {
    /// Create a ranked entry.
    pub fn new<S: Into<String>>(id: S, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// One fused result: the record id and its fused score.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    /// Record id.
    pub id: String,
    /// Fused score.
    pub score: f32,
}

/// Fuses two ranked sub-results into one ordered list.
///
/// The strategy selector rejects hybrid queries on non-hybrid indexes
/// before they get here; this engine defends the same invariant again with
/// [`StrategyMismatch`](XystonError::StrategyMismatch).
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    capability: IndexCapability,
}

impl FusionEngine {
    /// Create a fusion engine for an index of the given capability.
    pub fn new(capability: IndexCapability) -> Self {
        Self { capability }
    }

    /// Fuse the dense and sparse sub-rankings, returning at most `top_k`
    /// entries. Empty inputs yield an empty output, never an error.
    pub fn fuse(
        &self,
        ranker: HybridRanker,
        dense: &[RankedId],
        sparse: &[RankedId],
        top_k: usize,
    ) -> Result<Vec<FusedHit>> {
        if !self.capability.supports_sparse() {
            return Err(XystonError::strategy_mismatch(
                "cannot fuse sub-rankings: index capability is dense-only",
            ));
        }

        let mut fused = match ranker {
            HybridRanker::Rrf { k } => Self::fuse_rrf(k, dense, sparse),
            HybridRanker::Weighted {
                dense: dense_weight,
                sparse: sparse_weight,
            } => Self::fuse_weighted(dense_weight, sparse_weight, dense, sparse),
        };

        // Stable sort: candidates were collected in backend return order,
        // so equal scores keep that order.
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        fused.truncate(top_k);
        Ok(fused)
    }

    fn fuse_rrf(k: f32, dense: &[RankedId], sparse: &[RankedId]) -> Vec<FusedHit> {
        let mut candidates: Vec<FusedHit> = Vec::new();
        let mut accumulate = |hits: &[RankedId]| {
            for (position, hit) in hits.iter().enumerate() {
                let rank = (position + 1) as f32;
                let contribution = 1.0 / (k + rank);
                match candidates.iter_mut().find(|c| c.id == hit.id) {
                    Some(existing) => existing.score += contribution,
                    None => candidates.push(FusedHit {
                        id: hit.id.clone(),
                        score: contribution,
                    }),
                }
            }
        };
        accumulate(dense);
        accumulate(sparse);
        candidates
    }

    fn fuse_weighted(
        dense_weight: f32,
        sparse_weight: f32,
        dense: &[RankedId],
        sparse: &[RankedId],
    ) -> Vec<FusedHit> {
        let mut candidates: Vec<FusedHit> = Vec::new();
        for hit in dense {
            candidates.push(FusedHit {
                id: hit.id.clone(),
                score: dense_weight * hit.score,
            });
        }
        for hit in sparse {
            match candidates.iter_mut().find(|c| c.id == hit.id) {
                Some(existing) => existing.score += sparse_weight * hit.score,
                None => candidates.push(FusedHit {
                    id: hit.id.clone(),
                    score: sparse_weight * hit.score,
                }),
            }
        }
        candidates
    }
}
