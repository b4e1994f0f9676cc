//! Retrieval strategy selection.
//!
//! The selector validates a query's requested mode against the target
//! index's declared capability and resolves it to a concrete
//! [`RetrievalStrategy`]. Hybrid queries with no ranker configured get a
//! deterministic default instead of an error; absence of explicit tuning is
//! not a caller mistake.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};
use crate::query::QueryMode;

/// Default reciprocal-rank-fusion constant, from common practice; it is a
/// tuning parameter, not a load-bearing value.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Declared capability of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexCapability {
    /// Only a dense vector field is indexed.
    #[default]
    DenseOnly,
    /// Both dense and sparse vector fields are indexed.
    Hybrid,
}

impl IndexCapability {
    /// Check whether the capability includes sparse retrieval.
    pub fn supports_sparse(&self) -> bool {
        matches!(self, IndexCapability::Hybrid)
    }
}

/// How the two sub-rankings of a hybrid query are fused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HybridRanker {
    /// Reciprocal rank fusion: score = Σ 1/(k + rank).
    Rrf {
        /// The RRF constant.
        k: f32,
    },
    /// Weighted sum of normalized sub-scores.
    Weighted {
        /// Weight for the dense sub-score.
        dense: f32,
        /// Weight for the sparse sub-score.
        sparse: f32,
    },
}

impl Default for HybridRanker {
    fn default() -> Self {
        HybridRanker::Rrf { k: DEFAULT_RRF_K }
    }
}

impl HybridRanker {
    /// Equal-weighted combination, the default when weights are unspecified.
    pub fn equal_weights() -> Self {
        HybridRanker::Weighted {
            dense: 1.0,
            sparse: 1.0,
        }
    }
}

/// The strategy resolved for one query. Selected per-query; never persisted
/// on the index beyond its capability declaration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RetrievalStrategy {
    /// Dense-vector similarity search.
    Dense,
    /// Sparse/keyword relevance search.
    Sparse,
    /// Dense + sparse searches fused by the given ranker.
    Hybrid(HybridRanker),
}

/// Validates and resolves (requested mode, index capability) pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategySelector {
    /// Ranker applied to hybrid queries. `None` substitutes the default.
    pub ranker: Option<HybridRanker>,
}

impl StrategySelector {
    /// Create a selector with an explicitly configured hybrid ranker.
    pub fn with_ranker(ranker: HybridRanker) -> Self {
        Self {
            ranker: Some(ranker),
        }
    }

    /// Resolve a requested mode against an index capability.
    ///
    /// Default mode resolves to dense retrieval against any index. Sparse
    /// and hybrid modes require a hybrid index and otherwise fail with
    /// `ModeUnsupported`.
    pub fn resolve(&self, mode: QueryMode, capability: IndexCapability) -> Result<RetrievalStrategy> {
        match (mode, capability) {
            (QueryMode::Default, _) => Ok(RetrievalStrategy::Dense),
            (QueryMode::Sparse, IndexCapability::Hybrid) => Ok(RetrievalStrategy::Sparse),
            (QueryMode::Hybrid, IndexCapability::Hybrid) => {
                Ok(RetrievalStrategy::Hybrid(self.ranker.unwrap_or_default()))
            }
            (QueryMode::Sparse, IndexCapability::DenseOnly) => Err(XystonError::mode_unsupported(
                "sparse mode requires a hybrid index; this index is dense-only",
            )),
            (QueryMode::Hybrid, IndexCapability::DenseOnly) => Err(XystonError::mode_unsupported(
                "hybrid mode requires a hybrid index; this index is dense-only",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_always_resolves_to_dense() {
        let selector = StrategySelector::default();
        assert_eq!(
            selector
                .resolve(QueryMode::Default, IndexCapability::DenseOnly)
                .unwrap(),
            RetrievalStrategy::Dense
        );
        assert_eq!(
            selector
                .resolve(QueryMode::Default, IndexCapability::Hybrid)
                .unwrap(),
            RetrievalStrategy::Dense
        );
    }

    #[test]
    fn test_sparse_and_hybrid_rejected_on_dense_only() {
        let selector = StrategySelector::default();
        for mode in [QueryMode::Sparse, QueryMode::Hybrid] {
            let err = selector
                .resolve(mode, IndexCapability::DenseOnly)
                .unwrap_err();
            assert!(matches!(err, XystonError::ModeUnsupported(_)));
        }
    }

    #[test]
    fn test_sparse_allowed_on_hybrid() {
        let selector = StrategySelector::default();
        assert_eq!(
            selector
                .resolve(QueryMode::Sparse, IndexCapability::Hybrid)
                .unwrap(),
            RetrievalStrategy::Sparse
        );
    }

    #[test]
    fn test_hybrid_without_ranker_gets_deterministic_default() {
        let selector = StrategySelector::default();
        let strategy = selector
            .resolve(QueryMode::Hybrid, IndexCapability::Hybrid)
            .unwrap();
        assert_eq!(
            strategy,
            RetrievalStrategy::Hybrid(HybridRanker::Rrf { k: DEFAULT_RRF_K })
        );
    }

    #[test]
    fn test_hybrid_with_explicit_ranker() {
        let selector = StrategySelector::with_ranker(HybridRanker::Weighted {
            dense: 0.7,
            sparse: 0.3,
        });
        let strategy = selector
            .resolve(QueryMode::Hybrid, IndexCapability::Hybrid)
            .unwrap();
        assert_eq!(
            strategy,
            RetrievalStrategy::Hybrid(HybridRanker::Weighted {
                dense: 0.7,
                sparse: 0.3,
            })
        );
    }

    #[test]
    fn test_equal_weights_helper() {
        assert_eq!(
            HybridRanker::equal_weights(),
            HybridRanker::Weighted {
                dense: 1.0,
                sparse: 1.0,
            }
        );
    }
}
