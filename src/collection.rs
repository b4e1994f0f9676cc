//! Index specs and lifecycle management.
//!
//! An [`IndexSpec`] declares everything a backend needs to build an index:
//! name, dense dimension, capability, field schema, metric, index kinds,
//! consistency, and the overwrite policy. The [`IndexManager`] owns the
//! per-index state machine `Absent -> Creating -> Ready` and the
//! check-then-act create sequence.
//!
//! The create sequence is a best-effort idempotency guard, not a lock:
//! concurrent creators racing on one name may both observe "absent" and
//! both attempt creation, and the backend's own duplicate-create behavior
//! decides the outcome. Duplicate-create errors surface unmodified.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendAdapter, IndexHandle};
use crate::error::{Result, XystonError};
use crate::strategy::IndexCapability;

/// Similarity metric for the dense vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Inner product; higher is closer.
    #[default]
    InnerProduct,
    /// Cosine similarity; higher is closer.
    Cosine,
    /// Euclidean distance; lower is closer.
    L2,
}

/// Index structure for the dense vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenseIndexKind {
    /// Exact (brute-force) search.
    #[default]
    Flat,
    /// Approximate graph-based search.
    Hnsw,
}

/// Index structure for the sparse vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseIndexKind {
    /// Inverted index over term ids.
    #[default]
    Inverted,
}

/// Consistency level for a newly created index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// Writes are visible to subsequent reads.
    #[default]
    Strong,
    /// Visibility is eventual; use flush to force it.
    Eventual,
}

/// Names of the stored fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNames {
    /// Primary key field.
    pub id: String,
    /// Raw text field.
    pub text: String,
    /// Dense embedding field.
    pub embedding: String,
    /// Sparse embedding field.
    pub sparse: String,
    /// Owning document reference field.
    pub doc_id: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            text: "content".to_string(),
            embedding: "embedding".to_string(),
            sparse: "sparse_embedding".to_string(),
            doc_id: "doc_id".to_string(),
        }
    }
}

/// Declaration of one index.
///
/// Hybrid specs declare two vector fields with independently chosen index
/// kinds; both are built before the index is marked Ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Dense dimension. Required when the index must be created.
    pub dimension: Option<usize>,
    /// Dense-only or hybrid.
    pub capability: IndexCapability,
    /// Dense similarity metric.
    pub metric: SimilarityMetric,
    /// Dense index structure.
    pub dense_index: DenseIndexKind,
    /// Sparse index structure (hybrid specs only).
    pub sparse_index: SparseIndexKind,
    /// Consistency level for a newly created index.
    pub consistency: ConsistencyLevel,
    /// Drop and recreate on a name collision.
    pub overwrite: bool,
    /// Stored field names.
    pub fields: FieldNames,
}

impl IndexSpec {
    /// Create a dense-only spec with the given name and dimension.
    pub fn dense<S: Into<String>>(name: S, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension: Some(dimension),
            capability: IndexCapability::DenseOnly,
            metric: SimilarityMetric::default(),
            dense_index: DenseIndexKind::default(),
            sparse_index: SparseIndexKind::default(),
            consistency: ConsistencyLevel::default(),
            overwrite: false,
            fields: FieldNames::default(),
        }
    }

    /// Create a hybrid (dense + sparse) spec.
    pub fn hybrid<S: Into<String>>(name: S, dimension: usize) -> Self {
        Self {
            capability: IndexCapability::Hybrid,
            ..Self::dense(name, dimension)
        }
    }

    /// Set the dense similarity metric.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the dense index structure.
    pub fn with_dense_index(mut self, kind: DenseIndexKind) -> Self {
        self.dense_index = kind;
        self
    }

    /// Set the overwrite policy.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the consistency level.
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the stored field names.
    pub fn with_fields(mut self, fields: FieldNames) -> Self {
        self.fields = fields;
        self
    }
}

/// Lifecycle state of one index, as observed by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Not known to exist.
    Absent,
    /// Creation in flight.
    Creating,
    /// Created and loaded for querying.
    Ready,
}

/// Owns the per-index state machine and the idempotent ensure sequence.
#[derive(Debug, Default)]
pub struct IndexManager {
    states: RwLock<HashMap<String, IndexState>>,
}

impl IndexManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state this process last observed for an index name.
    pub fn state(&self, name: &str) -> IndexState {
        self.states
            .read()
            .get(name)
            .copied()
            .unwrap_or(IndexState::Absent)
    }

    /// Ensure the index exists, is built, and is loaded; returns a handle.
    ///
    /// Check-then-act: list existing indexes, create only if absent. When
    /// overwrite is requested and the name collides, the existing index is
    /// explicitly dropped first. An existing index is otherwise reused
    /// as-is, without validating schema compatibility (the caller's
    /// responsibility). Once Ready, repeated calls return a fresh handle
    /// without touching the backend again.
    pub fn ensure_ready(
        &self,
        adapter: &dyn BackendAdapter,
        spec: &IndexSpec,
    ) -> Result<IndexHandle> {
        if spec.capability.supports_sparse() && !adapter.capability().supports_sparse() {
            return Err(XystonError::index(format!(
                "index '{}' declares hybrid capability but the backend is dense-only",
                spec.name
            )));
        }

        if self.state(&spec.name) == IndexState::Ready {
            return Ok(IndexHandle::new(
                &spec.name,
                spec.capability,
                spec.dimension,
            ));
        }

        self.states
            .write()
            .insert(spec.name.clone(), IndexState::Creating);

        let result = self.create_sequence(adapter, spec);
        match result {
            Ok(()) => {
                self.states
                    .write()
                    .insert(spec.name.clone(), IndexState::Ready);
                debug!(index = %spec.name, capability = ?spec.capability, "index ready");
                Ok(IndexHandle::new(
                    &spec.name,
                    spec.capability,
                    spec.dimension,
                ))
            }
            Err(e) => {
                self.states
                    .write()
                    .insert(spec.name.clone(), IndexState::Absent);
                Err(e)
            }
        }
    }

    fn create_sequence(&self, adapter: &dyn BackendAdapter, spec: &IndexSpec) -> Result<()> {
        let existing = adapter.list_indexes()?;
        let exists = existing.iter().any(|name| name == &spec.name);

        if exists && spec.overwrite {
            debug!(index = %spec.name, "dropping existing index before recreate");
            adapter.drop_index(&spec.name)?;
        }

        if !exists || spec.overwrite {
            if spec.dimension.is_none() {
                return Err(XystonError::invalid_argument(format!(
                    "dimension is required to create index '{}'",
                    spec.name
                )));
            }
            // Duplicate-create from a racing creator surfaces here unmodified.
            adapter.create_index(spec)?;
        }

        adapter.load_index(&spec.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[test]
    fn test_spec_builders() {
        let spec = IndexSpec::dense("idx", 4);
        assert_eq!(spec.capability, IndexCapability::DenseOnly);
        assert_eq!(spec.dimension, Some(4));
        assert!(!spec.overwrite);

        let spec = IndexSpec::hybrid("idx", 8)
            .with_metric(SimilarityMetric::Cosine)
            .with_dense_index(DenseIndexKind::Hnsw)
            .with_overwrite(true);
        assert_eq!(spec.capability, IndexCapability::Hybrid);
        assert_eq!(spec.metric, SimilarityMetric::Cosine);
        assert_eq!(spec.dense_index, DenseIndexKind::Hnsw);
        assert!(spec.overwrite);
    }

    #[test]
    fn test_default_field_names() {
        let fields = FieldNames::default();
        assert_eq!(fields.id, "id");
        assert_eq!(fields.text, "content");
        assert_eq!(fields.embedding, "embedding");
        assert_eq!(fields.sparse, "sparse_embedding");
        assert_eq!(fields.doc_id, "doc_id");
    }

    #[test]
    fn test_ensure_ready_creates_then_reuses() {
        let backend = MemoryBackend::hybrid();
        let manager = IndexManager::new();
        let spec = IndexSpec::hybrid("docs", 4);

        assert_eq!(manager.state("docs"), IndexState::Absent);
        let first = manager.ensure_ready(&backend, &spec).unwrap();
        assert_eq!(manager.state("docs"), IndexState::Ready);

        // Second call with overwrite=false never raises and does not
        // duplicate the index.
        let second = manager.ensure_ready(&backend, &spec).unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(backend.list_indexes().unwrap(), vec!["docs".to_string()]);
    }

    #[test]
    fn test_ensure_ready_requires_dimension_for_creation() {
        let backend = MemoryBackend::hybrid();
        let manager = IndexManager::new();
        let mut spec = IndexSpec::hybrid("docs", 4);
        spec.dimension = None;

        let err = manager.ensure_ready(&backend, &spec).unwrap_err();
        assert!(err.to_string().contains("dimension is required"));
        assert_eq!(manager.state("docs"), IndexState::Absent);
    }

    #[test]
    fn test_hybrid_spec_rejected_on_dense_only_backend() {
        let backend = MemoryBackend::dense_only();
        let manager = IndexManager::new();
        let spec = IndexSpec::hybrid("docs", 4);

        let err = manager.ensure_ready(&backend, &spec).unwrap_err();
        assert!(matches!(err, XystonError::Index(_)));
    }

    #[test]
    fn test_overwrite_drops_existing_index() {
        let backend = MemoryBackend::hybrid();
        let manager = IndexManager::new();
        let spec = IndexSpec::hybrid("docs", 4);
        manager.ensure_ready(&backend, &spec).unwrap();

        // A fresh manager (new process) with overwrite set drops and
        // recreates rather than reusing.
        let other = IndexManager::new();
        let overwrite_spec = IndexSpec::hybrid("docs", 8).with_overwrite(true);
        let handle = other.ensure_ready(&backend, &overwrite_spec).unwrap();
        assert_eq!(handle.dimension, Some(8));
    }
}
