//! Backend adapter contract.
//!
//! A [`BackendAdapter`] wraps one external search engine behind a uniform
//! capability contract: index lifecycle primitives, batch insert, delete by
//! owning document, and raw search. Adapters stay backend-pure: raw hits
//! carry backend-native score semantics, and normalization happens above
//! this seam, never inside it.
//!
//! # Module Structure
//!
//! - [`BackendAdapter`] - the capability contract
//! - [`memory`] - the in-memory reference adapter

pub mod memory;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::IndexSpec;
use crate::error::Result;
use crate::filter::FilterExpression;
use crate::query::Query;
use crate::record::{Record, SparseVector};
use crate::scoring::DenseScoreKind;
use crate::strategy::IndexCapability;

/// A handle to a Ready index, issued by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHandle {
    /// Index name.
    pub name: String,
    /// Capability the index was created with.
    pub capability: IndexCapability,
    /// Declared dense dimension, if any.
    pub dimension: Option<usize>,
    /// Opaque handle identity.
    pub token: Uuid,
}

impl IndexHandle {
    /// Create a handle for a Ready index.
    pub fn new<S: Into<String>>(
        name: S,
        capability: IndexCapability,
        dimension: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            capability,
            dimension,
            token: Uuid::new_v4(),
        }
    }
}

/// What a raw search runs against.
#[derive(Debug, Clone)]
pub enum SearchTarget {
    /// Dense-vector similarity over the embedding field.
    Dense(Vec<f32>),
    /// Sparse relevance over the sparse field.
    Sparse(SparseVector),
}

/// A raw search request, one retrieval mode at a time.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The query vector.
    pub target: SearchTarget,
    /// Metadata filter; the adapter translates it to its native shape.
    pub filter: FilterExpression,
    /// Restrict hits to records owned by these documents. Empty means all.
    pub doc_ids: Vec<String>,
    /// Restrict hits to these record ids. Empty means all.
    pub record_ids: Vec<String>,
    /// Maximum number of hits.
    pub top_k: usize,
    /// Metadata fields to materialize. Empty means all.
    pub output_fields: Vec<String>,
    /// Bounded deadline for the call; exceeding it fails with
    /// `BackendTimeout` and an unknown outcome.
    pub deadline: Option<Duration>,
}

impl SearchRequest {
    /// Build a raw request from a query and a resolved target.
    pub fn from_query(query: &Query, target: SearchTarget) -> Self {
        Self {
            target,
            filter: query.filter.clone(),
            doc_ids: query.doc_ids.clone(),
            record_ids: query.record_ids.clone(),
            top_k: query.top_k,
            output_fields: query.output_fields.clone(),
            deadline: None,
        }
    }

    /// Set the call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// One raw hit with its backend-native score.
#[derive(Debug, Clone)]
pub struct RawHit {
    /// Record id.
    pub id: String,
    /// Owning document id.
    pub doc_id: String,
    /// Backend-native score. Its meaning depends on the adapter's declared
    /// score semantics and the retrieval mode.
    pub score: f32,
    /// The materialized record.
    pub record: Record,
}

/// Raw hits plus how their scores are expressed.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Hits in backend return order.
    pub hits: Vec<RawHit>,
    /// True when the scores are rank positions rather than raw scores
    /// (backends that fuse natively report ranks).
    pub scores_are_ranks: bool,
}

impl SearchResponse {
    /// Create a response with raw scores.
    pub fn scored(hits: Vec<RawHit>) -> Self {
        Self {
            hits,
            scores_are_ranks: false,
        }
    }

    /// Create a response whose scores are rank positions.
    pub fn ranked(hits: Vec<RawHit>) -> Self {
        Self {
            hits,
            scores_are_ranks: true,
        }
    }
}

/// Capability contract every backend adapter implements.
///
/// One implementation per external engine; the strategy selector and the
/// score normalizer depend only on this trait, never on a concrete backend
/// type. Errors propagate unmodified; no retry happens at this seam.
pub trait BackendAdapter: Send + Sync + std::fmt::Debug {
    /// The richest capability this engine can index.
    fn capability(&self) -> IndexCapability;

    /// What this engine's raw dense scores mean.
    fn dense_score_kind(&self) -> DenseScoreKind;

    /// Whether concurrent batch writers are safe against this engine.
    fn supports_concurrent_writes(&self) -> bool {
        false
    }

    // =========================================================================
    // Index lifecycle primitives
    // =========================================================================

    /// List existing index names.
    fn list_indexes(&self) -> Result<Vec<String>>;

    /// Create an index from a spec. Creating a name that already exists is
    /// a backend-defined error and surfaces unmodified.
    fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Drop an index and its records.
    fn drop_index(&self, name: &str) -> Result<()>;

    /// Load/activate an index for querying.
    fn load_index(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Data operations
    // =========================================================================

    /// Insert a batch of records, returning their ids. Fails atomically per
    /// batch: one malformed record fails the whole batch with nothing
    /// written from it.
    fn insert(&self, index: &IndexHandle, batch: &[Record]) -> Result<Vec<String>>;

    /// Delete every record whose owning document reference equals `doc_id`.
    /// Deleting a non-existent id is a no-op.
    fn delete(&self, index: &IndexHandle, doc_id: &str) -> Result<()>;

    /// Execute a raw search. No normalization happens here.
    fn search(&self, index: &IndexHandle, request: &SearchRequest) -> Result<SearchResponse>;

    /// Force just-inserted records to become visible to subsequent queries.
    fn flush(&self, index: &IndexHandle) -> Result<()>;
}
