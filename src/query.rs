//! Query model and result types.
//!
//! A [`Query`] enumerates every recognized option explicitly; there are no
//! open-ended keyword arguments. Mode/payload coherence is validated when the
//! query is executed, because it depends on the target index capability.

use serde::{Deserialize, Serialize};

use crate::filter::FilterExpression;
use crate::record::Record;

fn default_top_k() -> usize {
    10
}

/// Requested retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Dense-vector similarity search. Allowed against any index.
    #[default]
    Default,
    /// Sparse/keyword relevance search. Requires a hybrid index.
    Sparse,
    /// Dense + sparse fused search. Requires a hybrid index.
    Hybrid,
}

/// A query against one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Requested retrieval mode.
    pub mode: QueryMode,
    /// Query text; required for sparse and hybrid modes.
    #[serde(default)]
    pub text: Option<String>,
    /// Dense query embedding; required for default and hybrid modes.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Maximum number of results to return. Must be positive.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Metadata filter.
    #[serde(default)]
    pub filter: FilterExpression,
    /// Restrict hits to records owned by these documents.
    #[serde(default)]
    pub doc_ids: Vec<String>,
    /// Restrict hits to these record ids.
    #[serde(default)]
    pub record_ids: Vec<String>,
    /// Metadata fields to materialize on returned records. Empty means all.
    #[serde(default)]
    pub output_fields: Vec<String>,
}

impl Query {
    /// Create a default-mode (dense) query from a query embedding.
    pub fn dense(embedding: Vec<f32>) -> Self {
        Self {
            mode: QueryMode::Default,
            text: None,
            embedding: Some(embedding),
            top_k: default_top_k(),
            filter: FilterExpression::empty(),
            doc_ids: Vec::new(),
            record_ids: Vec::new(),
            output_fields: Vec::new(),
        }
    }

    /// Create a sparse-mode query from query text.
    pub fn sparse<S: Into<String>>(text: S) -> Self {
        Self {
            mode: QueryMode::Sparse,
            text: Some(text.into()),
            embedding: None,
            top_k: default_top_k(),
            filter: FilterExpression::empty(),
            doc_ids: Vec::new(),
            record_ids: Vec::new(),
            output_fields: Vec::new(),
        }
    }

    /// Create a hybrid-mode query from query text and a dense embedding.
    pub fn hybrid<S: Into<String>>(text: S, embedding: Vec<f32>) -> Self {
        Self {
            mode: QueryMode::Hybrid,
            text: Some(text.into()),
            embedding: Some(embedding),
            top_k: default_top_k(),
            filter: FilterExpression::empty(),
            doc_ids: Vec::new(),
            record_ids: Vec::new(),
            output_fields: Vec::new(),
        }
    }

    /// Set the number of results to return.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the metadata filter.
    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    /// Restrict hits to records owned by the given documents.
    pub fn with_doc_ids<I, S>(mut self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_ids = doc_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict hits to the given record ids.
    pub fn with_record_ids<I, S>(mut self, record_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record_ids = record_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Limit the metadata fields materialized on returned records.
    pub fn with_output_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// One result: a record, its post-normalization score, and its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: Record,
    /// Post-normalization score; comparable within one result set.
    pub score: f32,
    /// The record id.
    pub id: String,
}

/// Ordered result set, highest relevance first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Results sorted by score, descending.
    pub hits: Vec<ScoredRecord>,
}

impl QueryResult {
    /// Create an empty result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Check whether the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The highest-scoring result.
    pub fn best(&self) -> Option<&ScoredRecord> {
        self.hits.first()
    }

    /// Sort by score, descending. Ties keep their current order.
    pub fn sort_by_score(&mut self) {
        self.hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Truncate to at most `top_k` results.
    pub fn truncate(&mut self, top_k: usize) {
        if self.hits.len() > top_k {
            self.hits.truncate(top_k);
        }
    }
}
