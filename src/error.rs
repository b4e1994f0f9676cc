//! Error types for the Xyston library.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is the [`XystonError`] enum. Adapter failures propagate unmodified except
//! where this layer attaches context (which index, which batch, which record).

use std::io;

use thiserror::Error;

/// The main error type for Xyston operations.
#[derive(Error, Debug)]
pub enum XystonError {
    /// A record's dense embedding length disagrees with the index dimension.
    /// Never retried; surfaced immediately, before anything is written.
    #[error("dimension mismatch for record '{record_id}': index declares {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension declared by the index.
        expected: usize,
        /// Length of the offending embedding.
        actual: usize,
        /// Id of the record carrying the embedding.
        record_id: String,
    },

    /// A filter tree uses an operator outside the supported equality/AND subset.
    #[error("unsupported filter: {0}")]
    FilterUnsupported(String),

    /// The requested retrieval mode is incompatible with the index capability.
    #[error("unsupported query mode: {0}")]
    ModeUnsupported(String),

    /// Fusion was requested against an index whose capability is not hybrid.
    #[error("strategy mismatch: {0}")]
    StrategyMismatch(String),

    /// One batch in a multi-batch insert failed. Batches before `batch_index`
    /// remain committed; `committed` is the number of records already written.
    #[error("batch {batch_index} failed after {committed} records committed: {source}")]
    BatchInsert {
        /// Zero-based index of the failed batch.
        batch_index: usize,
        /// Records committed by the batches that succeeded.
        committed: usize,
        /// The underlying failure.
        #[source]
        source: Box<XystonError>,
    },

    /// Opaque wrapper around a transport/protocol failure from the engine.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend call exceeded its deadline; the outcome is unknown.
    #[error("backend timeout: {0}")]
    BackendTimeout(String),

    /// Index lifecycle errors (create, drop, load).
    #[error("index error: {0}")]
    Index(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`XystonError`].
pub type Result<T> = std::result::Result<T, XystonError>;

impl XystonError {
    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        XystonError::Backend(msg.into())
    }

    /// Create a new backend timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        XystonError::BackendTimeout(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        XystonError::Index(msg.into())
    }

    /// Create a new unsupported-filter error.
    pub fn filter_unsupported<S: Into<String>>(msg: S) -> Self {
        XystonError::FilterUnsupported(msg.into())
    }

    /// Create a new unsupported-mode error.
    pub fn mode_unsupported<S: Into<String>>(msg: S) -> Self {
        XystonError::ModeUnsupported(msg.into())
    }

    /// Create a new strategy mismatch error.
    pub fn strategy_mismatch<S: Into<String>>(msg: S) -> Self {
        XystonError::StrategyMismatch(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        XystonError::Other(format!("invalid argument: {}", msg.into()))
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        XystonError::Other(format!("not found: {}", msg.into()))
    }

    /// Wrap a batch failure with its position and the committed record count.
    pub fn batch_insert(batch_index: usize, committed: usize, source: XystonError) -> Self {
        XystonError::BatchInsert {
            batch_index,
            committed,
            source: Box::new(source),
        }
    }
}
