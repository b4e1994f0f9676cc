//! # Xyston
//!
//! A hybrid retrieval layer over pluggable vector search backends.
//!
//! ## Features
//!
//! - Dense, sparse, and hybrid retrieval over one record model
//! - Pluggable backend adapters behind a single trait
//! - Structured filters translated per backend dialect
//! - Score normalization and rank fusion (RRF and weighted)
//! - Idempotent index lifecycle management
//! - Batched, retrying bulk writes

pub mod backend;
pub mod collection;
pub mod context;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod query;
pub mod record;
pub mod scoring;
pub mod store;
pub mod strategy;
pub mod writer;

pub mod prelude {
    pub use crate::backend::BackendAdapter;
    pub use crate::collection::IndexSpec;
    pub use crate::error::{Result, XystonError};
    pub use crate::query::{Query, QueryMode, QueryResult};
    pub use crate::record::Record;
    pub use crate::store::VectorStore;
    pub use crate::strategy::{HybridRanker, IndexCapability};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
