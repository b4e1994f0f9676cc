//! Sparse embedding of text.
//!
//! This layer never computes dense embeddings; they arrive on records from
//! the ingestion pipeline. Sparse embeddings, however, can be derived from
//! text at insert and query time through a [`SparseEmbedder`] passed in
//! explicitly as configuration, never read from process-wide state.

use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;

use crate::error::Result;
use crate::record::SparseVector;

/// Produces sparse embeddings for stored documents and for queries.
pub trait SparseEmbedder: Send + Sync + std::fmt::Debug {
    /// Embed a document text for indexing.
    fn embed_document(&self, text: &str) -> Result<SparseVector>;

    /// Embed a query text for searching.
    fn embed_query(&self, text: &str) -> Result<SparseVector>;
}

/// A deterministic bag-of-terms embedder.
///
/// Tokens are lowercased alphanumeric runs hashed into a 32-bit term space
/// with a fixed-seed hasher, weighted by their in-text frequency. The same
/// text always produces the same sparse vector, across processes.
#[derive(Debug, Clone)]
pub struct HashedBagEmbedder {
    state: RandomState,
}

impl HashedBagEmbedder {
    /// Create a new embedder with the fixed default seed.
    pub fn new() -> Self {
        Self {
            // Fixed seeds: term ids must be stable across processes.
            state: RandomState::with_seeds(0x4f1d, 0x3a7c, 0x99e2, 0x1b05),
        }
    }

    fn term_id(&self, token: &str) -> u32 {
        let mut hasher = self.state.build_hasher();
        token.hash(&mut hasher);
        hasher.finish() as u32
    }

    fn embed(&self, text: &str) -> SparseVector {
        let mut weights: ahash::AHashMap<u32, f32> = ahash::AHashMap::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            *weights.entry(self.term_id(&token)).or_insert(0.0) += 1.0;
        }
        SparseVector::from_pairs(weights)
    }
}

impl Default for HashedBagEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseEmbedder for HashedBagEmbedder {
    fn embed_document(&self, text: &str) -> Result<SparseVector> {
        Ok(self.embed(text))
    }

    fn embed_query(&self, text: &str) -> Result<SparseVector> {
        Ok(self.embed(text))
    }
}
