//! The store facade.
//!
//! [`VectorStore`] ties the layer together: it validates the query mode
//! through the strategy selector, hands the filter to the adapter for
//! translation, executes the raw searches, and post-processes scores
//! through the normalizer and, for hybrid queries, the fusion engine. The
//! caller gets a single ranked [`QueryResult`].
//!
//! The index is created lazily on first use if absent; it is durable state
//! owned by the backend, not by this layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::backend::{BackendAdapter, IndexHandle, RawHit, SearchRequest, SearchTarget};
use crate::collection::{IndexManager, IndexSpec};
use crate::embedding::{HashedBagEmbedder, SparseEmbedder};
use crate::error::{Result, XystonError};
use crate::query::{Query, QueryResult, ScoredRecord};
use crate::record::Record;
use crate::scoring::{
    FusionEngine, RankedId, normalize_dense, normalize_ranks, normalize_sparse,
};
use crate::strategy::{HybridRanker, RetrievalStrategy, StrategySelector};
use crate::writer::BatchWriter;

/// One store over one index of one backend.
pub struct VectorStore {
    adapter: Arc<dyn BackendAdapter>,
    spec: IndexSpec,
    manager: IndexManager,
    writer: BatchWriter,
    selector: StrategySelector,
    embedder: Arc<dyn SparseEmbedder>,
    deadline: Option<Duration>,
    handle: RwLock<Option<IndexHandle>>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("index", &self.spec.name)
            .field("capability", &self.spec.capability)
            .finish()
    }
}

impl VectorStore {
    /// Create a store over the given adapter and index spec.
    pub fn new(adapter: Arc<dyn BackendAdapter>, spec: IndexSpec) -> Self {
        Self {
            adapter,
            spec,
            manager: IndexManager::new(),
            writer: BatchWriter::new(),
            selector: StrategySelector::default(),
            embedder: Arc::new(HashedBagEmbedder::new()),
            deadline: None,
            handle: RwLock::new(None),
        }
    }

    /// Replace the batch writer configuration.
    pub fn with_writer(mut self, writer: BatchWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Configure the hybrid ranker applied to hybrid queries.
    pub fn with_ranker(mut self, ranker: HybridRanker) -> Self {
        self.selector = StrategySelector::with_ranker(ranker);
        self
    }

    /// Replace the sparse embedder used for hybrid indexing and sparse
    /// queries.
    pub fn with_embedder(mut self, embedder: Arc<dyn SparseEmbedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Bound every backend call with a deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The index spec this store serves.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Ensure the index exists, is built, and is loaded.
    ///
    /// Called lazily by every operation; calling it explicitly up front
    /// surfaces lifecycle errors early.
    pub fn ensure_ready(&self) -> Result<IndexHandle> {
        if let Some(handle) = self.handle.read().as_ref() {
            return Ok(handle.clone());
        }
        let handle = self.manager.ensure_ready(self.adapter.as_ref(), &self.spec)?;
        *self.handle.write() = Some(handle.clone());
        Ok(handle)
    }

    /// Insert records in bounded batches, returning their ids.
    ///
    /// On a hybrid index, records that carry no sparse embedding get one
    /// derived from their text through the configured embedder.
    pub fn insert(&self, records: Vec<Record>) -> Result<Vec<String>> {
        let handle = self.ensure_ready()?;

        let records = if self.spec.capability.supports_sparse() {
            records
                .into_iter()
                .map(|record| {
                    if record.sparse().is_some() {
                        Ok(record)
                    } else {
                        let sparse = self.embedder.embed_document(record.text())?;
                        Ok(record.with_sparse(sparse))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            records
        };

        let report = self.writer.insert_all(self.adapter.as_ref(), &handle, &records)?;
        debug!(index = %self.spec.name, inserted = report.ids.len(), "insert complete");
        Ok(report.ids)
    }

    /// Delete every record owned by the given document. Unknown ids are a
    /// no-op.
    pub fn delete(&self, doc_id: &str) -> Result<()> {
        let handle = self.ensure_ready()?;
        self.adapter.delete(&handle, doc_id)
    }

    /// Delete the records of several documents. Fails on the first error,
    /// reporting which document it was deleting.
    pub fn delete_many<S: AsRef<str>>(&self, doc_ids: &[S]) -> Result<()> {
        let handle = self.ensure_ready()?;
        for doc_id in doc_ids {
            let doc_id = doc_id.as_ref();
            self.adapter.delete(&handle, doc_id).map_err(|e| {
                XystonError::backend(format!("deleting document '{doc_id}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Execute a query, returning a single ranked result list.
    pub fn query(&self, query: &Query) -> Result<QueryResult> {
        if query.top_k == 0 {
            return Err(XystonError::invalid_argument("top_k must be positive"));
        }
        let handle = self.ensure_ready()?;
        let strategy = self.selector.resolve(query.mode, self.spec.capability)?;
        debug!(index = %self.spec.name, ?strategy, top_k = query.top_k, "executing query");

        match strategy {
            RetrievalStrategy::Dense => self.query_dense(&handle, query),
            RetrievalStrategy::Sparse => self.query_sparse(&handle, query),
            RetrievalStrategy::Hybrid(ranker) => self.query_hybrid(&handle, query, ranker),
        }
    }

    fn query_dense(&self, handle: &IndexHandle, query: &Query) -> Result<QueryResult> {
        let response = self.raw_dense(handle, query)?;
        let scores: Vec<f32> = if response.scores_are_ranks {
            normalize_ranks(&collect_scores(&response.hits))
        } else {
            let kind = self.adapter.dense_score_kind();
            response
                .hits
                .iter()
                .map(|hit| normalize_dense(kind, hit.score))
                .collect()
        };
        Ok(assemble(response.hits, scores))
    }

    fn query_sparse(&self, handle: &IndexHandle, query: &Query) -> Result<QueryResult> {
        let response = self.raw_sparse(handle, query)?;
        let raw = collect_scores(&response.hits);
        let scores = if response.scores_are_ranks {
            normalize_ranks(&raw)
        } else {
            normalize_sparse(&raw)
        };
        Ok(assemble(response.hits, scores))
    }

    fn query_hybrid(
        &self,
        handle: &IndexHandle,
        query: &Query,
        ranker: HybridRanker,
    ) -> Result<QueryResult> {
        let dense_response = self.raw_dense(handle, query)?;
        let sparse_response = self.raw_sparse(handle, query)?;

        let kind = self.adapter.dense_score_kind();
        let dense_ranked: Vec<RankedId> = if dense_response.scores_are_ranks {
            let scores = normalize_ranks(&collect_scores(&dense_response.hits));
            ranked_ids(&dense_response.hits, &scores)
        } else {
            dense_response
                .hits
                .iter()
                .map(|hit| RankedId::new(hit.id.clone(), normalize_dense(kind, hit.score)))
                .collect()
        };
        let sparse_scores = if sparse_response.scores_are_ranks {
            normalize_ranks(&collect_scores(&sparse_response.hits))
        } else {
            normalize_sparse(&collect_scores(&sparse_response.hits))
        };
        let sparse_ranked = ranked_ids(&sparse_response.hits, &sparse_scores);

        let fused = FusionEngine::new(self.spec.capability).fuse(
            ranker,
            &dense_ranked,
            &sparse_ranked,
            query.top_k,
        )?;

        // Materialize records from whichever sub-result saw them first.
        let mut records: HashMap<&str, &Record> = HashMap::new();
        for hit in dense_response.hits.iter().chain(sparse_response.hits.iter()) {
            records.entry(hit.id.as_str()).or_insert(&hit.record);
        }

        let hits = fused
            .into_iter()
            .filter_map(|fused_hit| {
                records.get(fused_hit.id.as_str()).map(|record| ScoredRecord {
                    record: (*record).clone(),
                    score: fused_hit.score,
                    id: fused_hit.id,
                })
            })
            .collect();
        Ok(QueryResult { hits })
    }

    fn raw_dense(&self, handle: &IndexHandle, query: &Query) -> Result<crate::backend::SearchResponse> {
        let embedding = query.embedding.clone().ok_or_else(|| {
            XystonError::invalid_argument("dense retrieval requires a query embedding")
        })?;
        let request = self.finish_request(SearchRequest::from_query(
            query,
            SearchTarget::Dense(embedding),
        ));
        self.adapter.search(handle, &request)
    }

    fn raw_sparse(&self, handle: &IndexHandle, query: &Query) -> Result<crate::backend::SearchResponse> {
        let text = query.text.as_deref().ok_or_else(|| {
            XystonError::invalid_argument("sparse retrieval requires query text")
        })?;
        let sparse = self.embedder.embed_query(text)?;
        let request = self.finish_request(SearchRequest::from_query(
            query,
            SearchTarget::Sparse(sparse),
        ));
        self.adapter.search(handle, &request)
    }

    fn finish_request(&self, request: SearchRequest) -> SearchRequest {
        match self.deadline {
            Some(deadline) => request.with_deadline(deadline),
            None => request,
        }
    }
}

fn collect_scores(hits: &[RawHit]) -> Vec<f32> {
    hits.iter().map(|hit| hit.score).collect()
}

fn ranked_ids(hits: &[RawHit], scores: &[f32]) -> Vec<RankedId> {
    hits.iter()
        .zip(scores.iter())
        .map(|(hit, score)| RankedId::new(hit.id.clone(), *score))
        .collect()
}

fn assemble(hits: Vec<RawHit>, scores: Vec<f32>) -> QueryResult {
    let hits = hits
        .into_iter()
        .zip(scores)
        .map(|(hit, score)| ScoredRecord {
            record: hit.record,
            score,
            id: hit.id,
        })
        .collect();
    QueryResult { hits }
}
