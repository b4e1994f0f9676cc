//! In-memory reference backend.
//!
//! A dual-mode engine holding every index in process memory behind a
//! `parking_lot::RwLock`. It implements the full adapter contract: lifecycle
//! primitives with backend-style duplicate-create errors, atomic-per-batch
//! insert with dimension validation, delete by owning document, and raw
//! dense/sparse search with backend-native scores. It exists so the layers
//! above can be exercised without a network engine, and doubles as the
//! reference for writing real bindings.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::backend::{BackendAdapter, IndexHandle, RawHit, SearchRequest, SearchResponse, SearchTarget};
use crate::collection::{IndexSpec, SimilarityMetric};
use crate::error::{Result, XystonError};
use crate::filter::{FilterTranslator, PredicateFilterTranslator};
use crate::record::Record;
use crate::scoring::DenseScoreKind;
use crate::strategy::IndexCapability;

#[derive(Debug)]
struct IndexData {
    spec: IndexSpec,
    loaded: bool,
    // Insertion order is the tie-break order for equal scores, so records
    // live in a Vec; the id map only serves replace-by-id.
    records: Vec<Record>,
    positions: AHashMap<String, usize>,
}

impl IndexData {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            loaded: false,
            records: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    fn upsert(&mut self, record: Record) {
        match self.positions.get(record.id()) {
            Some(&position) => self.records[position] = record,
            None => {
                self.positions
                    .insert(record.id().to_string(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn remove_doc(&mut self, doc_id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|record| record.doc_id() != doc_id);
        if self.records.len() != before {
            self.positions = self
                .records
                .iter()
                .enumerate()
                .map(|(position, record)| (record.id().to_string(), position))
                .collect();
        }
        before - self.records.len()
    }
}

/// In-memory backend adapter.
#[derive(Debug)]
pub struct MemoryBackend {
    capability: IndexCapability,
    dense_score_kind: DenseScoreKind,
    indexes: RwLock<AHashMap<String, IndexData>>,
}

impl MemoryBackend {
    /// Create a dense-only engine emitting similarity scores.
    pub fn dense_only() -> Self {
        Self::new(IndexCapability::DenseOnly, DenseScoreKind::Similarity)
    }

    /// Create a dual-mode (hybrid-capable) engine emitting similarity scores.
    pub fn hybrid() -> Self {
        Self::new(IndexCapability::Hybrid, DenseScoreKind::Similarity)
    }

    /// Create an engine with an explicit capability and dense score kind.
    pub fn new(capability: IndexCapability, dense_score_kind: DenseScoreKind) -> Self {
        Self {
            capability,
            dense_score_kind,
            indexes: RwLock::new(AHashMap::new()),
        }
    }

    /// Number of records currently stored in an index.
    pub fn record_count(&self, name: &str) -> usize {
        self.indexes
            .read()
            .get(name)
            .map(|data| data.records.len())
            .unwrap_or(0)
    }

    fn validate_batch(&self, spec: &IndexSpec, batch: &[Record]) -> Result<()> {
        if let Some(expected) = spec.dimension {
            for record in batch {
                if let Some(actual) = record.dimension()
                    && actual != expected
                {
                    return Err(XystonError::DimensionMismatch {
                        expected,
                        actual,
                        record_id: record.id().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn dense_score(&self, metric: SimilarityMetric, query: &[f32], stored: &[f32]) -> f32 {
        match self.dense_score_kind {
            DenseScoreKind::Similarity => match metric {
                SimilarityMetric::InnerProduct => dot(query, stored),
                _ => cosine(query, stored),
            },
            DenseScoreKind::Distance => l2(query, stored),
        }
    }

    fn restrict_output(record: &Record, output_fields: &[String]) -> Record {
        if output_fields.is_empty() {
            return record.clone();
        }
        let mut restricted = Record::new(record.id(), record.text()).with_doc_id(record.doc_id());
        if let Some(embedding) = record.embedding() {
            restricted = restricted.with_embedding(embedding.to_vec());
        }
        for field in output_fields {
            if let Some(value) = record.metadata().get(field) {
                restricted = restricted.with_metadata(field.clone(), value.clone());
            }
        }
        restricted
    }
}

impl BackendAdapter for MemoryBackend {
    fn capability(&self) -> IndexCapability {
        self.capability
    }

    fn dense_score_kind(&self) -> DenseScoreKind {
        self.dense_score_kind
    }

    fn supports_concurrent_writes(&self) -> bool {
        true
    }

    fn list_indexes(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.indexes.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&spec.name) {
            // Backend-defined duplicate-create behavior: an error, surfaced.
            return Err(XystonError::index(format!(
                "index '{}' already exists",
                spec.name
            )));
        }
        debug!(index = %spec.name, capability = ?spec.capability, "creating index");
        indexes.insert(spec.name.clone(), IndexData::new(spec.clone()));
        Ok(())
    }

    fn drop_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        indexes
            .remove(name)
            .ok_or_else(|| XystonError::index(format!("cannot drop unknown index '{name}'")))?;
        debug!(index = %name, "dropped index");
        Ok(())
    }

    fn load_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let data = indexes
            .get_mut(name)
            .ok_or_else(|| XystonError::index(format!("cannot load unknown index '{name}'")))?;
        data.loaded = true;
        Ok(())
    }

    fn insert(&self, index: &IndexHandle, batch: &[Record]) -> Result<Vec<String>> {
        let mut indexes = self.indexes.write();
        let data = indexes
            .get_mut(&index.name)
            .ok_or_else(|| XystonError::index(format!("unknown index '{}'", index.name)))?;

        // Validate the whole batch before touching the store, so a
        // malformed record fails the batch with nothing written from it.
        self.validate_batch(&data.spec, batch)?;

        let mut ids = Vec::with_capacity(batch.len());
        for record in batch {
            ids.push(record.id().to_string());
            data.upsert(record.clone());
        }
        debug!(index = %index.name, inserted = ids.len(), "inserted batch");
        Ok(ids)
    }

    fn delete(&self, index: &IndexHandle, doc_id: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let data = indexes
            .get_mut(&index.name)
            .ok_or_else(|| XystonError::index(format!("unknown index '{}'", index.name)))?;
        let removed = data.remove_doc(doc_id);
        debug!(index = %index.name, doc_id = %doc_id, removed, "deleted by doc id");
        Ok(())
    }

    fn search(&self, index: &IndexHandle, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let indexes = self.indexes.read();
        let data = indexes
            .get(&index.name)
            .ok_or_else(|| XystonError::index(format!("unknown index '{}'", index.name)))?;
        if !data.loaded {
            return Err(XystonError::index(format!(
                "index '{}' is not loaded",
                index.name
            )));
        }

        let predicate = PredicateFilterTranslator.translate(&request.filter)?;
        let doc_ids: HashSet<&str> = request.doc_ids.iter().map(String::as_str).collect();
        let record_ids: HashSet<&str> = request.record_ids.iter().map(String::as_str).collect();

        let mut scored: Vec<(f32, &Record)> = Vec::new();
        for record in &data.records {
            if !doc_ids.is_empty() && !doc_ids.contains(record.doc_id()) {
                continue;
            }
            if !record_ids.is_empty() && !record_ids.contains(record.id()) {
                continue;
            }
            if let Some(predicate) = &predicate
                && !predicate.matches(record.metadata())
            {
                continue;
            }

            match &request.target {
                SearchTarget::Dense(query) => {
                    let Some(stored) = record.embedding() else {
                        continue;
                    };
                    if stored.len() != query.len() {
                        return Err(XystonError::invalid_argument(format!(
                            "query embedding length {} does not match stored length {}",
                            query.len(),
                            stored.len()
                        )));
                    }
                    scored.push((self.dense_score(data.spec.metric, query, stored), record));
                }
                SearchTarget::Sparse(query) => {
                    if !data.spec.capability.supports_sparse() {
                        return Err(XystonError::index(format!(
                            "index '{}' has no sparse field",
                            index.name
                        )));
                    }
                    let Some(stored) = record.sparse() else {
                        continue;
                    };
                    let relevance = stored.dot(query);
                    // Keyword semantics: only matching records are hits.
                    if relevance > 0.0 {
                        scored.push((relevance, record));
                    }
                }
            }
        }

        // Stable sort keeps insertion order for equal scores.
        let descending = !matches!(
            (&request.target, self.dense_score_kind),
            (SearchTarget::Dense(_), DenseScoreKind::Distance)
        );
        scored.sort_by(|a, b| {
            let ordering = a.0.partial_cmp(&b.0).unwrap_or(CmpOrdering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        scored.truncate(request.top_k);

        if let Some(deadline) = request.deadline
            && started.elapsed() > deadline
        {
            return Err(XystonError::timeout(format!(
                "search on '{}' exceeded {:?}",
                index.name, deadline
            )));
        }

        let hits = scored
            .into_iter()
            .map(|(score, record)| RawHit {
                id: record.id().to_string(),
                doc_id: record.doc_id().to_string(),
                score,
                record: Self::restrict_output(record, &request.output_fields),
            })
            .collect::<Vec<_>>();
        debug!(index = %index.name, hits = hits.len(), "search complete");
        Ok(SearchResponse::scored(hits))
    }

    fn flush(&self, index: &IndexHandle) -> Result<()> {
        // Writes are immediately visible in memory; flush is a no-op, kept
        // so callers can rely on the contract uniformly.
        let indexes = self.indexes.read();
        indexes
            .get(&index.name)
            .map(|_| ())
            .ok_or_else(|| XystonError::index(format!("unknown index '{}'", index.name)))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
