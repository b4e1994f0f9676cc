//! Batch partitioning for large insert sets.
//!
//! The [`BatchWriter`] splits N records into ceil(N/B) batches preserving
//! original order and pushes them through a backend adapter. On failure of
//! batch k, the batches that already succeeded stay committed (no rollback)
//! and the caller gets the failure plus the exact count of committed
//! records, so a retry can resume from a known boundary.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::backend::{BackendAdapter, IndexHandle};
use crate::error::{Result, XystonError};
use crate::record::Record;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of internal retries per batch before surfacing the error.
pub const DEFAULT_INSERT_RETRIES: u32 = 3;

/// Outcome of a fully successful multi-batch insert.
#[derive(Debug, Clone)]
pub struct InsertReport {
    /// Ids of all inserted records, in original order.
    pub ids: Vec<String>,
    /// Number of batches issued.
    pub batches: usize,
}

/// Partitions inserts into bounded batches and reports partial failures.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    batch_size: usize,
    retries: u32,
    parallel: bool,
    flush: bool,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    /// Create a writer with the default batch size and retry count.
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_INSERT_RETRIES,
            parallel: false,
            flush: false,
        }
    }

    /// Set the batch size. Must be positive.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-batch internal retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Run batches concurrently. Only takes effect when the adapter reports
    /// that concurrent writers are safe; otherwise batches stay sequential.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Force a flush after the last batch so just-inserted records are
    /// immediately visible to subsequent queries.
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    /// The configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert all records through the adapter in bounded batches.
    pub fn insert_all(
        &self,
        adapter: &dyn BackendAdapter,
        index: &IndexHandle,
        records: &[Record],
    ) -> Result<InsertReport> {
        if records.is_empty() {
            return Ok(InsertReport {
                ids: Vec::new(),
                batches: 0,
            });
        }

        // Dimension mismatches are never retried; validate everything
        // before the first batch goes out so the index stays unchanged.
        if let Some(expected) = index.dimension {
            for record in records {
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

        let batches: Vec<&[Record]> = records.chunks(self.batch_size).collect();
        let report = if self.parallel && adapter.supports_concurrent_writes() {
            self.insert_parallel(adapter, index, &batches)?
        } else {
            self.insert_sequential(adapter, index, &batches)?
        };

        if self.flush {
            adapter.flush(index)?;
        }
        debug!(
            index = %index.name,
            records = report.ids.len(),
            batches = report.batches,
            "insert complete"
        );
        Ok(report)
    }

    fn insert_sequential(
        &self,
        adapter: &dyn BackendAdapter,
        index: &IndexHandle,
        batches: &[&[Record]],
    ) -> Result<InsertReport> {
        let mut ids = Vec::new();
        let mut committed = 0usize;
        for (batch_index, batch) in batches.iter().enumerate() {
            match self.insert_with_retry(adapter, index, batch) {
                Ok(batch_ids) => {
                    committed += batch.len();
                    ids.extend(batch_ids);
                }
                Err(e) => {
                    return Err(XystonError::batch_insert(batch_index, committed, e));
                }
            }
        }
        Ok(InsertReport {
            ids,
            batches: batches.len(),
        })
    }

    fn insert_parallel(
        &self,
        adapter: &dyn BackendAdapter,
        index: &IndexHandle,
        batches: &[&[Record]],
    ) -> Result<InsertReport> {
        let outcomes: Vec<(usize, Result<Vec<String>>)> = batches
            .par_iter()
            .enumerate()
            .map(|(batch_index, batch)| {
                (batch_index, self.insert_with_retry(adapter, index, batch))
            })
            .collect();

        // Committed counts every batch that actually landed; the reported
        // failure is the lowest failed batch so resume semantics match the
        // sequential path.
        let committed: usize = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(batch_index, _)| batches[*batch_index].len())
            .sum();
        let mut ids = Vec::new();
        let mut failure: Option<(usize, XystonError)> = None;
        for (batch_index, outcome) in outcomes {
            match outcome {
                Ok(batch_ids) => ids.extend(batch_ids),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some((batch_index, e));
                    }
                }
            }
        }
        match failure {
            Some((batch_index, e)) => Err(XystonError::batch_insert(batch_index, committed, e)),
            None => Ok(InsertReport {
                ids,
                batches: batches.len(),
            }),
        }
    }

    fn insert_with_retry(
        &self,
        adapter: &dyn BackendAdapter,
        index: &IndexHandle,
        batch: &[Record],
    ) -> Result<Vec<String>> {
        let mut attempt = 0u32;
        loop {
            match adapter.insert(index, batch) {
                Ok(ids) => return Ok(ids),
                // Insert is keyed by record id, so retrying after a timeout
                // with an unknown outcome is safe.
                Err(e @ (XystonError::Backend(_) | XystonError::BackendTimeout(_)))
                    if attempt < self.retries =>
                {
                    attempt += 1;
                    warn!(
                        index = %index.name,
                        attempt,
                        error = %e,
                        "retrying failed insert batch"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{SearchRequest, SearchResponse};
    use crate::collection::IndexSpec;
    use crate::scoring::DenseScoreKind;
    use crate::strategy::IndexCapability;

    /// Delegating adapter that fails a chosen insert call a chosen number
    /// of times.
    #[derive(Debug)]
    struct FlakyBackend {
        inner: MemoryBackend,
        insert_calls: AtomicUsize,
        fail_on_call: usize,
        failures_left: AtomicUsize,
    }

    impl FlakyBackend {
        fn new(inner: MemoryBackend, fail_on_call: usize, failures: usize) -> Self {
            Self {
                inner,
                insert_calls: AtomicUsize::new(0),
                fail_on_call,
                failures_left: AtomicUsize::new(failures),
            }
        }
    }

    impl BackendAdapter for FlakyBackend {
        fn capability(&self) -> IndexCapability {
            self.inner.capability()
        }

        fn dense_score_kind(&self) -> DenseScoreKind {
            self.inner.dense_score_kind()
        }

        fn list_indexes(&self) -> Result<Vec<String>> {
            self.inner.list_indexes()
        }

        fn create_index(&self, spec: &IndexSpec) -> Result<()> {
            self.inner.create_index(spec)
        }

        fn drop_index(&self, name: &str) -> Result<()> {
            self.inner.drop_index(name)
        }

        fn load_index(&self, name: &str) -> Result<()> {
            self.inner.load_index(name)
        }

        fn insert(&self, index: &IndexHandle, batch: &[Record]) -> Result<Vec<String>> {
            let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_on_call
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        left.checked_sub(1)
                    })
                    .is_ok()
            {
                return Err(XystonError::backend("injected failure"));
            }
            self.inner.insert(index, batch)
        }

        fn delete(&self, index: &IndexHandle, doc_id: &str) -> Result<()> {
            self.inner.delete(index, doc_id)
        }

        fn search(&self, index: &IndexHandle, request: &SearchRequest) -> Result<SearchResponse> {
            self.inner.search(index, request)
        }

        fn flush(&self, index: &IndexHandle) -> Result<()> {
            self.inner.flush(index)
        }
    }

    fn ready(backend: &dyn BackendAdapter, spec: &IndexSpec) -> IndexHandle {
        backend.create_index(spec).unwrap();
        backend.load_index(&spec.name).unwrap();
        IndexHandle::new(&spec.name, spec.capability, spec.dimension)
    }

    fn sample_records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                Record::new(format!("r{i}"), format!("text {i}"))
                    .with_doc_id("doc")
                    .with_embedding(vec![1.0, 0.0])
            })
            .collect()
    }

    #[test]
    fn test_partitioning_preserves_order_and_count() {
        let backend = MemoryBackend::dense_only();
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let writer = BatchWriter::new().with_batch_size(100);
        let report = writer
            .insert_all(&backend, &handle, &sample_records(250))
            .unwrap();

        // ceil(250 / 100) = 3 batches of 100, 100, 50.
        assert_eq!(report.batches, 3);
        assert_eq!(report.ids.len(), 250);
        assert_eq!(report.ids[0], "r0");
        assert_eq!(report.ids[249], "r249");
        assert_eq!(backend.record_count("idx"), 250);
    }

    #[test]
    fn test_failed_batch_reports_committed_count() {
        let backend = FlakyBackend::new(MemoryBackend::dense_only(), 1, usize::MAX);
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let writer = BatchWriter::new().with_batch_size(100).with_retries(0);
        let err = writer
            .insert_all(&backend, &handle, &sample_records(250))
            .unwrap_err();

        match err {
            XystonError::BatchInsert {
                batch_index,
                committed,
                ..
            } => {
                assert_eq!(batch_index, 1);
                assert_eq!(committed, 100);
            }
            other => panic!("expected BatchInsert, got {other}"),
        }
        // The first batch stays committed.
        assert_eq!(backend.inner.record_count("idx"), 100);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        // Second insert call fails once, then succeeds on retry.
        let backend = FlakyBackend::new(MemoryBackend::dense_only(), 1, 1);
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let writer = BatchWriter::new().with_batch_size(100).with_retries(3);
        let report = writer
            .insert_all(&backend, &handle, &sample_records(250))
            .unwrap();
        assert_eq!(report.ids.len(), 250);
        assert_eq!(backend.inner.record_count("idx"), 250);
    }

    #[test]
    fn test_dimension_mismatch_fails_before_any_write() {
        let backend = MemoryBackend::dense_only();
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let mut records = sample_records(150);
        records.push(Record::new("bad", "x").with_embedding(vec![1.0, 0.0, 0.0]));

        let writer = BatchWriter::new().with_batch_size(100);
        let err = writer.insert_all(&backend, &handle, &records).unwrap_err();
        assert!(matches!(err, XystonError::DimensionMismatch { .. }));
        assert_eq!(backend.record_count("idx"), 0);
    }

    #[test]
    fn test_parallel_insert_commits_everything() {
        let backend = MemoryBackend::dense_only();
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let writer = BatchWriter::new()
            .with_batch_size(32)
            .with_parallel(true)
            .with_flush(true);
        let report = writer
            .insert_all(&backend, &handle, &sample_records(100))
            .unwrap();
        assert_eq!(report.batches, 4);
        assert_eq!(backend.record_count("idx"), 100);
    }

    #[test]
    fn test_empty_insert_is_a_noop() {
        let backend = MemoryBackend::dense_only();
        let spec = IndexSpec::dense("idx", 2);
        let handle = ready(&backend, &spec);

        let report = BatchWriter::new().insert_all(&backend, &handle, &[]).unwrap();
        assert_eq!(report.batches, 0);
        assert!(report.ids.is_empty());
    }
}
