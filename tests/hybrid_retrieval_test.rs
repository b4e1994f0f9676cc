//! Integration tests for hybrid retrieval and rank fusion.

use std::sync::Arc;

use xyston::backend::memory::MemoryBackend;
use xyston::collection::IndexSpec;
use xyston::error::Result;
use xyston::filter::FilterExpression;
use xyston::query::Query;
use xyston::record::Record;
use xyston::store::VectorStore;
use xyston::strategy::HybridRanker;

fn corpus() -> Vec<Record> {
    vec![
        Record::new("vec-only", "unrelated topic entirely")
            .with_doc_id("d1")
            .with_embedding(vec![1.0, 0.0, 0.0, 0.0])
            .with_metadata("section", "intro"),
        Record::new("both", "vector search with rank fusion")
            .with_doc_id("d1")
            .with_embedding(vec![0.9, 0.3, 0.0, 0.0])
            .with_metadata("section", "body"),
        Record::new("text-only", "rank fusion fusion fusion")
            .with_doc_id("d2")
            .with_embedding(vec![0.0, 0.0, 1.0, 0.0])
            .with_metadata("section", "body"),
    ]
}

fn hybrid_store() -> VectorStore {
    VectorStore::new(
        Arc::new(MemoryBackend::hybrid()),
        IndexSpec::hybrid("fusion", 4),
    )
}

#[test]
fn test_rrf_prefers_records_ranked_by_both_sides() -> Result<()> {
    let store = hybrid_store();
    store.insert(corpus())?;

    // Under the default inner-product metric this query puts "both" at
    // dense rank 1 (0.54 vs 0.3 vs 0.0); with its sparse rank 2 it fuses
    // to 1/61 + 1/62, ahead of "text-only" at 1/63 + 1/61.
    let result = store.query(
        &Query::hybrid("rank fusion", vec![0.3, 0.9, 0.0, 0.0]).with_top_k(3),
    )?;
    assert_eq!(result.best().map(|h| h.id.as_str()), Some("both"));
    Ok(())
}

#[test]
fn test_hybrid_queries_are_deterministic() -> Result<()> {
    let store = hybrid_store();
    store.insert(corpus())?;

    let query = Query::hybrid("rank fusion", vec![0.5, 0.5, 0.5, 0.0]).with_top_k(3);
    let first: Vec<String> = store.query(&query)?.hits.into_iter().map(|h| h.id).collect();
    for _ in 0..5 {
        let again: Vec<String> = store.query(&query)?.hits.into_iter().map(|h| h.id).collect();
        assert_eq!(first, again);
    }
    Ok(())
}

#[test]
fn test_weighted_ranker_extremes_follow_one_side() -> Result<()> {
    let dense_side = hybrid_store().with_ranker(HybridRanker::Weighted {
        dense: 1.0,
        sparse: 0.0,
    });
    dense_side.insert(corpus())?;
    let result = dense_side.query(
        &Query::hybrid("rank fusion", vec![1.0, 0.0, 0.0, 0.0]).with_top_k(1),
    )?;
    // With the sparse side zeroed out the best dense match wins.
    assert_eq!(result.best().map(|h| h.id.as_str()), Some("vec-only"));

    let sparse_side = hybrid_store().with_ranker(HybridRanker::Weighted {
        dense: 0.0,
        sparse: 1.0,
    });
    sparse_side.insert(corpus())?;
    let result = sparse_side.query(
        &Query::hybrid("rank fusion", vec![1.0, 0.0, 0.0, 0.0]).with_top_k(1),
    )?;
    // "fusion" repeats three times in text-only, so it tops the sparse side.
    assert_eq!(result.best().map(|h| h.id.as_str()), Some("text-only"));
    Ok(())
}

#[test]
fn test_hybrid_respects_filters_and_top_k() -> Result<()> {
    let store = hybrid_store();
    store.insert(corpus())?;

    let result = store.query(
        &Query::hybrid("rank fusion", vec![1.0, 0.0, 0.0, 0.0])
            .with_filter(FilterExpression::term("section", "body"))
            .with_top_k(1),
    )?;
    assert_eq!(result.len(), 1);
    assert_ne!(result.best().map(|h| h.id.as_str()), Some("vec-only"));
    Ok(())
}

#[test]
fn test_sparse_mode_matches_term_overlap() -> Result<()> {
    let store = hybrid_store();
    store.insert(corpus())?;

    let result = store.query(&Query::sparse("fusion").with_top_k(3))?;
    assert!(!result.is_empty());
    // Repeated terms carry more weight in the bag embedding.
    assert_eq!(result.best().map(|h| h.id.as_str()), Some("text-only"));
    assert!((result.best().unwrap().score - 1.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_fused_scores_are_finite_and_ordered() -> Result<()> {
    let store = hybrid_store();
    store.insert(corpus())?;

    let result = store.query(
        &Query::hybrid("vector search", vec![0.2, 0.8, 0.1, 0.0]).with_top_k(10),
    )?;
    for pair in result.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &result.hits {
        assert!(hit.score.is_finite());
    }
    Ok(())
}
