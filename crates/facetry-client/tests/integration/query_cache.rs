//! Cache idempotence: one dispatch per distinct request.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use facetry_client::{QueryExecutor, QueryCache, SearchSession};
use facetry_core::{
    AggregationBucket, FacetType, FilterTreeBuilder, ResultType, SearchState, SearchStateUpdate,
};
use facetry_query::{QueryBuilder, QueryConfig, TotalHits};

use crate::common::{GatedBackend, catalog_ab, hit, response, session_with};

/// Two hits, one under each of `A` and `B`; one when filtered to `A`.
fn categorized() -> Arc<GatedBackend> {
    GatedBackend::new(|request| {
        let mut page = if request.applied_filters == ["A"] {
            response(vec![hit("a1", "A")], TotalHits::exact(1))
        } else {
            response(vec![hit("a1", "A"), hit("b1", "B")], TotalHits::exact(2))
        };
        if request.aggregations_to_fetch.contains(&FacetType::Path) {
            page = page.with_buckets(
                FacetType::Path,
                vec![AggregationBucket::new("A", 1), AggregationBucket::new("B", 1)],
            );
        }
        Ok(page)
    })
}

fn session_sharing(backend: Arc<GatedBackend>, cache: Arc<QueryCache>) -> SearchSession {
    SearchSession::new(
        QueryExecutor::with_cache(backend, cache),
        QueryBuilder::default(),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    )
}

fn hit_ids(session: &SearchSession) -> Vec<String> {
    session
        .results(ResultType::Documents)
        .entries()
        .iter()
        .map(|entry| entry.hit.id.clone())
        .collect()
}

/// Starts "Abraham" with `key` applied before any counts are known.
fn pending_filter(session: &SearchSession, key: &str) {
    session.set_query("Abraham");
    let pending = session.state(ResultType::Documents).update(SearchStateUpdate {
        applied: Some(vec![(key.to_string(), FacetType::Path)]),
        ..Default::default()
    });
    session.replace_state(pending);
}

#[tokio::test]
async fn test_same_request_dispatched_once() {
    let backend = GatedBackend::new(|_| Ok(response(vec![hit("a1", "A")], TotalHits::exact(1))));
    let executor = QueryExecutor::new(backend.clone());
    let request = QueryBuilder::default()
        .build("Abraham", &SearchState::for_type(ResultType::Documents), 0)
        .unwrap();

    let first = executor.execute(request.clone()).unwrap();
    assert!(!first.is_cached());
    first.wait().await.unwrap();

    let second = executor.execute(request.clone()).unwrap();
    assert!(second.is_cached());
    assert_eq!(second.wait().await.unwrap().hits.total, TotalHits::exact(1));
    assert_eq!(backend.dispatch_count(), 1);
}

#[tokio::test]
async fn test_cached_callback_runs_before_execute_returns() {
    let backend = GatedBackend::new(|_| Ok(response(Vec::new(), TotalHits::exact(7))));
    let executor = QueryExecutor::new(backend.clone());
    let request = QueryBuilder::default()
        .build("Abraham", &SearchState::for_type(ResultType::Collections), 0)
        .unwrap();
    executor.execute(request.clone()).unwrap().wait().await.unwrap();

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    executor
        .execute_with(
            request,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |e| panic!("unexpected error: {e}"),
        )
        .unwrap();

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(backend.dispatch_count(), 1);
}

#[tokio::test]
async fn test_repeated_search_hits_cache() {
    let backend = GatedBackend::new(|_| Ok(response(vec![hit("a1", "A")], TotalHits::exact(1))));
    let session = crate::common::session(backend.clone());

    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();
    let dispatched = backend.dispatch_count();

    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();
    assert_eq!(backend.dispatch_count(), dispatched);
    assert_eq!(session.results(ResultType::Documents).entries().len(), 1);
}

#[tokio::test]
async fn test_restore_from_cache_in_new_session() {
    let backend = GatedBackend::new(|request| {
        let hits = (0..request.size.min(3))
            .map(|i| hit(&format!("d{}", request.from + i), "A"))
            .collect();
        Ok(response(hits, TotalHits::exact(120)))
    });
    let executor = QueryExecutor::new(backend.clone());
    let cache = Arc::clone(executor.cache());
    let first = SearchSession::new(
        executor,
        QueryBuilder::default(),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    );
    first.set_query("Abraham");
    first.search(ResultType::Documents).await.unwrap();
    first.load_next_page(ResultType::Documents).await.unwrap();
    assert_eq!(first.results(ResultType::Documents).pages_loaded(), 2);
    let dispatched = backend.dispatch_count();

    let second = SearchSession::new(
        QueryExecutor::with_cache(backend.clone(), cache),
        QueryBuilder::default(),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    );
    second.set_query("Abraham");
    let restored = second.restore_from_cache(ResultType::Documents).unwrap();

    assert_eq!(restored, 2);
    let results = second.results(ResultType::Documents);
    assert_eq!(results.entries().len(), 6);
    assert!(results.more_to_load());
    assert_eq!(backend.dispatch_count(), dispatched);

    second.search(ResultType::Documents).await.unwrap();
    assert_eq!(second.results(ResultType::Documents).pages_loaded(), 2);
    assert_eq!(backend.dispatch_count(), dispatched);
}

#[tokio::test]
async fn test_restore_registers_counts_and_replays_filtered_pass() {
    let backend = categorized();
    let executor = QueryExecutor::new(backend.clone());
    let cache = Arc::clone(executor.cache());
    let first = SearchSession::new(
        executor,
        QueryBuilder::default(),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    );
    first.set_query("Abraham");
    first.search(ResultType::Documents).await.unwrap();
    first
        .toggle_filter(ResultType::Documents, FacetType::Path, "A")
        .await
        .unwrap();
    assert_eq!(hit_ids(&first), ["a1"]);
    let dispatched = backend.dispatch_count();

    let second = session_sharing(backend.clone(), Arc::clone(&cache));
    pending_filter(&second, "A");
    let restored = second.restore_from_cache(ResultType::Documents).unwrap();

    assert_eq!(restored, 1);
    let state = second.state(ResultType::Documents);
    assert!(state.filters_valid());
    assert!(state.orphan_filters().is_empty());
    assert_eq!(state.applied_filters(), ["A"]);
    let forest = state.available_filters();
    assert_eq!(forest.roots().len(), 2);
    let a = forest.find(FacetType::Path, "A").unwrap();
    assert!(forest.node(a).is_selected());
    assert_eq!(hit_ids(&second), ["a1"]);
    assert_eq!(backend.dispatch_count(), dispatched);
}

#[tokio::test]
async fn test_restore_without_filtered_page_needs_live_search() {
    let backend = categorized();
    let executor = QueryExecutor::new(backend.clone());
    let cache = Arc::clone(executor.cache());
    let first = SearchSession::new(
        executor,
        QueryBuilder::default(),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    );
    first.set_query("Abraham");
    first.search(ResultType::Documents).await.unwrap();

    let second = session_sharing(backend.clone(), cache);
    pending_filter(&second, "B");
    let restored = second.restore_from_cache(ResultType::Documents).unwrap();

    assert_eq!(restored, 0);
    assert!(hit_ids(&second).is_empty());
    assert!(second.state(ResultType::Documents).filters_valid());
}

#[tokio::test]
async fn test_search_again_keeps_cached_pages() {
    let backend = GatedBackend::new(|request| {
        let hits = (0..request.size)
            .map(|i| hit(&format!("d{}", request.from + i), "A"))
            .collect();
        Ok(response(hits, TotalHits::exact(6)))
    });
    let mut config = QueryConfig::default();
    config.documents.page_size = 2;
    let session = session_with(backend.clone(), config);

    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();
    session.load_next_page(ResultType::Documents).await.unwrap();
    session.load_next_page(ResultType::Documents).await.unwrap();
    assert_eq!(session.results(ResultType::Documents).pages_loaded(), 3);
    let dispatched = backend.dispatch_count();

    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    let results = session.results(ResultType::Documents);
    assert_eq!(results.pages_loaded(), 3);
    assert_eq!(results.entries().len(), 6);
    assert!(!results.more_to_load());
    assert_eq!(backend.dispatch_count(), dispatched);
}
