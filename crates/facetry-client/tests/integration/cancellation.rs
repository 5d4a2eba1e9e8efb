//! Abort-before-supersede: a superseded request never affects state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use facetry_client::QueryExecutor;
use facetry_core::{ResultType, SearchState};
use facetry_query::{QueryBuilder, TotalHits};
use tokio::sync::oneshot;

use crate::common::{GatedBackend, hit, response, session};

fn by_query() -> Arc<GatedBackend> {
    GatedBackend::gated(|request| {
        let id = format!("{}-hit", request.query);
        Ok(response(vec![hit(&id, "A")], TotalHits::exact(1)))
    })
}

#[tokio::test]
async fn test_superseded_request_reports_abort_only() {
    let backend = by_query();
    let executor = QueryExecutor::new(backend.clone());
    let builder = QueryBuilder::default();
    let state = SearchState::for_type(ResultType::Documents);

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    let (aborted_tx, aborted_rx) = oneshot::channel();
    executor
        .execute_with(
            builder.build("first", &state, 0).unwrap(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            move |e| {
                let _ = aborted_tx.send(e.is_abort());
            },
        )
        .unwrap();
    backend.wait_for_dispatches(1).await;

    let second = executor.execute(builder.build("second", &state, 0).unwrap()).unwrap();
    backend.wait_for_dispatches(2).await;
    backend.release(1);
    let response = second.wait().await.unwrap();
    assert_eq!(response.hits.hits[0].id, "second-hit");

    backend.release(0);
    assert!(aborted_rx.await.unwrap());
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert!(!executor.is_in_flight(ResultType::Documents));
}

#[tokio::test]
async fn test_stale_search_never_applied() {
    let backend = by_query();
    let session = session(backend.clone());

    session.set_query("first");
    let first = session.search(ResultType::Documents);
    let second = async {
        backend.wait_for_dispatches(1).await;
        session.set_query("second");
        let search = session.search(ResultType::Documents);
        let release = async {
            backend.wait_for_dispatches(2).await;
            backend.release(1);
        };
        let (searched, ()) = tokio::join!(search, release);
        searched.unwrap();
        // The first request completes only after the second has been applied.
        backend.release(0);
    };
    let (first, ()) = tokio::join!(first, second);
    first.unwrap();

    let results = session.results(ResultType::Documents);
    assert_eq!(results.entries().len(), 1);
    assert_eq!(results.entries()[0].hit.id, "second-hit");
    assert!(!results.has_error());
    assert_eq!(session.query(), "second");
}

#[tokio::test]
async fn test_result_types_do_not_abort_each_other() {
    let backend = by_query();
    let session = session(backend.clone());
    session.set_query("both");

    let documents = session.search(ResultType::Documents);
    let collections = session.search(ResultType::Collections);
    let release = async {
        backend.wait_for_dispatches(2).await;
        backend.release(0);
        backend.release(1);
    };
    let (documents, collections, ()) = tokio::join!(documents, collections, release);
    documents.unwrap();
    collections.unwrap();

    assert_eq!(session.results(ResultType::Documents).entries().len(), 1);
    assert_eq!(session.results(ResultType::Collections).entries().len(), 1);
    assert_eq!(session.combined_total(), TotalHits::exact(2));
}
