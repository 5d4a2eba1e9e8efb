//! Pagination, error retention and explicit retry.

use facetry_core::ResultType;
use facetry_query::{QueryConfig, TotalHits};

use crate::common::{GatedBackend, hit, response, session_with};

fn five_documents() -> std::sync::Arc<GatedBackend> {
    GatedBackend::new(|request| {
        let hits = (request.from..(request.from + request.size).min(5))
            .map(|i| hit(&format!("d{i}"), "A"))
            .collect();
        Ok(response(hits, TotalHits::exact(5)))
    })
}

fn two_per_page() -> QueryConfig {
    let mut config = QueryConfig::default();
    config.documents.page_size = 2;
    config
}

#[tokio::test]
async fn test_pages_accumulate_until_total() {
    let backend = five_documents();
    let session = session_with(backend.clone(), two_per_page());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();
    session.load_next_page(ResultType::Documents).await.unwrap();
    session.load_next_page(ResultType::Documents).await.unwrap();

    let results = session.results(ResultType::Documents);
    assert_eq!(results.pages_loaded(), 3);
    assert_eq!(results.entries().len(), 5);
    assert!(!results.more_to_load());

    let offsets: Vec<usize> = backend.requests().iter().map(|r| r.from).collect();
    assert_eq!(offsets, vec![0, 2, 4]);
    assert!(backend.requests()[1..].iter().all(|r| r.aggregations_to_fetch.is_empty()));

    session.load_next_page(ResultType::Documents).await.unwrap();
    assert_eq!(backend.dispatch_count(), 3);
}

#[tokio::test]
async fn test_error_keeps_hits_until_retry() {
    let backend = five_documents();
    let session = session_with(backend.clone(), two_per_page());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    backend.set_failing(true);
    session.load_next_page(ResultType::Documents).await.unwrap();
    let results = session.results(ResultType::Documents);
    assert!(results.has_error());
    assert_eq!(results.entries().len(), 2);
    assert_eq!(results.pages_loaded(), 1);
    assert!(!results.can_load_more());

    // Paging stays stopped until an explicit retry.
    let dispatched = backend.dispatch_count();
    session.load_next_page(ResultType::Documents).await.unwrap();
    assert_eq!(backend.dispatch_count(), dispatched);

    backend.set_failing(false);
    session.retry(ResultType::Documents).await.unwrap();
    let results = session.results(ResultType::Documents);
    assert!(!results.has_error());
    assert_eq!(results.entries().len(), 4);
    assert_eq!(results.pages_loaded(), 2);
}

#[tokio::test]
async fn test_failed_first_page_retried_as_search() {
    let backend = five_documents();
    backend.set_failing(true);
    let session = session_with(backend.clone(), two_per_page());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    let results = session.results(ResultType::Documents);
    assert!(results.error().unwrap().contains("internal error"));
    assert!(results.entries().is_empty());
    assert!(!session.state(ResultType::Documents).filters_valid());

    backend.set_failing(false);
    session.retry(ResultType::Documents).await.unwrap();
    let results = session.results(ResultType::Documents);
    assert_eq!(results.entries().len(), 2);
    assert!(session.state(ResultType::Documents).filters_valid());
}
