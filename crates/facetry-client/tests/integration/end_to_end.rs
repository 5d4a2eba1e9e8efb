//! The two-phase flow from a fresh query through a filter selection.

use facetry_core::{AggregationBucket, FacetType, ResultType, SearchStateUpdate, SelectionState};
use facetry_query::{QueryConfig, TotalHits, TotalRelation};

use crate::common::{GatedBackend, hit, response, session, session_with};

fn abraham() -> std::sync::Arc<GatedBackend> {
    GatedBackend::new(|request| {
        let filtered_to_a = request.applied_filters == ["A"];
        let mut page = if filtered_to_a {
            response(vec![hit("a1", "A"), hit("a2", "A")], TotalHits::exact(30))
        } else {
            response(
                vec![hit("a1", "A"), hit("b1", "B"), hit("a2", "A")],
                TotalHits::exact(42),
            )
        };
        if request.aggregations_to_fetch.contains(&FacetType::Path) {
            page = page.with_buckets(
                FacetType::Path,
                vec![AggregationBucket::new("A", 30), AggregationBucket::new("B", 12)],
            );
        }
        Ok(page)
    })
}

#[tokio::test]
async fn test_abraham_select_category() {
    let backend = abraham();
    let session = session(backend.clone());

    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    let state = session.state(ResultType::Documents);
    assert!(state.filters_valid());
    let forest = state.available_filters();
    assert_eq!(forest.roots().len(), 2);
    let a = forest.node(forest.roots()[0]);
    let b = forest.node(forest.roots()[1]);
    assert_eq!((a.aggregation_key(), a.doc_count()), ("A", 30));
    assert_eq!((b.aggregation_key(), b.doc_count()), ("B", 12));
    assert_eq!(a.selection(), SelectionState::Unselected);

    let results = session.results(ResultType::Documents);
    assert_eq!(results.total().value, 42);
    assert_eq!(results.total().relation, TotalRelation::Eq);
    assert_eq!(backend.dispatch_count(), 1);

    session
        .toggle_filter(ResultType::Documents, FacetType::Path, "A")
        .await
        .unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.applied_filters, ["A"]);
    assert_eq!(second.applied_filter_facet_types, [FacetType::Path]);
    assert!(second.aggregations_to_fetch.is_empty());

    let results = session.results(ResultType::Documents);
    assert_eq!(results.total(), TotalHits::exact(30));
    assert!(results.entries().iter().all(|e| e.hit.path() == Some("A")));

    let state = session.state(ResultType::Documents);
    assert_eq!(state.applied_filters(), ["A"]);
    let forest = state.available_filters();
    assert!(forest.node(forest.roots()[0]).is_selected());
    assert_eq!(forest.node(forest.roots()[1]).doc_count(), 12);
}

#[tokio::test]
async fn test_unselect_returns_to_unfiltered_hits() {
    let backend = abraham();
    let session = session(backend.clone());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    session
        .toggle_filter(ResultType::Documents, FacetType::Path, "A")
        .await
        .unwrap();
    session
        .toggle_filter(ResultType::Documents, FacetType::Path, "A")
        .await
        .unwrap();

    assert!(session.state(ResultType::Documents).applied_filters().is_empty());
    assert_eq!(session.results(ResultType::Documents).total(), TotalHits::exact(42));
    let last = backend.requests().pop().unwrap();
    assert!(last.applied_filters.is_empty());
    // A single-dimension type with valid counts never re-fetches them.
    assert!(last.aggregations_to_fetch.is_empty());
}

#[tokio::test]
async fn test_filters_carried_into_new_query() {
    let backend = abraham();
    let session = session(backend.clone());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();
    session
        .toggle_filter(ResultType::Documents, FacetType::Path, "A")
        .await
        .unwrap();

    session.set_query("Abram");
    let pending = session.state(ResultType::Documents);
    assert!(!pending.filters_valid());
    assert_eq!(pending.orphan_filters(), ["A"]);

    session.search(ResultType::Documents).await.unwrap();
    let requests = backend.requests();
    let (counts, filtered) = (&requests[requests.len() - 2], &requests[requests.len() - 1]);
    assert!(counts.applied_filters.is_empty());
    assert_eq!(counts.aggregations_to_fetch, [FacetType::Path]);
    assert_eq!(filtered.applied_filters, ["A"]);

    let state = session.state(ResultType::Documents);
    assert!(state.orphan_filters().is_empty());
    assert_eq!(session.results(ResultType::Documents).total(), TotalHits::exact(30));
}

#[tokio::test]
async fn test_orphan_reported_when_tree_lacks_key() {
    let backend = abraham();
    let session = session(backend.clone());
    session.set_query("Abraham");
    let state = session.state(ResultType::Documents).update(SearchStateUpdate {
        applied: Some(vec![("X/Y".to_string(), FacetType::Path)]),
        ..Default::default()
    });
    session.replace_state(state);
    session.search(ResultType::Documents).await.unwrap();

    let state = session.state(ResultType::Documents);
    assert_eq!(state.orphan_filters(), ["X/Y"]);
    assert!(state.available_filters().find(FacetType::Path, "X/Y").is_none());

    let dropped = state.drop_orphans();
    assert!(dropped.applied_filters().is_empty());
}

#[tokio::test]
async fn test_exact_switch_requeries_without_slop() {
    let backend = abraham();
    let session = session_with(backend.clone(), QueryConfig::default());
    session.set_query("Abraham");
    session.search(ResultType::Documents).await.unwrap();

    session.set_exact(ResultType::Documents, true).await.unwrap();
    let last = backend.requests().pop().unwrap();
    assert!(last.exact);
    assert_eq!(last.field, "exact");
    assert_eq!(last.slop, 0);
    assert_eq!(
        session.state(ResultType::Documents).make_url_fragment("t"),
        "&tvar=0&tsort=relevance"
    );
}
