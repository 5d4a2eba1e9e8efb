//! Search session orchestration.
//!
//! A [`SearchSession`] owns one [`SearchState`] and one [`ResultSet`] per
//! result type and drives the two-phase flow:
//!
//! 1. The first request for a query carries no filters and asks for
//!    aggregations. Its buckets are turned into filter trees and the state's
//!    counts become valid.
//! 2. If filters were applied, that state change calls for a second,
//!    filtered request whose hits replace the first.
//!
//! Every state or result change bumps a revision published on a `watch`
//! channel. Each result type also carries a generation number; a response
//! is applied only if no newer request of its type has started since it was
//! issued.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use facetry_core::{
    AggregationBucket, BuiltFilters, FacetType, FilterTreeBuilder, ResultType, SearchState,
    SearchStateUpdate, SortType,
};
use facetry_query::{QueryBuilder, SearchResponse, TotalHits};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::executor::QueryExecutor;
use crate::results::{ResultAggregator, ResultSet};

/// Upper bound on requests per `search` call.
const MAX_PASSES: usize = 3;

struct Inner {
    query: String,
    states: BTreeMap<ResultType, SearchState>,
    results: ResultAggregator,
    generations: BTreeMap<ResultType, u64>,
}

impl Inner {
    fn state(&self, result_type: ResultType) -> &SearchState {
        &self.states[&result_type]
    }

    fn generation(&self, result_type: ResultType) -> u64 {
        self.generations.get(&result_type).copied().unwrap_or(0)
    }

    fn bump(&mut self, result_type: ResultType) -> u64 {
        let generation = self.generations.entry(result_type).or_insert(0);
        *generation += 1;
        *generation
    }
}

/// One user's search across every result type.
pub struct SearchSession {
    executor: QueryExecutor,
    builder: QueryBuilder,
    tree_builder: FilterTreeBuilder,
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("executor", &self.executor)
            .field("revision", &*self.revision.borrow())
            .finish()
    }
}

impl SearchSession {
    /// Creates a session with an empty query.
    ///
    /// Each result type starts from its configured fields and default sort.
    pub fn new(
        executor: QueryExecutor,
        builder: QueryBuilder,
        tree_builder: FilterTreeBuilder,
    ) -> Self {
        let config = builder.config();
        let states = ResultType::ALL
            .into_iter()
            .map(|rt| {
                let profile = config.profile(rt);
                let state = SearchState::new(
                    rt,
                    profile.exact_field.clone(),
                    profile.broad_field.clone(),
                    rt.default_sort(),
                );
                (rt, state)
            })
            .collect();
        let results = ResultAggregator::new(|rt| config.profile(rt).page_size);
        let (revision, _) = watch::channel(0);

        Self {
            inner: Mutex::new(Inner {
                query: String::new(),
                states,
                results,
                generations: BTreeMap::new(),
            }),
            executor,
            builder,
            tree_builder,
            revision,
        }
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Subscribes to revision changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Current free text.
    pub fn query(&self) -> String {
        self.lock().query.clone()
    }

    /// Snapshot of `result_type`'s state.
    pub fn state(&self, result_type: ResultType) -> SearchState {
        self.lock().state(result_type).clone()
    }

    /// Snapshot of `result_type`'s hits and paging.
    pub fn results(&self, result_type: ResultType) -> ResultSet {
        self.lock().results.get(result_type).clone()
    }

    /// Total hits across all result types.
    pub fn combined_total(&self) -> TotalHits {
        self.lock().results.combined_total()
    }

    /// The executor requests go through.
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Starts a new free-text query.
    ///
    /// In-flight requests are aborted, results cleared and every state reset
    /// for the new query. Nothing is fetched until [`search`](Self::search).
    pub fn set_query(&self, query: &str) {
        {
            let mut inner = self.lock();
            inner.query = query.to_string();
            for rt in ResultType::ALL {
                self.executor.abort(rt);
                inner.bump(rt);
                let next = inner.state(rt).for_new_query();
                inner.states.insert(rt, next);
            }
            inner.results.reset_all();
        }
        log::debug!("new query '{}'", query);
        self.publish();
    }

    /// Replaces the state of `result_type`, e.g. one restored from a URL.
    ///
    /// Returns whether the change calls for a new search.
    pub fn replace_state(&self, state: SearchState) -> bool {
        let requery = {
            let mut inner = self.lock();
            let rt = state.result_type();
            let requery = inner.state(rt).requires_requery(&state);
            inner.states.insert(rt, state);
            requery
        };
        self.publish();
        requery
    }

    /// Toggles a filter and re-searches if the applied filters changed.
    pub async fn toggle_filter(
        &self,
        result_type: ResultType,
        facet: FacetType,
        key: &str,
    ) -> Result<()> {
        let requery = self.transition(result_type, |state| Ok(state.toggle_filter(facet, key)?))?;
        if requery {
            self.search(result_type).await?;
        }
        Ok(())
    }

    /// Changes the sort and re-searches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `sort_type` is not configured for
    /// `result_type`.
    pub async fn set_sort(&self, result_type: ResultType, sort_type: SortType) -> Result<()> {
        if self.builder.config().profile(result_type).sort(sort_type).is_none() {
            return Err(Error::config(format!(
                "sort '{sort_type}' is not available for {result_type}"
            )));
        }
        let requery = self.transition(result_type, |state| Ok(state.with_sort(sort_type)))?;
        if requery {
            self.search(result_type).await?;
        }
        Ok(())
    }

    /// Switches between exact and broad matching and re-searches.
    pub async fn set_exact(&self, result_type: ResultType, exact: bool) -> Result<()> {
        let requery = self.transition(result_type, |state| Ok(state.with_exact(exact)))?;
        if requery {
            self.search(result_type).await?;
        }
        Ok(())
    }

    fn transition<F>(&self, result_type: ResultType, f: F) -> Result<bool>
    where
        F: FnOnce(&SearchState) -> Result<SearchState>,
    {
        let requery = {
            let mut inner = self.lock();
            let current = inner.state(result_type);
            let next = f(current)?;
            let requery = current.requires_requery(&next);
            inner.states.insert(result_type, next);
            requery
        };
        self.publish();
        Ok(requery)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Runs the query for `result_type` from the first page.
    ///
    /// Repeats while registering aggregations changes the state in a way
    /// that needs another request. Backend failures set the result set's
    /// error flag and keep its hits; a superseded request returns quietly.
    ///
    /// # Errors
    ///
    /// Only configuration and serialization problems are returned.
    pub async fn search(&self, result_type: ResultType) -> Result<()> {
        for pass in 1..=MAX_PASSES {
            let (request, generation) = {
                let mut inner = self.lock();
                let request = self.builder.build(&inner.query, inner.state(result_type), 0)?;
                (request, inner.bump(result_type))
            };
            let refreshed = request.aggregations_to_fetch.clone();

            let handle = self.executor.execute(request)?;
            let response = match handle.wait().await {
                Ok(response) => response,
                Err(e) if e.is_abort() => {
                    log::debug!("{} search superseded", result_type);
                    return Ok(());
                }
                Err(e) => {
                    self.fail(result_type, generation, &e);
                    return Ok(());
                }
            };

            let requery = {
                let mut guard = self.lock();
                let inner = &mut *guard;
                if inner.generation(result_type) != generation {
                    log::debug!("dropping stale {} response", result_type);
                    return Ok(());
                }
                let requery = self.apply_first_page(inner, result_type, &response, &refreshed);
                if !requery {
                    self.extend_from_cache(inner, result_type)?;
                }
                requery
            };
            self.publish();

            if !requery {
                return Ok(());
            }
            log::debug!("{} counts registered, re-querying (pass {})", result_type, pass + 1);
        }
        log::warn!("{} search did not settle after {} passes", result_type, MAX_PASSES);
        Ok(())
    }

    /// Loads the next page of `result_type`.
    ///
    /// Does nothing once every hit is loaded or after an error; with no page
    /// loaded yet this is a [`search`](Self::search).
    pub async fn load_next_page(&self, result_type: ResultType) -> Result<()> {
        let next = {
            let mut inner = self.lock();
            let set = inner.results.get(result_type);
            if set.pages_loaded() == 0 && !set.has_error() {
                None
            } else if !set.can_load_more() {
                return Ok(());
            } else {
                let from = set.next_offset();
                let request = self.builder.build(&inner.query, inner.state(result_type), from)?;
                Some((request, inner.bump(result_type)))
            }
        };
        let Some((request, generation)) = next else {
            return self.search(result_type).await;
        };

        let handle = self.executor.execute(request)?;
        match handle.wait().await {
            Ok(response) => {
                {
                    let mut inner = self.lock();
                    if inner.generation(result_type) != generation {
                        log::debug!("dropping stale {} page", result_type);
                        return Ok(());
                    }
                    inner.results.get_mut(result_type).append_page(&response);
                }
                self.publish();
            }
            Err(e) if e.is_abort() => log::debug!("{} page load superseded", result_type),
            Err(e) => self.fail(result_type, generation, &e),
        }
        Ok(())
    }

    /// Clears the error flag and repeats the failed step.
    pub async fn retry(&self, result_type: ResultType) -> Result<()> {
        let pages_loaded = {
            let mut inner = self.lock();
            let set = inner.results.get_mut(result_type);
            set.clear_error();
            set.pages_loaded()
        };
        if pages_loaded == 0 {
            self.search(result_type).await
        } else {
            self.load_next_page(result_type).await
        }
    }

    /// Rebuilds `result_type`'s hits from pages already in the cache.
    ///
    /// Replays the same passes as [`search`](Self::search) against the
    /// cache alone: the first page's aggregations are registered, and if
    /// that calls for the filtered pass its first page must be cached too.
    /// Later pages are then appended while they hit.
    ///
    /// Returns the number of pages restored; zero means a live
    /// [`search`](Self::search) is needed.
    pub fn restore_from_cache(&self, result_type: ResultType) -> Result<usize> {
        let restored = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let mut settled = false;
            for _ in 0..MAX_PASSES {
                let request = self.builder.build(&inner.query, inner.state(result_type), 0)?;
                let Some(response) = self.executor.cache().lookup(&request)? else {
                    break;
                };
                let refreshed = &request.aggregations_to_fetch;
                if !self.apply_first_page(inner, result_type, &response, refreshed) {
                    settled = true;
                    break;
                }
            }
            if settled {
                let pages = 1 + self.extend_from_cache(inner, result_type)?;
                inner.bump(result_type);
                pages
            } else {
                inner.results.get_mut(result_type).reset();
                0
            }
        };
        if restored > 0 {
            log::debug!("restored {} page(s) of {} from cache", restored, result_type);
            self.publish();
        }
        Ok(restored)
    }

    /// Builds filter trees from `aggregations` and registers them.
    ///
    /// Trees of the listed facet types replace the current ones; trees of
    /// other facet types are kept. Counts become valid.
    pub fn register_available_filters(
        &self,
        result_type: ResultType,
        aggregations: &[(FacetType, Vec<AggregationBucket>)],
    ) -> SearchState {
        let refreshed: Vec<FacetType> = aggregations.iter().map(|(facet, _)| *facet).collect();
        let next = {
            let mut inner = self.lock();
            let next = self.registered_state(inner.state(result_type), aggregations, &refreshed);
            inner.states.insert(result_type, next.clone());
            next
        };
        self.publish();
        next
    }

    /// Replaces the hits with a first page and registers its aggregations.
    ///
    /// Returns whether the registered state needs another request.
    fn apply_first_page(
        &self,
        inner: &mut Inner,
        result_type: ResultType,
        response: &SearchResponse,
        refreshed: &[FacetType],
    ) -> bool {
        let set = inner.results.get_mut(result_type);
        set.reset();
        set.append_page(response);
        if refreshed.is_empty() {
            return false;
        }
        let current = inner.state(result_type);
        let aggregations = response.aggregation_list(refreshed);
        let next = self.registered_state(current, &aggregations, refreshed);
        let requery = current.requires_requery(&next);
        inner.states.insert(result_type, next);
        requery
    }

    /// Appends the cached pages that follow those loaded.
    fn extend_from_cache(&self, inner: &mut Inner, result_type: ResultType) -> Result<usize> {
        let query = inner.query.clone();
        let state = inner.state(result_type).clone();
        inner
            .results
            .extend_from_cache(result_type, self.executor.cache(), |from| {
                Ok(self.builder.build(&query, &state, from)?)
            })
    }

    fn registered_state(
        &self,
        state: &SearchState,
        aggregations: &[(FacetType, Vec<AggregationBucket>)],
        refreshed: &[FacetType],
    ) -> SearchState {
        let BuiltFilters { forest, orphans } =
            self.tree_builder.build_all(aggregations, &state.applied_pairs());
        log::debug!(
            "registering {} filters for {:?}: {} nodes, {} orphan(s)",
            state.result_type(),
            refreshed,
            forest.len(),
            orphans.len()
        );
        state.update(SearchStateUpdate {
            available_filters: Some(forest),
            aggregations_to_update: Some(refreshed.to_vec()),
            filters_valid: Some(true),
            ..Default::default()
        })
    }

    fn fail(&self, result_type: ResultType, generation: u64, error: &Error) {
        {
            let mut inner = self.lock();
            if inner.generation(result_type) != generation {
                return;
            }
            log::warn!("{} search failed: {}", result_type, error);
            inner.results.get_mut(result_type).set_error(error.to_string());
        }
        self.publish();
    }

    fn publish(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
