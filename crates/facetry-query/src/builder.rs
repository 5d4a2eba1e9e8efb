//! Translates search state into backend requests.
//!
//! The interesting part is deciding which facet aggregations to ask for.
//! Counts are expensive, and a filter change in one facet type changes the
//! counts of the *other* facet types, not its own; so after a toggle only
//! the other dimensions are refreshed. The exception is removing the last
//! filter of a facet type, which can reveal counts that filter was hiding,
//! so that facet type is refreshed too.

use std::sync::Arc;

use facetry_core::{CommentaryRule, Error, FacetType, Result, SearchState};

use crate::request::SearchRequest;
use crate::types::QueryConfig;

/// Typographic double quote used in place of `"` inside words.
pub const GERSHAYIM: char = '\u{05F4}';

/// Builds [`SearchRequest`]s from [`SearchState`]s.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: Arc<QueryConfig>,
    commentary: Option<CommentaryRule>,
}

impl QueryBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(config: Arc<QueryConfig>) -> Self {
        Self {
            config,
            commentary: None,
        }
    }

    /// Expands synthetic commentary filters into both backend paths.
    pub fn with_commentary(mut self, rule: CommentaryRule) -> Self {
        self.commentary = Some(rule);
        self
    }

    /// The configuration requests are built from.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Builds the request for `query` at offset `from`.
    ///
    /// While the state's counts are not yet valid for this query, applied
    /// filters are held back: the first request only gathers counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the state's sort type is not configured
    /// for its result type.
    pub fn build(&self, query: &str, state: &SearchState, from: usize) -> Result<SearchRequest> {
        let result_type = state.result_type();
        let profile = self.config.profile(result_type);
        let sort = profile.sort(state.sort_type()).cloned().ok_or_else(|| {
            Error::config(format!(
                "sort '{}' is not configured for {}",
                state.sort_type(),
                result_type
            ))
        })?;

        let exact = state.active_field() != state.broad_field();
        let (applied_filters, applied_filter_facet_types) = if state.filters_valid() {
            self.expand_filters(state)
        } else {
            (Vec::new(), Vec::new())
        };

        let request = SearchRequest {
            query: normalize_query(query),
            result_type,
            field: state.active_field().to_string(),
            exact,
            slop: if exact { 0 } else { self.config.slop },
            size: profile.page_size,
            from,
            sort,
            applied_filters,
            applied_filter_facet_types,
            aggregations_to_fetch: aggregations_to_fetch(state, from),
            highlight: self.config.highlight.clone(),
        };
        log::debug!(
            "built {} request: from={} filters={:?} aggs={:?}",
            result_type,
            from,
            request.applied_filters,
            request.aggregations_to_fetch
        );
        Ok(request)
    }

    fn expand_filters(&self, state: &SearchState) -> (Vec<String>, Vec<FacetType>) {
        let mut keys = Vec::new();
        let mut facets = Vec::new();
        for (key, facet) in state.applied_pairs() {
            let expanded = match (&self.commentary, facet) {
                (Some(rule), FacetType::Path) => rule.expand(&key),
                _ => vec![key],
            };
            for key in expanded {
                keys.push(key);
                facets.push(facet);
            }
        }
        (keys, facets)
    }
}

/// Facet types whose counts should be (re-)requested.
///
/// Only first pages carry aggregations. A single-dimension result type with
/// valid counts needs none. Otherwise every dimension is requested except
/// the one the user last toggled, unless that toggle removed its last
/// filter.
pub fn aggregations_to_fetch(state: &SearchState, from: usize) -> Vec<FacetType> {
    if from > 0 {
        return Vec::new();
    }
    let dimensions = state.result_type().facet_types();
    if state.filters_valid() && dimensions.len() == 1 {
        return Vec::new();
    }
    let last = state.last_applied_facet_type();
    let just_unapplied = last.is_some_and(|facet| state.applied_for(facet).is_empty());
    dimensions
        .iter()
        .copied()
        .filter(|&facet| just_unapplied || Some(facet) != last)
        .collect()
}

/// Normalizes free text for the backend.
///
/// Surrounding whitespace is trimmed and a `"` between two non-space
/// characters (as in Hebrew abbreviations) becomes [`GERSHAYIM`], so it is
/// not read as phrase syntax.
pub fn normalize_query(query: &str) -> String {
    let chars: Vec<char> = query.trim().chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let inner = c == '"'
                && i > 0
                && i + 1 < chars.len()
                && !chars[i - 1].is_whitespace()
                && !chars[i + 1].is_whitespace();
            if inner { GERSHAYIM } else { c }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
