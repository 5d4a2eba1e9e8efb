//! Immutable per-result-type search configuration.
//!
//! A [`SearchState`] is never mutated in place. Every transition
//! ([`update`](SearchState::update), [`toggle_filter`](SearchState::toggle_filter),
//! [`with_sort`](SearchState::with_sort), ...) returns a new value, and
//! callers compare old and new with [`SearchState::requires_requery`] to
//! decide whether the backend needs to be asked again.
//!
//! The available filter forest is shared behind an [`Arc`]: transitions that
//! do not touch the trees are cheap clones.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::facet::{FacetType, ResultType, SortType};
use crate::filter::FilterForest;

/// Fields of a [`SearchState`] that [`SearchState::is_equal`] can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    ResultType,
    AppliedFilters,
    AppliedFilterFacetTypes,
    AvailableFilters,
    FiltersValid,
    OrphanFilters,
    ExactField,
    BroadField,
    ActiveField,
    SortType,
    LastAppliedFacetType,
}

impl StateField {
    /// Every field.
    pub const ALL: [StateField; 11] = [
        StateField::ResultType,
        StateField::AppliedFilters,
        StateField::AppliedFilterFacetTypes,
        StateField::AvailableFilters,
        StateField::FiltersValid,
        StateField::OrphanFilters,
        StateField::ExactField,
        StateField::BroadField,
        StateField::ActiveField,
        StateField::SortType,
        StateField::LastAppliedFacetType,
    ];

    /// Fields whose change alters the backend request.
    pub const QUERY: [StateField; 4] = [
        StateField::AppliedFilters,
        StateField::AppliedFilterFacetTypes,
        StateField::ActiveField,
        StateField::SortType,
    ];
}

/// A partial set of changes for [`SearchState::update`].
///
/// `None` leaves the field as it was.
#[derive(Debug, Clone, Default)]
pub struct SearchStateUpdate {
    /// Replacement applied filters as `(key, facet)` pairs.
    pub applied: Option<Vec<(String, FacetType)>>,
    /// Replacement filter trees.
    pub available_filters: Option<FilterForest>,
    /// Facet types `available_filters` was rebuilt for. When set, trees of
    /// other facet types are kept from the previous state.
    pub aggregations_to_update: Option<Vec<FacetType>>,
    pub filters_valid: Option<bool>,
    pub exact_field: Option<String>,
    pub broad_field: Option<String>,
    pub active_field: Option<String>,
    pub sort_type: Option<SortType>,
    pub last_applied_facet_type: Option<Option<FacetType>>,
}

/// Search configuration for one result type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    result_type: ResultType,
    applied_filters: Vec<String>,
    applied_filter_facet_types: Vec<FacetType>,
    available_filters: Arc<FilterForest>,
    filters_valid: bool,
    orphan_filters: Vec<String>,
    exact_field: String,
    broad_field: String,
    active_field: String,
    sort_type: SortType,
    last_applied_facet_type: Option<FacetType>,
}

impl SearchState {
    /// Creates a fresh state matching against the broad field.
    pub fn new(
        result_type: ResultType,
        exact_field: impl Into<String>,
        broad_field: impl Into<String>,
        sort_type: SortType,
    ) -> Self {
        let broad_field = broad_field.into();
        Self {
            result_type,
            applied_filters: Vec::new(),
            applied_filter_facet_types: Vec::new(),
            available_filters: Arc::new(FilterForest::new()),
            filters_valid: false,
            orphan_filters: Vec::new(),
            exact_field: exact_field.into(),
            active_field: broad_field.clone(),
            broad_field,
            sort_type,
            last_applied_facet_type: None,
        }
    }

    /// Creates a fresh state with the built-in field names and sort.
    pub fn for_type(result_type: ResultType) -> Self {
        let (exact, broad) = result_type.default_fields();
        Self::new(result_type, exact, broad, result_type.default_sort())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    pub fn applied_filters(&self) -> &[String] {
        &self.applied_filters
    }

    pub fn applied_filter_facet_types(&self) -> &[FacetType] {
        &self.applied_filter_facet_types
    }

    /// Applied filters as `(key, facet)` pairs.
    pub fn applied_pairs(&self) -> Vec<(String, FacetType)> {
        self.applied_filters
            .iter()
            .cloned()
            .zip(self.applied_filter_facet_types.iter().copied())
            .collect()
    }

    /// Applied keys of one facet type.
    pub fn applied_for(&self, facet: FacetType) -> Vec<&str> {
        self.applied_filters
            .iter()
            .zip(&self.applied_filter_facet_types)
            .filter(|(_, f)| **f == facet)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Distinct facet types with at least one applied filter, in order of
    /// first appearance.
    pub fn applied_facet_types(&self) -> Vec<FacetType> {
        let mut facets = Vec::new();
        for facet in &self.applied_filter_facet_types {
            if !facets.contains(facet) {
                facets.push(*facet);
            }
        }
        facets
    }

    pub fn available_filters(&self) -> &FilterForest {
        &self.available_filters
    }

    /// True once counts for the current query have been registered.
    pub fn filters_valid(&self) -> bool {
        self.filters_valid
    }

    /// Applied keys that do not resolve in the current trees.
    pub fn orphan_filters(&self) -> &[String] {
        &self.orphan_filters
    }

    pub fn exact_field(&self) -> &str {
        &self.exact_field
    }

    pub fn broad_field(&self) -> &str {
        &self.broad_field
    }

    pub fn active_field(&self) -> &str {
        &self.active_field
    }

    /// True when matching against the exact field.
    pub fn is_exact(&self) -> bool {
        self.active_field == self.exact_field
    }

    pub fn sort_type(&self) -> SortType {
        self.sort_type
    }

    /// Facet type of the user's most recent toggle.
    pub fn last_applied_facet_type(&self) -> Option<FacetType> {
        self.last_applied_facet_type
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Returns a new state with `update` merged in.
    ///
    /// When only applied filters change, selections in the existing trees
    /// are replayed to match them. Applied filters are de-duplicated and
    /// orphans recomputed either way.
    pub fn update(&self, update: SearchStateUpdate) -> SearchState {
        let mut next = self.clone();
        let applied_changed = update.applied.is_some();
        if let Some(applied) = update.applied {
            next.set_applied(applied);
        }

        if let Some(forest) = update.available_filters {
            let forest = match &update.aggregations_to_update {
                Some(refreshed) => {
                    FilterForest::merged(&forest, &self.available_filters, refreshed)
                }
                None => forest,
            };
            next.available_filters = Arc::new(forest);
        } else if applied_changed {
            next.replay_selection();
        }

        if let Some(valid) = update.filters_valid {
            next.filters_valid = valid;
        }
        if let Some(field) = update.exact_field {
            next.exact_field = field;
        }
        if let Some(field) = update.broad_field {
            next.broad_field = field;
        }
        if let Some(field) = update.active_field {
            next.active_field = field;
        }
        if let Some(sort) = update.sort_type {
            next.sort_type = sort;
        }
        if let Some(last) = update.last_applied_facet_type {
            next.last_applied_facet_type = last;
        }

        next.recompute_orphans();
        next
    }

    /// Toggles the filter `(facet, key)`.
    ///
    /// Keys in the trees are toggled there and the applied list is re-read
    /// from the trees; pending orphans stay applied. Toggling an orphan
    /// removes it. The toggled facet becomes the last applied facet type.
    pub fn toggle_filter(&self, facet: FacetType, key: &str) -> Result<SearchState> {
        let mut next = self.clone();
        next.last_applied_facet_type = Some(facet);

        let Some(id) = self.available_filters.find(facet, key) else {
            let applied = self.applied_pairs();
            if !applied.iter().any(|(k, f)| k == key && *f == facet) {
                return Err(Error::UnknownFilter {
                    facet: facet.name().to_string(),
                    key: key.to_string(),
                });
            }
            log::debug!("removing orphan {} filter '{}'", facet, key);
            next.set_applied(
                applied
                    .into_iter()
                    .filter(|(k, f)| !(k == key && *f == facet))
                    .collect(),
            );
            next.recompute_orphans();
            return Ok(next);
        };

        let mut forest = (*self.available_filters).clone();
        forest.toggle(id);
        let mut applied = forest.applied_filters();
        applied.extend(
            self.applied_pairs()
                .into_iter()
                .filter(|(k, f)| !forest.contains(*f, k)),
        );

        next.set_applied(applied);
        next.available_filters = Arc::new(forest);
        next.recompute_orphans();
        Ok(next)
    }

    /// Removes every orphan from the applied filters.
    pub fn drop_orphans(&self) -> SearchState {
        if self.orphan_filters.is_empty() {
            return self.clone();
        }
        let forest = &self.available_filters;
        let kept = self
            .applied_pairs()
            .into_iter()
            .filter(|(k, f)| forest.contains(*f, k))
            .collect();
        let mut next = self.clone();
        next.set_applied(kept);
        next.recompute_orphans();
        next
    }

    /// State for a new free-text query.
    ///
    /// The trees are discarded and counts become invalid; applied filters
    /// are kept and stay pending as orphans until the new trees arrive.
    pub fn for_new_query(&self) -> SearchState {
        let mut next = self.clone();
        next.available_filters = Arc::new(FilterForest::new());
        next.filters_valid = false;
        next.last_applied_facet_type = None;
        next.recompute_orphans();
        next
    }

    /// Switches between the exact and broad field.
    pub fn with_exact(&self, exact: bool) -> SearchState {
        let mut next = self.clone();
        next.active_field = if exact {
            self.exact_field.clone()
        } else {
            self.broad_field.clone()
        };
        next
    }

    /// Changes the sort.
    pub fn with_sort(&self, sort_type: SortType) -> SearchState {
        let mut next = self.clone();
        next.sort_type = sort_type;
        next
    }

    fn set_applied(&mut self, applied: Vec<(String, FacetType)>) {
        let mut seen: Vec<(String, FacetType)> = Vec::with_capacity(applied.len());
        for pair in applied {
            if !seen.contains(&pair) {
                seen.push(pair);
            }
        }
        let (keys, facets) = seen.into_iter().unzip();
        self.applied_filters = keys;
        self.applied_filter_facet_types = facets;
    }

    fn replay_selection(&mut self) {
        if self.available_filters.is_empty() {
            return;
        }
        let mut forest = (*self.available_filters).clone();
        let roots = forest.roots().to_vec();
        for root in roots {
            forest.set_unselected(root, true);
        }
        for (key, facet) in self.applied_pairs() {
            if let Some(id) = forest.find(facet, &key) {
                forest.set_selected(id, true);
            }
        }
        self.available_filters = Arc::new(forest);
    }

    fn recompute_orphans(&mut self) {
        let forest = &self.available_filters;
        self.orphan_filters = self
            .applied_filters
            .iter()
            .zip(&self.applied_filter_facet_types)
            .filter(|(key, facet)| !forest.contains(**facet, key))
            .map(|(key, _)| key.clone())
            .collect();
    }

    // ------------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------------

    /// Compares only the listed fields.
    pub fn is_equal(&self, other: &SearchState, fields: &[StateField]) -> bool {
        fields.iter().all(|field| match field {
            StateField::ResultType => self.result_type == other.result_type,
            StateField::AppliedFilters => self.applied_filters == other.applied_filters,
            StateField::AppliedFilterFacetTypes => {
                self.applied_filter_facet_types == other.applied_filter_facet_types
            }
            StateField::AvailableFilters => {
                Arc::ptr_eq(&self.available_filters, &other.available_filters)
                    || self.available_filters == other.available_filters
            }
            StateField::FiltersValid => self.filters_valid == other.filters_valid,
            StateField::OrphanFilters => self.orphan_filters == other.orphan_filters,
            StateField::ExactField => self.exact_field == other.exact_field,
            StateField::BroadField => self.broad_field == other.broad_field,
            StateField::ActiveField => self.active_field == other.active_field,
            StateField::SortType => self.sort_type == other.sort_type,
            StateField::LastAppliedFacetType => {
                self.last_applied_facet_type == other.last_applied_facet_type
            }
        })
    }

    /// Whether moving from `self` to `next` needs a new backend request.
    ///
    /// True when the applied filters, matched field or sort differ, or when
    /// counts just became valid (or invalid) while filters are applied.
    pub fn requires_requery(&self, next: &SearchState) -> bool {
        !self.is_equal(next, &StateField::QUERY)
            || (self.filters_valid != next.filters_valid && !next.applied_filters.is_empty())
    }

    // ------------------------------------------------------------------------
    // URL fragments
    // ------------------------------------------------------------------------

    /// Serializes applied filters, exactness and sort as URL parameters.
    ///
    /// Produces `&{prefix}{facet}Filters=k1|k2` per facet type with applied
    /// filters, then `&{prefix}var=0|1` (1 when matching the broad field)
    /// and `&{prefix}sort={sort}`. Keys are percent-encoded.
    pub fn make_url_fragment(&self, prefix: &str) -> String {
        let mut fragment = String::new();
        for facet in self.applied_facet_types() {
            let keys: Vec<String> = self
                .applied_for(facet)
                .into_iter()
                .map(|key| urlencoding::encode(key).into_owned())
                .collect();
            fragment.push_str(&format!("&{}{}Filters={}", prefix, facet.name(), keys.join("|")));
        }
        let variants = if self.is_exact() { 0 } else { 1 };
        fragment.push_str(&format!("&{prefix}var={variants}"));
        fragment.push_str(&format!("&{}sort={}", prefix, self.sort_type));
        fragment
    }

    /// Reads parameters produced by [`make_url_fragment`](Self::make_url_fragment).
    ///
    /// Only parameters starting with `prefix` are considered; unrelated ones
    /// are ignored. When any `*Filters` parameter is present it replaces the
    /// applied filters.
    pub fn apply_url_params(&self, prefix: &str, query: &str) -> Result<SearchState> {
        let mut applied: Option<Vec<(String, FacetType)>> = None;
        let mut update = SearchStateUpdate::default();

        for pair in query.trim_start_matches(['?', '&']).split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let Some(param) = name.strip_prefix(prefix) else {
                continue;
            };
            if param == "var" {
                let exact = value == "0";
                update.active_field = Some(if exact {
                    self.exact_field.clone()
                } else {
                    self.broad_field.clone()
                });
            } else if param == "sort" {
                update.sort_type = Some(value.parse()?);
            } else if let Some(facet_name) = param.strip_suffix("Filters") {
                let Ok(facet) = facet_name.parse::<FacetType>() else {
                    continue;
                };
                let entries = applied.get_or_insert_with(Vec::new);
                for encoded in value.split('|').filter(|v| !v.is_empty()) {
                    let key = urlencoding::decode(encoded).map_err(|e| {
                        Error::config(format!("invalid filter '{encoded}' in URL: {e}"))
                    })?;
                    entries.push((key.into_owned(), facet));
                }
            }
        }

        update.applied = applied;
        Ok(self.update(update))
    }
}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other, &StateField::ALL)
    }
}

// ============================================================================
// Tests
// ============================================================================
