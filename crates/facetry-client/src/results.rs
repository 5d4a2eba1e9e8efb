//! Cumulative result sets.
//!
//! A [`ResultSet`] holds the hits of one result type across the pages
//! loaded so far for the current query. Hits are append-only until the
//! next reset. Documents are grouped by logical reference, so all versions
//! of a passage show up as one entry with its other versions attached.

use std::collections::{BTreeMap, HashMap};

use facetry_core::ResultType;
use facetry_query::{Hit, SearchRequest, SearchResponse, TotalHits};
use serde::Serialize;

use crate::cache::QueryCache;
use crate::error::Result;

/// One displayed hit and the other versions folded into it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    /// First hit seen for this reference.
    pub hit: Hit,
    /// Other versions, ordered by version priority.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<Hit>,
}

impl ResultEntry {
    fn new(hit: Hit) -> Self {
        Self {
            hit,
            duplicates: Vec::new(),
        }
    }

    /// Inserts after every duplicate with the same or lower priority.
    fn add_duplicate(&mut self, hit: Hit) {
        let priority = hit.version_priority();
        let at = self
            .duplicates
            .iter()
            .position(|d| d.version_priority() > priority)
            .unwrap_or(self.duplicates.len());
        self.duplicates.insert(at, hit);
    }
}

/// Paging state and hits for one result type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    result_type: ResultType,
    page_size: usize,
    entries: Vec<ResultEntry>,
    #[serde(skip)]
    by_reference: HashMap<String, usize>,
    pages_loaded: usize,
    more_to_load: bool,
    total: TotalHits,
    error: Option<String>,
}

impl ResultSet {
    /// An empty set for `result_type` with pages of `page_size` hits.
    pub fn new(result_type: ResultType, page_size: usize) -> Self {
        Self {
            result_type,
            page_size,
            entries: Vec::new(),
            by_reference: HashMap::new(),
            pages_loaded: 0,
            more_to_load: true,
            total: TotalHits::default(),
            error: None,
        }
    }

    /// Clears hits, paging and the error flag for a new query.
    pub fn reset(&mut self) {
        *self = Self::new(self.result_type, self.page_size);
    }

    /// Result type of the hits.
    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    /// Hits per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Entries in the order their first hit arrived.
    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    /// Number of hits received, duplicates included.
    pub fn hit_count(&self) -> usize {
        self.entries.iter().map(|e| 1 + e.duplicates.len()).sum()
    }

    /// Pages appended since the last reset.
    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    /// False once the loaded pages cover the total.
    pub fn more_to_load(&self) -> bool {
        self.more_to_load
    }

    /// Last server-reported total.
    pub fn total(&self) -> TotalHits {
        self.total
    }

    /// Message of the last failed request, if it has not been cleared.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the last request failed.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Offset of the next page.
    pub fn next_offset(&self) -> usize {
        self.pages_loaded * self.page_size
    }

    /// Whether another page may be requested.
    ///
    /// False after an error until the error is cleared.
    pub fn can_load_more(&self) -> bool {
        self.more_to_load && self.error.is_none()
    }

    /// Appends one page of results.
    pub fn append_page(&mut self, response: &SearchResponse) {
        for hit in &response.hits.hits {
            self.push_hit(hit.clone());
        }
        self.pages_loaded += 1;
        self.total = response.hits.total;
        self.more_to_load = (self.pages_loaded * self.page_size) < self.total.value as usize;
        self.error = None;
    }

    /// Flags a failed request; hits already loaded stay.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clears the error flag so paging may resume.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn push_hit(&mut self, hit: Hit) {
        if !self.result_type.deduplicates_hits() {
            self.entries.push(ResultEntry::new(hit));
            return;
        }
        let Some(reference) = hit.reference().map(str::to_string) else {
            self.entries.push(ResultEntry::new(hit));
            return;
        };
        match self.by_reference.get(&reference) {
            Some(&index) => self.entries[index].add_duplicate(hit),
            None => {
                self.by_reference.insert(reference, self.entries.len());
                self.entries.push(ResultEntry::new(hit));
            }
        }
    }
}

/// Result sets for every result type of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultAggregator {
    sets: BTreeMap<ResultType, ResultSet>,
}

impl ResultAggregator {
    /// Empty result sets, with each type's page size taken from `page_size`.
    pub fn new(page_size: impl Fn(ResultType) -> usize) -> Self {
        let sets = ResultType::ALL
            .into_iter()
            .map(|rt| (rt, ResultSet::new(rt, page_size(rt))))
            .collect();
        Self { sets }
    }

    /// The set for `result_type`.
    pub fn get(&self, result_type: ResultType) -> &ResultSet {
        &self.sets[&result_type]
    }

    /// The set for `result_type`, mutably.
    pub fn get_mut(&mut self, result_type: ResultType) -> &mut ResultSet {
        self.sets
            .entry(result_type)
            .or_insert_with(|| ResultSet::new(result_type, 0))
    }

    /// Resets every set.
    pub fn reset_all(&mut self) {
        self.sets.values_mut().for_each(ResultSet::reset);
    }

    /// Sum of all result types' totals.
    ///
    /// The total is a lower bound if any summand is.
    pub fn combined_total(&self) -> TotalHits {
        self.sets.values().map(ResultSet::total).sum()
    }

    /// Replays pages already in `cache` into an empty set.
    ///
    /// Walks forward from offset 0, asking `request_at` for the request of
    /// each page, and stops at the first miss or once the total is reached.
    /// Returns the number of pages restored.
    pub fn restore_from_cache<F>(
        &mut self,
        result_type: ResultType,
        cache: &QueryCache,
        request_at: F,
    ) -> Result<usize>
    where
        F: Fn(usize) -> Result<SearchRequest>,
    {
        self.get_mut(result_type).reset();
        self.extend_from_cache(result_type, cache, request_at)
    }

    /// Appends cached pages after those already loaded.
    ///
    /// Same walk as [`restore_from_cache`](Self::restore_from_cache), but
    /// starting at the set's next offset. Returns the number of pages
    /// appended.
    pub fn extend_from_cache<F>(
        &mut self,
        result_type: ResultType,
        cache: &QueryCache,
        request_at: F,
    ) -> Result<usize>
    where
        F: Fn(usize) -> Result<SearchRequest>,
    {
        let set = self.get_mut(result_type);
        let before = set.pages_loaded();
        while set.pages_loaded() == 0 || set.more_to_load() {
            let request = request_at(set.next_offset())?;
            let Some(response) = cache.lookup(&request)? else {
                break;
            };
            set.append_page(&response);
        }
        let appended = set.pages_loaded() - before;
        if appended > 0 {
            log::debug!("restored {} cached page(s) of {}", appended, result_type);
        }
        Ok(appended)
    }
}

// ============================================================================
// Tests
// ============================================================================
