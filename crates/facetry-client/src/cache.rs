//! Session-scoped response cache.
//!
//! Responses are keyed by [`SearchRequest::cache_key`], the canonical
//! serialization of the request. Entries are never evicted: the cache lives
//! as long as the session that owns it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use facetry_query::{SearchRequest, SearchResponse};

use crate::error::Result;

/// Append-only map from serialized request to response.
///
/// Two identical requests that both miss will both store; the values are
/// equal, so the last writer wins.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, Arc<SearchResponse>>>,
}

impl QueryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a serialized request.
    pub fn get(&self, key: &str) -> Option<Arc<SearchResponse>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Stores the response to a serialized request.
    pub fn put(&self, key: impl Into<String>, response: Arc<SearchResponse>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), response);
    }

    /// Looks up a request.
    pub fn lookup(&self, request: &SearchRequest) -> Result<Option<Arc<SearchResponse>>> {
        Ok(self.get(&request.cache_key()?))
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
