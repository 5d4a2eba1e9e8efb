//! Search backend trait.
//!
//! This module defines the `SearchBackend` trait that every search engine
//! adapter must satisfy.
//!
//! # Backends
//!
//! - [`InMemoryBackend`](crate::InMemoryBackend): evaluates requests over a
//!   JSON corpus held in memory
//! - `HttpBackend` (in `facetry-client`): posts requests to an
//!   Elasticsearch-compatible endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use facetry_query::{InMemoryBackend, QueryBuilder, SearchBackend};
//!
//! let backend = InMemoryBackend::load("corpus.json")?;
//! let request = builder.build("Abraham", &state, 0)?;
//! let response = backend.search(request).await?;
//! println!("Found {} hits", response.hits.total.value);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use facetry_core::Result;

use crate::request::SearchRequest;
use crate::response::SearchResponse;

/// Abstract search backend.
///
/// # Async
///
/// `search` is the only suspension point in a query's life. Callers may drop
/// the returned future at any time to abandon the request, so
/// implementations must not leave shared state half-updated across an
/// `.await`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Executes one request.
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;

    /// Get the backend name for diagnostics.
    fn name(&self) -> &str;

    /// Check if the backend is ready to handle queries.
    fn is_ready(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        (**self).search(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::TotalHits;

    struct FixedBackend;

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
            let mut response = SearchResponse::default();
            response.hits.total = TotalHits::exact(request.size as u64);
            Ok(response)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_arc_backend_delegates() {
        let backend: Arc<dyn SearchBackend> = Arc::new(FixedBackend);
        assert_eq!(backend.name(), "fixed");
        assert!(backend.is_ready());

        let state = facetry_core::SearchState::for_type(facetry_core::ResultType::Documents);
        let request = crate::QueryBuilder::default().build("x", &state, 0).unwrap();
        let response = backend.search(request).await.unwrap();
        assert_eq!(response.hits.total.value, 50);
    }

    #[test]
    fn test_backend_trait_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn SearchBackend>();
    }
}
