//! Query construction and backend protocol for Facetry.
//!
//! This crate turns a [`SearchState`](facetry_core::SearchState) plus free
//! text into a backend request, and defines the request/response protocol
//! every backend speaks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      facetry-query                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  QueryBuilder (state → SearchRequest, aggregation policy)   │
//! │  QueryConfig / TypeProfile (fields, page sizes, sorts)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SearchRequest / SearchResponse (backend protocol)          │
//! │  dsl::search_body (protocol → Elasticsearch-style JSON)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SearchBackend trait                                        │
//! │  └── InMemoryBackend (JSON corpus, linear scan)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use facetry_core::{ResultType, SearchState};
//! use facetry_query::{InMemoryBackend, QueryBuilder, SearchBackend};
//!
//! let builder = QueryBuilder::default();
//! let state = SearchState::for_type(ResultType::Documents);
//! let request = builder.build("Abraham", &state, 0)?;
//!
//! let backend = InMemoryBackend::load("corpus.json")?;
//! let response = backend.search(request).await?;
//! for hit in response.hits.hits {
//!     println!("{}: {:?}", hit.id, hit.reference());
//! }
//! ```

pub mod backend;
pub mod builder;
pub mod dsl;
pub mod memory;
pub mod request;
pub mod response;
pub mod types;

// Re-exports
pub use backend::SearchBackend;
pub use builder::{QueryBuilder, aggregations_to_fetch, normalize_query};
pub use memory::{InMemoryBackend, MemoryCorpus};
pub use request::{HighlightConfig, SearchRequest, SortDirection, SortField, SortSpec};
pub use response::{AggregationResult, Hit, HitsEnvelope, SearchResponse, TotalHits, TotalRelation};
pub use types::{QueryConfig, SortOption, TypeProfile};
