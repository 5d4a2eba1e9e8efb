//! # facetry-client
//!
//! Session layer for Facetry searches.
//!
//! This crate sits between a presentation layer and a search backend:
//! - [`QueryCache`]: session-scoped response cache keyed by request
//! - [`QueryExecutor`]: cancellable dispatch, one live request per result type
//! - [`ResultAggregator`]: cumulative hits, paging, totals and error flags
//! - [`SearchSession`]: the two-phase filter flow tying it all together
//! - [`HttpBackend`]: backend for Elasticsearch-compatible servers
//! - [`ClientConfig`]: TOML configuration and session construction

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod results;
pub mod session;

pub use cache::QueryCache;
pub use config::{BackendConfig, ClientConfig};
pub use error::{Error, Result};
pub use executor::{CancelHandle, QueryExecutor, QueryHandle};
pub use http::HttpBackend;
pub use results::{ResultAggregator, ResultEntry, ResultSet};
pub use session::SearchSession;
