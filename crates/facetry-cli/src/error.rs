//! Error types for facetry-cli

use thiserror::Error;

/// Result type alias for facetry-cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in facetry-cli
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from facetry-core
    #[error("Core error: {0}")]
    Core(#[from] facetry_core::Error),

    /// Error from facetry-client
    #[error("Client error: {0}")]
    Client(#[from] facetry_client::Error),

    /// Output could not be rendered as JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A command-line argument was rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend failed; hits loaded before the failure are kept
    #[error("Search failed: {0}")]
    SearchFailed(String),
}
