//! Error types for facetry-client

use thiserror::Error;

/// Result type alias for facetry-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in facetry-client
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from facetry-core or a search backend
    #[error("Core error: {0}")]
    Core(#[from] facetry_core::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request was superseded by a newer one of the same result type
    #[error("Request aborted")]
    Aborted,

    /// Client configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error only reports that the request was superseded.
    ///
    /// Aborts are never surfaced to users and never change result state.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
