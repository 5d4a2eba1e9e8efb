//! Error types for facetry-core

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for facetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by every facetry crate.
///
/// Backend failures, malformed responses and configuration problems are
/// runtime errors. [`Error::Invariant`] is different: it reports a broken
/// filter tree and indicates a programming fault, not a recoverable state.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The search backend rejected or failed a request.
    #[error("Backend error: {message}")]
    Backend {
        /// Human-readable error message
        message: String,
        /// HTTP status (or equivalent) when the backend reported one
        status: Option<u16>,
        /// Underlying transport error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend answered with something that is not a search response.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// I/O error without path context
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error on a specific file
    #[error("I/O error at {}: {source}", path.display())]
    IoWithPath {
        /// File that could not be read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A facet type name that no variant matches.
    #[error("Unknown facet type: {0}")]
    UnknownFacetType(String),

    /// A result type name that no variant matches.
    #[error("Unknown result type: {0}")]
    UnknownResultType(String),

    /// A sort type name that no variant matches.
    #[error("Unknown sort type: {0}")]
    UnknownSortType(String),

    /// A filter key that is neither in the filter tree nor an orphan.
    #[error("Unknown filter '{key}' for facet '{facet}'")]
    UnknownFilter {
        /// Facet type name
        facet: String,
        /// Aggregation key
        key: String,
    },

    /// A filter tree broke one of its structural invariants.
    #[error("Filter tree invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Creates a backend error with a message.
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Error::Backend {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates a backend error carrying the status the backend returned.
    pub fn backend_with_status<S: Into<String>>(status: u16, message: S) -> Self {
        Error::Backend {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Creates a backend error with a message and source error.
    pub fn backend_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend {
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io_with_path(source: io::Error, path: impl AsRef<Path>) -> Self {
        Error::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates an invariant violation.
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Error::Invariant(message.into())
    }

    /// Returns whether this error came from the backend side of a request.
    ///
    /// These are the errors a result set records as a failed search; the
    /// rest are caller or configuration mistakes.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::Backend { .. } | Error::MalformedResponse(_) | Error::Serialization(_)
        )
    }
}
