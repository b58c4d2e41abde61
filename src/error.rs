//! Error types for abtrack
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Tracking entry points never surface these to the page; they are logged and
//! reported through typed outcomes. Setup and reporting calls return them.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// abtrack error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment definition violates the weight/allocation invariants
    #[error("Invalid experiment '{id}': {reason}")]
    InvalidExperiment {
        /// Offending experiment id (may be empty)
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Caller-supplied argument was out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Key-value backend failure (quota exceeded, unreadable directory, ...)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Collector could not be reached or rejected the request
    #[error("Transport error: {0}\nQueued events are kept for retry")]
    Transport(String),

    /// No tokio runtime available for background work
    #[error("No async runtime: {0}\nCall this from inside a tokio runtime")]
    NoRuntime(String),

    /// HTTP client error
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Network and storage hiccups are transient; malformed definitions are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::StorageError(_) | Self::Io(_) => true,
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            _ => false,
        }
    }

    pub(crate) fn invalid_experiment(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExperiment {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
