//! Error types for object store operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by object store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Authentication did not yield a token and storage URL.
    #[error("object store authentication failed")]
    Authentication {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The container or object does not exist.
    #[error("object store resource not found")]
    NotFound {
        /// Container addressed by the request.
        container: String,
        /// Object addressed by the request, if any.
        object: Option<String>,
    },
    /// The server answered with an unexpected status.
    #[error("object store request was rejected")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// Container addressed by the request.
        container: String,
        /// Object addressed by the request, if any.
        object: Option<String>,
        /// HTTP status code.
        status: u16,
    },
    /// The request could not be sent or the response not read.
    #[error("object store transport failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source transport error.
        source: reqwest::Error,
    },
    /// A response body could not be decoded.
    #[error("object store response was malformed")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Source decoding error.
        source: serde_json::Error,
    },
    /// A request URL or header could not be built.
    #[error("invalid object store request")]
    InvalidRequest {
        /// Operation identifier.
        operation: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Local file access failed.
    #[error("local file operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Whether the error reports a missing container or object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias for object store results.
pub type StoreResult<T> = Result<T, StoreError>;
