//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No usable credential set was found.
    #[error("object store credentials are not configured")]
    MissingCredentials,
    /// A credential value could not be used.
    #[error("invalid credential value")]
    InvalidCredential {
        /// Variable or flag that carried the value.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A directory argument was not usable.
    #[error("directory is not accessible")]
    Directory {
        /// Directory supplied by the caller.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// A path exists but is not a directory.
    #[error("path is not a directory")]
    NotADirectory {
        /// Path supplied by the caller.
        path: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
