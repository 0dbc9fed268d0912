//! # Design
//!
//! - Constant messages; context travels in fields so logs stay structured.
//! - Store failures keep the store error as their source.

use std::io;
use std::path::PathBuf;

use swc_store::StoreError;
use thiserror::Error;

/// Result type for archive, transfer and tool operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the swc pipelines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Local filesystem access failed.
    #[error("local io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// An object store request failed.
    #[error("object store request failed")]
    Store {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Object or container addressed by the operation.
        target: String,
        /// Underlying store error.
        source: StoreError,
    },
    /// The archiver exited unsuccessfully.
    #[error("archiver exited unsuccessfully")]
    Archiver {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Archive being created or extracted.
        archive: PathBuf,
        /// Exit code, absent when terminated by a signal.
        status: Option<i32>,
    },
    /// A large object manifest could not be parsed.
    #[error("segment manifest is malformed")]
    Manifest {
        /// Object whose manifest was parsed.
        object: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A manifest entry does not name a usable segment.
    #[error("segment manifest entry is invalid")]
    ManifestEntry {
        /// Position of the entry in the manifest.
        index: usize,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A fetched segment does not have the length its manifest declares.
    #[error("segment length does not match manifest")]
    SegmentLength {
        /// Segment object name.
        segment: String,
        /// Length declared in the manifest.
        expected: u64,
        /// Length actually received.
        actual: u64,
    },
    /// Some segments of a large object could not be written.
    #[error("segmented download incomplete")]
    Incomplete {
        /// Object being reconstructed.
        object: String,
        /// Number of segments that failed.
        failed: usize,
    },
    /// Input validation failures.
    #[error("invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Glob compilation failures.
    #[error("invalid glob pattern")]
    Glob {
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// Regular expression compilation failures.
    #[error("invalid search pattern")]
    Pattern {
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },
    /// A blocking task panicked or was aborted.
    #[error("background task failed")]
    Join {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
    /// The run was interrupted before all jobs finished.
    #[error("run cancelled")]
    Cancelled,
}

impl CoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn store(
        operation: &'static str,
        target: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::Store {
            operation,
            target: target.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason,
            value: Some(value.into()),
        }
    }

    /// Whether the failure is a missing container or object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_not_found())
    }
}
