//! Prometheus-backed transfer counters and snapshot helpers.
//!
//! # Design
//! - Collectors live in a private registry owned by the command invocation.
//! - Workers only ever increment counters; aggregation happens at read time.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Kind of work a pooled job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Build an archive and upload it.
    Archive,
    /// Download an archive and unpack it.
    Extract,
    /// Fetch one segment of a large object into place.
    Segment,
    /// Download a whole object.
    Download,
    /// Delete an object and its segments.
    Delete,
    /// Scan an object body for a pattern.
    Search,
}

impl JobKind {
    const ALL: [Self; 6] = [
        Self::Archive,
        Self::Extract,
        Self::Segment,
        Self::Download,
        Self::Delete,
        Self::Search,
    ];

    const fn as_label(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Extract => "extract",
            Self::Segment => "segment",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::Search => "search",
        }
    }
}

/// Terminal state of a pooled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job ran to completion.
    Completed,
    /// The job failed; siblings were unaffected.
    Failed,
}

impl JobStatus {
    const fn as_label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Direction of a byte transfer relative to the local filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes sent to the object store.
    Upload,
    /// Bytes fetched from the object store.
    Download,
}

impl Direction {
    const fn as_label(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// Metrics registry shared by the workers of one command invocation.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    jobs_total: IntCounterVec,
    bytes_total: IntCounterVec,
    walk_errors_total: IntCounter,
}

/// Point-in-time summary used for end-of-run reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs that finished successfully.
    pub jobs_completed: u64,
    /// Jobs that failed.
    pub jobs_failed: u64,
    /// Bytes uploaded to the object store.
    pub bytes_uploaded: u64,
    /// Bytes downloaded from the object store.
    pub bytes_downloaded: u64,
    /// Directories skipped because they could not be listed.
    pub walk_errors: u64,
}

impl MetricsSnapshot {
    /// Total bytes moved in either direction.
    #[must_use]
    pub const fn bytes_transferred(&self) -> u64 {
        self.bytes_uploaded.saturating_add(self.bytes_downloaded)
    }
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("swc_jobs_total", "Pooled jobs by kind and terminal status"),
            &["kind", "status"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "swc_jobs_total",
            source,
        })?;
        let bytes_total = IntCounterVec::new(
            Opts::new("swc_bytes_total", "Bytes transferred by direction"),
            &["direction"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "swc_bytes_total",
            source,
        })?;
        let walk_errors_total = IntCounter::with_opts(Opts::new(
            "swc_walk_errors_total",
            "Directories skipped because listing failed",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "swc_walk_errors_total",
            source,
        })?;

        registry
            .register(Box::new(jobs_total.clone()))
            .map_err(|source| TelemetryError::MetricsRegister {
                name: "swc_jobs_total",
                source,
            })?;
        registry
            .register(Box::new(bytes_total.clone()))
            .map_err(|source| TelemetryError::MetricsRegister {
                name: "swc_bytes_total",
                source,
            })?;
        registry
            .register(Box::new(walk_errors_total.clone()))
            .map_err(|source| TelemetryError::MetricsRegister {
                name: "swc_walk_errors_total",
                source,
            })?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                jobs_total,
                bytes_total,
                walk_errors_total,
            }),
        })
    }

    /// Record a job reaching a terminal state.
    pub fn record_job(&self, kind: JobKind, status: JobStatus) {
        self.inner
            .jobs_total
            .with_label_values(&[kind.as_label(), status.as_label()])
            .inc();
    }

    /// Record bytes moved in the given direction.
    pub fn add_bytes(&self, direction: Direction, bytes: u64) {
        self.inner
            .bytes_total
            .with_label_values(&[direction.as_label()])
            .inc_by(bytes);
    }

    /// Record a directory that was skipped during the walk.
    pub fn inc_walk_error(&self) {
        self.inner.walk_errors_total.inc();
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or the encoded buffer
    /// is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a snapshot summed across job kinds.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let jobs = |status: JobStatus| -> u64 {
            JobKind::ALL
                .iter()
                .map(|kind| {
                    self.inner
                        .jobs_total
                        .with_label_values(&[kind.as_label(), status.as_label()])
                        .get()
                })
                .sum()
        };
        let bytes = |direction: Direction| -> u64 {
            self.inner
                .bytes_total
                .with_label_values(&[direction.as_label()])
                .get()
        };

        MetricsSnapshot {
            jobs_completed: jobs(JobStatus::Completed),
            jobs_failed: jobs(JobStatus::Failed),
            bytes_uploaded: bytes(Direction::Upload),
            bytes_downloaded: bytes(Direction::Download),
            walk_errors: self.inner.walk_errors_total.get(),
        }
    }
}
