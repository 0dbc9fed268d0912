#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Telemetry primitives shared across the swc workspace.
//!
//! This crate centralises logging setup and the transfer counters so every
//! tool reports progress and end-of-run summaries the same way.
//!
//! Layout: `init.rs` (subscriber installation), `metrics.rs` (Prometheus
//! counters and snapshots), `error.rs` (telemetry errors).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Direction, JobKind, JobStatus, Metrics, MetricsSnapshot};
