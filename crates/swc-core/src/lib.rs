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

//! Archive, restore and transfer logic for moving trees between a local
//! filesystem and a Swift object store.
//!
//! Layout:
//! - `classifier.rs`, `unit.rs`: walking a tree into directory units.
//! - `plan.rs`, `codec.rs`: units to archive jobs and object names, and back.
//! - `builder.rs`: the archiver seam (`tar` process or in-process).
//! - `pool.rs`: bounded worker pool shared by every run.
//! - `segments.rs`, `sparse.rs`: parallel reassembly of segmented objects.
//! - `pipeline/`: archive, extract and download runs.
//! - `tools/`: size and hash comparison, search, bulk removal.

pub mod builder;
pub mod classifier;
pub mod codec;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod segments;
pub mod sparse;
pub mod tools;
pub mod unit;

pub use builder::{Archiver, CreateArchive, NativeTar, TarCommand, detect_archiver};
pub use classifier::Classifier;
pub use codec::{ArchiveTag, DecodedName, ExtractionMode};
pub use error::{CoreError, CoreResult};
pub use pipeline::{ArchivePipeline, DownloadPipeline, ExtractPipeline};
pub use plan::{ArchiveJob, PlanOptions, Planner};
pub use pool::{Job, PoolReport, WorkerPool};
pub use segments::{SegmentDescriptor, SegmentMap};
pub use unit::{DirectoryUnit, UnitKind};
