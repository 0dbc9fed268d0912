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

//! Credentials and run settings for the swc tools.
//!
//! Every value here is resolved once at process start and threaded through the
//! pipelines by reference; nothing is mutated after construction.
//!
//! Layout: `defaults.rs` (tunable constants), `model.rs` (credential and
//! settings models), `validate.rs` (parsing helpers), `loader.rs` (credential
//! discovery from environment-style lookups).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CredentialOverrides, discover_credentials};
pub use model::{
    ArchiveSettings, BuildFailurePolicy, DownloadSettings, ExtractSettings, ObjectMetadata,
    StoreCredentials, WalkPolicy,
};
pub use validate::{parse_metadata, parse_parallelism, parse_size, resolve_directory};
