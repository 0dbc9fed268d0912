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

//! Object store capability used by the swc pipelines.
//!
//! Layout: `client.rs` (the `ObjectStore` trait), `model.rs` (listing, head
//! and upload types), `swift.rs` (Swift HTTP implementation), `error.rs`.

pub mod client;
pub mod error;
pub mod model;
pub mod swift;

pub use client::ObjectStore;
pub use error::{StoreError, StoreResult};
pub use model::{
    ListMode, ObjectEntry, ObjectHead, ObjectLayout, SloSegment, UploadOptions,
    segment_object_name,
};
pub use swift::SwiftClient;
