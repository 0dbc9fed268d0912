//! Default tunables shared by the tools.
//!
//! # Design
//! - Values match the naming and sizing used by archives already in the store.
//! - Keep these in one place so the CLI help text and the pipelines agree.

/// Workers used by archive and extract runs.
pub const ARCHIVE_PARALLELISM: usize = 3;
/// Workers used when reconstructing segmented downloads.
pub const DOWNLOAD_PARALLELISM: usize = 5;
/// Workers used by bulk deletion.
pub const REMOVE_PARALLELISM: usize = 32;
/// Workers used by content search.
pub const SEARCH_PARALLELISM: usize = 5;
/// Upload size above which an object is stored as segments.
pub const SEGMENT_SIZE: u64 = 2_147_483_648;
/// Directory names never descended into.
pub const SKIP_DIRS: &[&str] = &[".snapshot"];
/// Directory names archived recursively as a single unit.
pub const SPECIAL_DIRS: &[&str] = &[".git"];
/// Member lists longer than this go through a list file.
pub const INLINE_MEMBER_LIMIT: usize = 16;
/// Prefix of the container holding segments for `<container>`.
pub const SEGMENT_CONTAINER_PREFIX: &str = ".segments_";

/// Segment container name paired with `container`.
#[must_use]
pub fn segment_container(container: &str) -> String {
    format!("{SEGMENT_CONTAINER_PREFIX}{container}")
}
