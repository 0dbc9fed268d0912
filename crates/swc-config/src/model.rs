//! Typed credential and settings models.
//!
//! # Design
//! - Credentials are a closed two-variant value; callers never inspect raw
//!   environment variables after discovery.
//! - Settings structs are plain data assembled once by the CLI.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Serialize;
use url::Url;

use crate::defaults;

/// How to reach the object store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreCredentials {
    /// A token already issued for a known storage endpoint.
    PreAuthorized {
        /// Value sent as `X-Auth-Token`.
        token: String,
        /// Account storage URL.
        storage_url: Url,
    },
    /// Version 1 (temp-auth) credentials exchanged for a token on connect.
    TempAuth {
        /// Authentication endpoint.
        auth_url: Url,
        /// Account user, usually `account:user`.
        user: String,
        /// Account key.
        key: String,
    },
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreAuthorized { storage_url, .. } => f
                .debug_struct("PreAuthorized")
                .field("token", &"<redacted>")
                .field("storage_url", &storage_url.as_str())
                .finish(),
            Self::TempAuth { auth_url, user, .. } => f
                .debug_struct("TempAuth")
                .field("auth_url", &auth_url.as_str())
                .field("user", user)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// What to do when the archiver exits unsuccessfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFailurePolicy {
    /// Fail the job and skip the upload or leave the download unextracted.
    #[default]
    Abort,
    /// Log the failure and continue with whatever was produced.
    BestEffort,
}

/// One `key:value` pair stored as `X-Object-Meta-<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    /// Metadata key without the header prefix.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

impl ObjectMetadata {
    /// Header name carrying this pair.
    #[must_use]
    pub fn header_name(&self) -> String {
        format!("X-Object-Meta-{}", self.key)
    }
}

/// Directory filters applied while walking a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPolicy {
    /// Skip directories with a dot-prefixed path component.
    pub no_hidden: bool,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// Directory names archived recursively as one unit.
    pub special_dirs: Vec<String>,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self {
            no_hidden: false,
            skip_dirs: defaults::SKIP_DIRS.iter().map(ToString::to_string).collect(),
            special_dirs: defaults::SPECIAL_DIRS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Inputs for archiving a local tree into a container.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Root of the tree to archive, without trailing slashes.
    pub local_dir: PathBuf,
    /// Destination container.
    pub container: String,
    /// Scratch directory for archives and member lists.
    pub temp_dir: PathBuf,
    /// Optional object name prefix.
    pub prefix: Option<String>,
    /// Worker count.
    pub parallelism: NonZeroUsize,
    /// Directory filters.
    pub walk: WalkPolicy,
    /// Restrict the run to this path relative to `local_dir`.
    pub subtree: Option<PathBuf>,
    /// Extra metadata attached to every uploaded object.
    pub metadata: Vec<ObjectMetadata>,
    /// Merge small directories into bundles of roughly this many bytes.
    pub bundle_threshold: Option<u64>,
    /// Reaction to archiver failures.
    pub failure_policy: BuildFailurePolicy,
    /// Upload size above which objects are segmented.
    pub segment_size: u64,
    /// Member lists longer than this are passed through a list file.
    pub inline_member_limit: usize,
}

impl ArchiveSettings {
    /// Settings with defaults for everything but the three required inputs.
    #[must_use]
    pub fn new(local_dir: PathBuf, container: String, temp_dir: PathBuf) -> Self {
        Self {
            local_dir,
            container,
            temp_dir,
            prefix: None,
            parallelism: default_parallelism(defaults::ARCHIVE_PARALLELISM),
            walk: WalkPolicy::default(),
            subtree: None,
            metadata: Vec::new(),
            bundle_threshold: None,
            failure_policy: BuildFailurePolicy::default(),
            segment_size: defaults::SEGMENT_SIZE,
            inline_member_limit: defaults::INLINE_MEMBER_LIMIT,
        }
    }

    /// Container holding the segments of large uploads.
    #[must_use]
    pub fn segment_container(&self) -> String {
        defaults::segment_container(&self.container)
    }
}

/// Inputs for restoring archives from a container into a local tree.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Directory the tree is restored into.
    pub local_dir: PathBuf,
    /// Source container.
    pub container: String,
    /// Scratch directory for downloaded archives.
    pub temp_dir: PathBuf,
    /// Optional object name prefix, stripped before decoding names.
    pub prefix: Option<String>,
    /// Worker count.
    pub parallelism: NonZeroUsize,
    /// Skip archives whose names contain a dot-prefixed component.
    pub no_hidden: bool,
    /// Reaction to extractor failures.
    pub failure_policy: BuildFailurePolicy,
}

impl ExtractSettings {
    /// Settings with defaults for everything but the three required inputs.
    #[must_use]
    pub fn new(local_dir: PathBuf, container: String, temp_dir: PathBuf) -> Self {
        Self {
            local_dir,
            container,
            temp_dir,
            prefix: None,
            parallelism: default_parallelism(defaults::ARCHIVE_PARALLELISM),
            no_hidden: false,
            failure_policy: BuildFailurePolicy::default(),
        }
    }
}

/// Inputs for downloading named objects.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Source container.
    pub container: String,
    /// Object names to fetch.
    pub objects: Vec<String>,
    /// Directory receiving the downloaded files.
    pub target_dir: PathBuf,
    /// Segment workers per large object.
    pub parallelism: NonZeroUsize,
}

impl DownloadSettings {
    /// Settings with the default worker count.
    #[must_use]
    pub fn new(container: String, objects: Vec<String>, target_dir: PathBuf) -> Self {
        Self {
            container,
            objects,
            target_dir,
            parallelism: default_parallelism(defaults::DOWNLOAD_PARALLELISM),
        }
    }
}

pub(crate) const fn default_parallelism(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => NonZeroUsize::MIN,
    }
}
