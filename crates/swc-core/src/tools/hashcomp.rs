//! MD5 comparison of a local file or digest against a stored object.
//!
//! # Design
//! - Single objects are compared against their entity tag.
//! - Segmented objects are checked segment by segment against the manifest
//!   when a local file is given; a bare digest is compared against the
//!   recorded `md5sum` metadata or, failing that, the hash of all segments
//!   fetched in order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::Serialize;
use swc_store::{ObjectLayout, ObjectStore};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::segments::{self, SegmentMap};

/// Metadata key some uploaders use to record the whole-object digest.
pub const MD5SUM_METADATA: &str = "md5sum";

const READ_BUFFER: usize = 1 << 20;

/// What the stored object is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashSource {
    /// A local file whose content is hashed.
    File(PathBuf),
    /// A known hex digest.
    Digest(String),
}

impl HashSource {
    /// Interpret a command-line argument.
    ///
    /// An existing `.md5` file contributes its first token as the digest, any
    /// other existing file is hashed, and anything else must be a hex digest.
    ///
    /// # Errors
    ///
    /// Returns an error when a `.md5` file cannot be read or the argument is
    /// neither a file nor a digest.
    pub fn from_argument(argument: &str) -> CoreResult<Self> {
        let path = Path::new(argument);
        if path.is_file() {
            let is_md5_file = path
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("md5"));
            if !is_md5_file {
                return Ok(Self::File(path.to_path_buf()));
            }
            let contents = std::fs::read_to_string(path)
                .map_err(|source| CoreError::io("hashcomp.read_md5", path, source))?;
            return contents
                .split_whitespace()
                .next()
                .map(|digest| Self::Digest(digest.to_ascii_lowercase()))
                .ok_or_else(|| CoreError::invalid("md5_file", "empty", argument));
        }
        let digest = argument.trim();
        if digest.len() == 32 && digest.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Ok(Self::Digest(digest.to_ascii_lowercase()));
        }
        Err(CoreError::invalid("hash_source", "not_file_or_digest", argument))
    }
}

/// Result of checking one segment against its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentCheck {
    /// Segment path as `container/object`.
    pub segment: String,
    /// Digest recorded in the manifest.
    pub expected: Option<String>,
    /// Digest of the matching local byte range.
    pub actual: String,
}

impl SegmentCheck {
    /// Whether the local range matches the manifest.
    #[must_use]
    pub fn matches(&self) -> bool {
        self.expected
            .as_deref()
            .is_some_and(|expected| expected.eq_ignore_ascii_case(&self.actual))
    }
}

/// Outcome of a hash comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashComparison {
    /// Object compared.
    pub object: String,
    /// Whether the object is segmented.
    pub segmented: bool,
    /// Digest on the local side.
    pub local_md5: Option<String>,
    /// Digest on the store side, when one exists for the whole object.
    pub store_md5: Option<String>,
    /// Per-segment results when a local file was checked against a manifest.
    pub segments: Vec<SegmentCheck>,
    /// Whether the local file has the object's size.
    pub size_matches: bool,
}

impl HashComparison {
    /// Whether both sides are identical.
    #[must_use]
    pub fn matches(&self) -> bool {
        if !self.size_matches {
            return false;
        }
        if self.segmented && !self.segments.is_empty() {
            return self.segments.iter().all(SegmentCheck::matches);
        }
        match (&self.local_md5, &self.store_md5) {
            (Some(local), Some(stored)) => local.eq_ignore_ascii_case(stored),
            _ => false,
        }
    }
}

/// Compare `object` with `source`.
///
/// # Errors
///
/// Returns an error when the object, its manifest or its segments cannot be
/// fetched, or the local file cannot be read.
pub async fn compare_hash(
    store: &dyn ObjectStore,
    container: &str,
    object: &str,
    source: &HashSource,
) -> CoreResult<HashComparison> {
    let head = store
        .head(container, object)
        .await
        .map_err(|err| CoreError::store("head", object, err))?;
    let mut comparison = HashComparison {
        object: object.to_string(),
        segmented: head.layout == ObjectLayout::Segmented,
        local_md5: None,
        store_md5: None,
        segments: Vec::new(),
        size_matches: true,
    };

    match (head.layout, source) {
        (ObjectLayout::Single, HashSource::File(path)) => {
            let path = path.clone();
            let (digest, size) = run_blocking("hashcomp.hash_file", move || hash_file(&path)).await?;
            comparison.local_md5 = Some(digest);
            comparison.size_matches = size == head.content_length;
            comparison.store_md5 = head.etag;
        }
        (ObjectLayout::Single, HashSource::Digest(digest)) => {
            comparison.local_md5 = Some(digest.clone());
            comparison.store_md5 = head.etag;
        }
        (ObjectLayout::Segmented, HashSource::File(path)) => {
            let map = segments::resolve(store, container, object).await?;
            let path = path.clone();
            let total = map.total_size;
            let (segments, digest, size) =
                run_blocking("hashcomp.hash_segments", move || hash_segments(&path, &map)).await?;
            comparison.segments = segments;
            comparison.local_md5 = Some(digest);
            comparison.size_matches = size == total;
        }
        (ObjectLayout::Segmented, HashSource::Digest(digest)) => {
            comparison.local_md5 = Some(digest.clone());
            comparison.store_md5 = match head.metadata.get(MD5SUM_METADATA) {
                Some(recorded) => Some(recorded.clone()),
                None => Some(hash_stored_segments(store, container, object).await?),
            };
        }
    }

    info!(
        object,
        local = ?comparison.local_md5,
        stored = ?comparison.store_md5,
        identical = comparison.matches(),
        "hash comparison finished"
    );
    Ok(comparison)
}

async fn hash_stored_segments(store: &dyn ObjectStore, container: &str, object: &str) -> CoreResult<String> {
    let map = segments::resolve(store, container, object).await?;
    let mut digest = Md5::new();
    for segment in &map.segments {
        debug!(container = %segment.container, segment = %segment.object, "hashing stored segment");
        let body = store
            .get(&segment.container, &segment.object)
            .await
            .map_err(|err| CoreError::store("get_segment", &segment.object, err))?;
        digest.update(&body);
    }
    Ok(format!("{:x}", digest.finalize()))
}

async fn run_blocking<T, F>(operation: &'static str, task: F) -> CoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|source| CoreError::Join { operation, source })?
}

fn open(path: &Path) -> CoreResult<BufReader<File>> {
    File::open(path)
        .map(|file| BufReader::with_capacity(READ_BUFFER, file))
        .map_err(|source| CoreError::io("hashcomp.open", path, source))
}

/// Hex digest and length of a file.
fn hash_file(path: &Path) -> CoreResult<(String, u64)> {
    let mut reader = open(path)?;
    let mut digest = Md5::new();
    let size = feed(&mut reader, &mut [&mut digest], path)?;
    Ok((format!("{:x}", digest.finalize()), size))
}

/// Per-segment checks, whole-file digest and bytes read, in one pass.
fn hash_segments(path: &Path, map: &SegmentMap) -> CoreResult<(Vec<SegmentCheck>, String, u64)> {
    let mut reader = open(path)?;
    let mut whole = Md5::new();
    let mut checks = Vec::with_capacity(map.segments.len());
    let mut consumed = 0_u64;
    for segment in &map.segments {
        let mut part = Md5::new();
        let mut limited = (&mut reader).take(segment.length);
        consumed += feed(&mut limited, &mut [&mut part, &mut whole], path)?;
        checks.push(SegmentCheck {
            segment: format!("{}/{}", segment.container, segment.object),
            expected: segment.hash.clone(),
            actual: format!("{:x}", part.finalize()),
        });
    }
    consumed += feed(&mut reader, &mut [&mut whole], path)?;
    Ok((checks, format!("{:x}", whole.finalize()), consumed))
}

fn feed(reader: &mut impl Read, digests: &mut [&mut Md5], path: &Path) -> CoreResult<u64> {
    let mut buffer = vec![0_u8; READ_BUFFER];
    let mut total = 0_u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|source| CoreError::io("hashcomp.read", path, source))?;
        if read == 0 {
            return Ok(total);
        }
        for digest in digests.iter_mut() {
            digest.update(&buffer[..read]);
        }
        total += read as u64;
    }
}
