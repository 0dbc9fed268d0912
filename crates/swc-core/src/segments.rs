//! Resolving large object manifests into positioned segments.
//!
//! # Design
//! - Offsets come from manifest order alone; segment sizes are never
//!   re-queried.
//! - Whether an object is segmented is decided from its metadata before this
//!   module is involved.

use serde::Deserialize;
use swc_store::ObjectStore;

use crate::error::{CoreError, CoreResult};
use crate::pool::Job;

/// One segment of a large object and the byte range it fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Container holding the segment.
    pub container: String,
    /// Segment object name.
    pub object: String,
    /// Offset of the first byte in the reassembled object.
    pub offset: u64,
    /// Length of the segment.
    pub length: u64,
    /// `MD5` recorded in the manifest, when present.
    pub hash: Option<String>,
}

impl SegmentDescriptor {
    /// Offset one past the last byte of the segment.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl Job for SegmentDescriptor {
    fn label(&self) -> String {
        format!("{}/{}", self.container, self.object)
    }
}

/// Ordered segments and the size of the reassembled object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentMap {
    /// Segments in manifest order.
    pub segments: Vec<SegmentDescriptor>,
    /// Sum of all segment lengths.
    pub total_size: u64,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    bytes: u64,
    #[serde(default)]
    hash: Option<String>,
}

/// Split a `/<container>/<object>` manifest name.
#[must_use]
pub fn split_segment_path(name: &str) -> Option<(&str, &str)> {
    let (container, object) = name.trim_start_matches('/').split_once('/')?;
    if container.is_empty() || object.is_empty() {
        return None;
    }
    Some((container, object))
}

/// Parse a manifest body and assign cumulative offsets.
///
/// # Errors
///
/// Returns an error when the body is not a manifest, an entry names no
/// segment, or the sizes overflow.
pub fn resolve_manifest(object: &str, body: &[u8]) -> CoreResult<SegmentMap> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_slice(body).map_err(|source| CoreError::Manifest {
            object: object.to_string(),
            source,
        })?;

    let mut segments = Vec::with_capacity(entries.len());
    let mut offset = 0_u64;
    for (index, entry) in entries.into_iter().enumerate() {
        let (container, name) =
            split_segment_path(&entry.name).ok_or(CoreError::ManifestEntry {
                index,
                reason: "segment_path",
            })?;
        segments.push(SegmentDescriptor {
            container: container.to_string(),
            object: name.to_string(),
            offset,
            length: entry.bytes,
            hash: entry.hash,
        });
        offset = offset
            .checked_add(entry.bytes)
            .ok_or(CoreError::ManifestEntry {
                index,
                reason: "size_overflow",
            })?;
    }

    Ok(SegmentMap {
        segments,
        total_size: offset,
    })
}

/// Fetch and resolve the manifest of `object`.
///
/// # Errors
///
/// Returns an error when the manifest cannot be fetched or parsed.
pub async fn resolve(store: &dyn ObjectStore, container: &str, object: &str) -> CoreResult<SegmentMap> {
    let body = store
        .get_manifest(container, object)
        .await
        .map_err(|source| CoreError::store("get_manifest", format!("{container}/{object}"), source))?;
    resolve_manifest(object, &body)
}
