//! Listing, metadata and upload types exchanged with an object store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How much of a container listing to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Follow markers until the listing is exhausted.
    Full,
    /// Return only the first page the server sends.
    FirstPage,
}

/// One object in a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Object name.
    pub name: String,
    /// Object size in bytes; the manifest size for segmented objects.
    pub bytes: u64,
    /// `MD5` of the stored body as reported by the server.
    #[serde(default)]
    pub hash: Option<String>,
    /// Stored content type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Last modification time as reported by the server.
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Storage shape of an object, decided once from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLayout {
    /// A single stored body.
    Single,
    /// A manifest listing ordered segments.
    Segmented,
}

/// Metadata returned by a `HEAD` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Logical size of the object.
    pub content_length: u64,
    /// Entity tag without surrounding quotes.
    pub etag: Option<String>,
    /// Single body or segmented.
    pub layout: ObjectLayout,
    /// `X-Object-Meta-*` values keyed by lower-cased suffix.
    pub metadata: BTreeMap<String, String>,
}

/// Options controlling an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Files larger than this are stored as segments.
    pub segment_size: u64,
    /// Container receiving the segments.
    pub segment_container: String,
    /// Extra headers sent with the object or manifest.
    pub headers: Vec<(String, String)>,
}

/// Entry of a static large object manifest as sent on upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloSegment {
    /// `/<container>/<object>` path of the segment.
    pub path: String,
    /// Entity tag of the stored segment.
    pub etag: String,
    /// Segment length in bytes.
    pub size_bytes: u64,
}

/// Name of segment `index` for an upload of `object`.
///
/// The layout `<object>/slo/<mtime>/<size>/<segment_size>/<index>` keeps
/// segments of different uploads of the same name apart.
#[must_use]
pub fn segment_object_name(
    object: &str,
    mtime: &str,
    size: u64,
    segment_size: u64,
    index: usize,
) -> String {
    format!("{object}/slo/{mtime}/{size}/{segment_size}/{index:08}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_names_sort_by_index() {
        let first = segment_object_name("backup/a.tar.gz", "1700000000.000000", 10, 4, 0);
        let second = segment_object_name("backup/a.tar.gz", "1700000000.000000", 10, 4, 2);
        assert_eq!(first, "backup/a.tar.gz/slo/1700000000.000000/10/4/00000000");
        assert!(first < second);
    }

    #[test]
    fn listing_entries_tolerate_missing_fields() -> anyhow::Result<()> {
        let entries: Vec<ObjectEntry> =
            serde_json::from_str(r#"[{"name":"a","bytes":3},{"name":"b","bytes":0,"hash":"x"}]"#)?;
        assert_eq!(entries[0].hash, None);
        assert_eq!(entries[1].hash.as_deref(), Some("x"));
        Ok(())
    }
}
