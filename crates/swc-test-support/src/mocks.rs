//! In-memory object store used by pipeline tests.
//!
//! Segmented objects are stored the way Swift stores static large objects:
//! the segments live in their own container and the object keeps only the
//! manifest, so manifest resolution and segment fetches are exercised for
//! real.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use serde_json::json;
use swc_store::{
    ListMode, ObjectEntry, ObjectHead, ObjectLayout, ObjectStore, StoreError, StoreResult,
    UploadOptions, segment_object_name,
};

/// Listing page size reported for [`ListMode::FirstPage`].
pub const PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
enum Stored {
    Single(Bytes),
    Segmented { manifest: Bytes },
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Stored,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, StoredObject>>,
    failing: BTreeSet<String>,
    container_posts: Vec<(String, Vec<(String, String)>)>,
}

/// Object store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Empty store without containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a container.
    pub fn create_container(&self, container: &str) {
        self.lock()
            .containers
            .entry(container.to_string())
            .or_default();
    }

    /// Store a single-body object, creating the container when needed.
    pub fn put_object(&self, container: &str, name: &str, body: impl Into<Bytes>) {
        self.lock()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredObject {
                    body: Stored::Single(body.into()),
                    metadata: BTreeMap::new(),
                },
            );
    }

    /// Store a segmented object whose segments live in `segment_container`.
    pub fn put_segmented(
        &self,
        container: &str,
        name: &str,
        segment_container: &str,
        segments: &[&[u8]],
    ) {
        let size: u64 = segments.iter().map(|s| s.len() as u64).sum();
        let names: Vec<String> = (0..segments.len())
            .map(|index| segment_object_name(name, "0.000000", size, 0, index))
            .collect();
        for (segment, segment_name) in segments.iter().zip(&names) {
            self.put_object(segment_container, segment_name, Bytes::copy_from_slice(segment));
        }
        let manifest = manifest_json(segment_container, &names, segments);
        let mut state = self.lock();
        state
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredObject {
                    body: Stored::Segmented { manifest },
                    metadata: BTreeMap::new(),
                },
            );
    }

    /// Make every operation on `name` fail with a server error.
    pub fn fail_on(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    /// Names stored in `container`, sorted.
    #[must_use]
    pub fn names(&self, container: &str) -> Vec<String> {
        self.lock()
            .containers
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `container` exists.
    #[must_use]
    pub fn has_container(&self, container: &str) -> bool {
        self.lock().containers.contains_key(container)
    }

    /// Metadata recorded for an object, keyed by lower-cased suffix.
    #[must_use]
    pub fn metadata(&self, container: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .containers
            .get(container)
            .and_then(|objects| objects.get(name))
            .map(|object| object.metadata.clone())
    }

    /// Header sets posted to `container`, in order.
    #[must_use]
    pub fn container_posts(&self, container: &str) -> Vec<Vec<(String, String)>> {
        self.lock()
            .container_posts
            .iter()
            .filter(|(name, _)| name == container)
            .map(|(_, headers)| headers.clone())
            .collect()
    }

    fn check_failing(&self, container: &str, object: &str, operation: &'static str) -> StoreResult<()> {
        if self.lock().failing.contains(object) {
            return Err(StoreError::Status {
                operation,
                container: container.to_string(),
                object: Some(object.to_string()),
                status: 500,
            });
        }
        Ok(())
    }

    fn object(&self, container: &str, object: &str) -> StoreResult<StoredObject> {
        let state = self.lock();
        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| not_found(container, None))?;
        objects
            .get(object)
            .cloned()
            .ok_or_else(|| not_found(container, Some(object)))
    }

    fn assemble(&self, manifest: &Bytes) -> StoreResult<Bytes> {
        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(manifest).map_err(|source| StoreError::Decode {
                operation: "assemble",
                source,
            })?;
        let mut body = Vec::new();
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .trim_start_matches('/');
            let (container, object) = name.split_once('/').unwrap_or((name, ""));
            match self.object(container, object)?.body {
                Stored::Single(bytes) => body.extend_from_slice(&bytes),
                Stored::Segmented { .. } => {
                    return Err(StoreError::InvalidRequest {
                        operation: "assemble",
                        reason: "nested manifests are not supported",
                    });
                }
            }
        }
        Ok(Bytes::from(body))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
        mode: ListMode,
    ) -> StoreResult<Vec<ObjectEntry>> {
        let state = self.lock();
        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| not_found(container, None))?;
        let limit = match mode {
            ListMode::Full => usize::MAX,
            ListMode::FirstPage => PAGE_SIZE,
        };
        Ok(objects
            .iter()
            .filter(|(name, _)| prefix.is_none_or(|p| name.starts_with(p)))
            .take(limit)
            .map(|(name, object)| ObjectEntry {
                name: name.clone(),
                bytes: match &object.body {
                    Stored::Single(bytes) => bytes.len() as u64,
                    Stored::Segmented { manifest } => manifest_size(manifest),
                },
                hash: match &object.body {
                    Stored::Single(bytes) => Some(md5_hex(bytes)),
                    Stored::Segmented { manifest } => Some(md5_hex(manifest)),
                },
                content_type: None,
                last_modified: None,
            })
            .collect())
    }

    async fn head(&self, container: &str, object: &str) -> StoreResult<ObjectHead> {
        self.check_failing(container, object, "head")?;
        let stored = self.object(container, object)?;
        Ok(match &stored.body {
            Stored::Single(bytes) => ObjectHead {
                content_length: bytes.len() as u64,
                etag: Some(md5_hex(bytes)),
                layout: ObjectLayout::Single,
                metadata: stored.metadata.clone(),
            },
            Stored::Segmented { manifest } => ObjectHead {
                content_length: manifest_size(manifest),
                etag: Some(slo_etag(manifest)),
                layout: ObjectLayout::Segmented,
                metadata: stored.metadata.clone(),
            },
        })
    }

    async fn get(&self, container: &str, object: &str) -> StoreResult<Bytes> {
        self.check_failing(container, object, "get")?;
        match self.object(container, object)?.body {
            Stored::Single(bytes) => Ok(bytes),
            Stored::Segmented { manifest } => self.assemble(&manifest),
        }
    }

    async fn get_manifest(&self, container: &str, object: &str) -> StoreResult<Bytes> {
        self.check_failing(container, object, "get_manifest")?;
        match self.object(container, object)?.body {
            Stored::Single(bytes) => Ok(bytes),
            Stored::Segmented { manifest } => Ok(manifest),
        }
    }

    async fn download_to(&self, container: &str, object: &str, path: &Path) -> StoreResult<u64> {
        let body = self.get(container, object).await?;
        tokio::fs::write(path, &body)
            .await
            .map_err(|source| StoreError::Io {
                operation: "write_download",
                path: path.to_path_buf(),
                source,
            })?;
        Ok(body.len() as u64)
    }

    async fn upload_file(
        &self,
        container: &str,
        object: &str,
        path: &Path,
        options: &UploadOptions,
    ) -> StoreResult<u64> {
        self.check_failing(container, object, "upload")?;
        if !self.has_container(container) {
            return Err(not_found(container, None));
        }
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| StoreError::Io {
                operation: "read_upload",
                path: path.to_path_buf(),
                source,
            })?;
        let size = data.len() as u64;
        let metadata: BTreeMap<String, String> = options
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let lower = name.to_ascii_lowercase();
                lower
                    .strip_prefix("x-object-meta-")
                    .map(|key| (key.to_string(), value.clone()))
            })
            .collect();

        let body = if options.segment_size > 0 && size > options.segment_size {
            let chunk = usize::try_from(options.segment_size).unwrap_or(usize::MAX);
            let segments: Vec<&[u8]> = data.chunks(chunk).collect();
            let names: Vec<String> = (0..segments.len())
                .map(|index| {
                    segment_object_name(object, "0.000000", size, options.segment_size, index)
                })
                .collect();
            for (segment, name) in segments.iter().zip(&names) {
                self.put_object(
                    &options.segment_container,
                    name,
                    Bytes::copy_from_slice(segment),
                );
            }
            Stored::Segmented {
                manifest: manifest_json(&options.segment_container, &names, &segments),
            }
        } else {
            Stored::Single(Bytes::from(data))
        };

        self.lock()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(object.to_string(), StoredObject { body, metadata });
        Ok(size)
    }

    async fn delete_object(&self, container: &str, object: &str) -> StoreResult<()> {
        self.check_failing(container, object, "delete_object")?;
        let mut state = self.lock();
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| not_found(container, None))?;
        objects
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| not_found(container, Some(object)))
    }

    async fn delete_container(&self, container: &str) -> StoreResult<()> {
        let mut state = self.lock();
        match state.containers.get(container) {
            None => Err(not_found(container, None)),
            Some(objects) if !objects.is_empty() => Err(StoreError::Status {
                operation: "delete_container",
                container: container.to_string(),
                object: None,
                status: 409,
            }),
            Some(_) => {
                state.containers.remove(container);
                Ok(())
            }
        }
    }

    async fn ensure_container(&self, container: &str) -> StoreResult<()> {
        self.create_container(container);
        Ok(())
    }

    async fn post_container(
        &self,
        container: &str,
        headers: &[(String, String)],
    ) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.containers.contains_key(container) {
            return Err(not_found(container, None));
        }
        state
            .container_posts
            .push((container.to_string(), headers.to_vec()));
        Ok(())
    }
}

fn not_found(container: &str, object: Option<&str>) -> StoreError {
    StoreError::NotFound {
        container: container.to_string(),
        object: object.map(ToString::to_string),
    }
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

fn manifest_json(segment_container: &str, names: &[String], segments: &[&[u8]]) -> Bytes {
    let entries: Vec<serde_json::Value> = names
        .iter()
        .zip(segments)
        .map(|(name, segment)| {
            json!({
                "name": format!("/{segment_container}/{name}"),
                "bytes": segment.len(),
                "hash": md5_hex(segment),
                "content_type": "application/octet-stream",
            })
        })
        .collect();
    Bytes::from(serde_json::Value::Array(entries).to_string())
}

fn manifest_entries(manifest: &[u8]) -> Vec<serde_json::Value> {
    serde_json::from_slice(manifest).unwrap_or_default()
}

fn manifest_size(manifest: &[u8]) -> u64 {
    manifest_entries(manifest)
        .iter()
        .filter_map(|entry| entry.get("bytes").and_then(serde_json::Value::as_u64))
        .sum()
}

fn slo_etag(manifest: &[u8]) -> String {
    let joined: String = manifest_entries(manifest)
        .iter()
        .filter_map(|entry| entry.get("hash").and_then(serde_json::Value::as_str))
        .collect();
    md5_hex(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    #[tokio::test]
    async fn segmented_objects_assemble_in_manifest_order() -> Result<()> {
        let store = MemoryStore::new();
        store.put_segmented("c", "big", ".segments_c", &[b"abc", b"defg", b"h"]);

        let head = store.head("c", "big").await?;
        assert_eq!(head.layout, ObjectLayout::Segmented);
        assert_eq!(head.content_length, 8);
        assert_eq!(store.get("c", "big").await?.as_ref(), b"abcdefgh");
        assert_eq!(store.names(".segments_c").len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn uploads_require_container_and_split_large_files() -> Result<()> {
        let temp = TempDir::new()?;
        let file = temp.path().join("payload");
        tokio::fs::write(&file, b"0123456789").await?;
        let store = MemoryStore::new();
        let options = UploadOptions {
            segment_size: 4,
            segment_container: ".segments_c".to_string(),
            headers: vec![("X-Object-Meta-Uploaded-by".to_string(), "alice".to_string())],
        };

        let missing = store.upload_file("c", "obj", &file, &options).await;
        assert!(missing.is_err_and(|err| err.is_not_found()));

        store.ensure_container("c").await?;
        store.upload_file("c", "obj", &file, &options).await?;
        assert_eq!(store.names(".segments_c").len(), 3);
        assert_eq!(store.get("c", "obj").await?.as_ref(), b"0123456789");
        assert_eq!(
            store
                .metadata("c", "obj")
                .and_then(|meta| meta.get("uploaded-by").cloned()),
            Some("alice".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_objects_report_server_errors() -> Result<()> {
        let store = MemoryStore::new();
        store.put_object("c", "bad", "x");
        store.fail_on("bad");
        assert!(matches!(
            store.get("c", "bad").await,
            Err(StoreError::Status { status: 500, .. })
        ));
        assert!(matches!(
            store.delete_container("c").await,
            Err(StoreError::Status { status: 409, .. })
        ));
        Ok(())
    }
}
