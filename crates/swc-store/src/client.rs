//! The object store capability consumed by the pipelines.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::model::{ListMode, ObjectEntry, ObjectHead, UploadOptions};

/// Operations the pipelines need from an object store.
///
/// Implementations must be safe to share between concurrent workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List objects in `container`, optionally restricted to `prefix`.
    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
        mode: ListMode,
    ) -> StoreResult<Vec<ObjectEntry>>;

    /// Fetch object metadata.
    async fn head(&self, container: &str, object: &str) -> StoreResult<ObjectHead>;

    /// Fetch an object body.
    async fn get(&self, container: &str, object: &str) -> StoreResult<Bytes>;

    /// Fetch the manifest of a segmented object instead of its body.
    async fn get_manifest(&self, container: &str, object: &str) -> StoreResult<Bytes>;

    /// Stream an object body into `path`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn download_to(&self, container: &str, object: &str, path: &Path) -> StoreResult<u64>;

    /// Upload the file at `path` as `object`, segmenting it when it exceeds
    /// the configured segment size. Returns the number of bytes sent.
    async fn upload_file(
        &self,
        container: &str,
        object: &str,
        path: &Path,
        options: &UploadOptions,
    ) -> StoreResult<u64>;

    /// Delete one object.
    async fn delete_object(&self, container: &str, object: &str) -> StoreResult<()>;

    /// Delete an empty container.
    async fn delete_container(&self, container: &str) -> StoreResult<()>;

    /// Create `container` if it does not exist.
    async fn ensure_container(&self, container: &str) -> StoreResult<()>;

    /// Update container-level metadata.
    async fn post_container(&self, container: &str, headers: &[(String, String)])
    -> StoreResult<()>;
}
