//! Compare the size of a local folder with an object prefix.

use std::path::Path;

use serde::Serialize;
use swc_store::{ListMode, ObjectStore};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};

/// Directory names left out of the local total.
const IGNORED_DIRS: &[&str] = &[".snapshot"];

/// Local and stored totals for one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeComparison {
    /// Bytes in regular files below the local folder.
    pub local_bytes: u64,
    /// Bytes in objects below the prefix.
    pub store_bytes: u64,
    /// Objects below the prefix.
    pub object_count: usize,
    /// Local entries whose size could not be read.
    pub local_errors: usize,
}

impl SizeComparison {
    /// Whether both sides hold the same number of bytes.
    #[must_use]
    pub const fn identical(&self) -> bool {
        self.local_bytes == self.store_bytes
    }
}

/// Sum regular-file sizes below `local_dir` and object sizes below `prefix`.
///
/// # Errors
///
/// Returns an error when the container cannot be listed or the local walk
/// cannot run.
pub async fn compare_sizes(
    store: &dyn ObjectStore,
    local_dir: &Path,
    container: &str,
    prefix: Option<&str>,
) -> CoreResult<SizeComparison> {
    let objects = store
        .list(container, prefix, ListMode::Full)
        .await
        .map_err(|source| CoreError::store("list", container, source))?;
    let store_bytes = objects
        .iter()
        .fold(0_u64, |total, entry| total.saturating_add(entry.bytes));

    let root = local_dir.to_path_buf();
    let (local_bytes, local_errors) = tokio::task::spawn_blocking(move || folder_size(&root))
        .await
        .map_err(|source| CoreError::Join {
            operation: "compare.folder_size",
            source,
        })?;

    Ok(SizeComparison {
        local_bytes,
        store_bytes,
        object_count: objects.len(),
        local_errors,
    })
}

/// Total bytes of regular files below `root` and the number of unreadable
/// entries. Symlinks are not followed.
#[must_use]
pub fn folder_size(root: &Path) -> (u64, usize) {
    let mut total = 0_u64;
    let mut errors = 0_usize;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && IGNORED_DIRS
                    .iter()
                    .any(|name| entry.file_name() == std::ffi::OsStr::new(name)))
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, path = ?err.path(), "could not size entry");
                errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => total = total.saturating_add(metadata.len()),
            Err(err) => {
                warn!(error = %err, path = %entry.path().display(), "could not size file");
                errors += 1;
            }
        }
    }
    (total, errors)
}
