//! End-to-end runs built from the walk, plan, archiver and store.
//!
//! # Design
//! - Each pipeline owns shared handles only; run settings are borrowed per run.
//! - Every job owns its scratch file and removes it whether or not the job
//!   succeeded.

pub mod archive;
pub mod download;
pub mod extract;

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

pub use archive::ArchivePipeline;
pub use download::DownloadPipeline;
pub use extract::ExtractPipeline;

/// Header recording who uploaded an object.
pub const UPLOADED_BY_HEADER: &str = "X-Object-Meta-Uploaded-by";

/// Login name of the current user, used for the uploaded-by header.
#[must_use]
pub fn uploader_login() -> String {
    #[cfg(unix)]
    {
        if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::getuid()) {
            return user.name;
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// Unique scratch file for `object_name` inside `temp_dir`.
pub(crate) fn scratch_path(temp_dir: &Path, object_name: &str) -> PathBuf {
    let basename = object_name.rsplit('/').next().unwrap_or(object_name);
    temp_dir.join(format!(
        "{}-{}-{basename}",
        std::process::id(),
        Uuid::new_v4().simple()
    ))
}

pub(crate) async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(error = %err, path = %path.display(), "failed to remove scratch file"),
    }
}
