//! Test fixtures and environment helpers.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Returns `true` if a GNU-compatible `tar` binary can be executed.
#[must_use]
pub fn tar_available() -> bool {
    tar_available_with_path(std::env::var_os("PATH"))
}

fn tar_available_with_path(path: Option<OsString>) -> bool {
    let Some(path) = path else {
        return false;
    };
    if !std::env::split_paths(&path).any(|dir| dir.join("tar").is_file()) {
        return false;
    }
    Command::new("tar")
        .arg("--version")
        .env("PATH", &path)
        .output()
        .map(|output| {
            output.status.success() && String::from_utf8_lossy(&output.stdout).contains("GNU tar")
        })
        .unwrap_or(false)
}

/// Create files below `root`; intermediate directories are created as needed.
///
/// # Errors
///
/// Returns an error if any directory or file cannot be written.
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) -> Result<()> {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Read every regular file below `root`, keyed by `/`-separated relative path.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn collect_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.context("failed to walk tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("walked outside of root")?
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let contents = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        files.insert(relative, contents);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tar_lookup_rejects_missing_path() {
        assert!(!tar_available_with_path(None));
        assert!(!tar_available_with_path(Some("/definitely/missing".into())));
    }

    #[test]
    fn tar_lookup_matches_environment() {
        assert_eq!(tar_available(), tar_available_with_path(std::env::var_os("PATH")));
    }

    #[test]
    fn write_then_collect_round_trips() -> Result<()> {
        let temp = TempDir::new()?;
        write_tree(
            temp.path(),
            &[("a.txt", b"alpha"), ("sub/deeper/b.txt", b"beta")],
        )?;
        fs::create_dir_all(temp.path().join("empty"))?;

        let files = collect_tree(temp.path())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files.get("a.txt").map(Vec::as_slice), Some(&b"alpha"[..]));
        assert_eq!(
            files.get("sub/deeper/b.txt").map(Vec::as_slice),
            Some(&b"beta"[..])
        );
        Ok(())
    }
}
