//! Lazy, pre-order classification of a directory tree into units.
//!
//! # Design
//! - `walkdir` drives the traversal; pruned directories are never read.
//! - Special directories become one recursive unit; everything below them is
//!   reported as a child and left to that unit.
//! - A directory that cannot be listed is logged, counted and skipped while
//!   the walk carries on with its siblings.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use swc_config::WalkPolicy;
use swc_telemetry::Metrics;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::codec;
use crate::unit::{DirectoryUnit, UnitKind};

/// Stem used for the walk root's archive.
#[must_use]
pub fn root_stem(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            fs::canonicalize(root)
                .ok()
                .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        });
    name.unwrap_or_else(|| "root".to_string())
}

/// Walks a tree and yields one [`DirectoryUnit`] per visited directory.
pub struct Classifier {
    root: PathBuf,
    policy: WalkPolicy,
    metrics: Option<Metrics>,
}

impl Classifier {
    /// Classifier for the tree below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: WalkPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            metrics: None,
        }
    }

    /// Count skipped directories in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Start the walk.
    #[must_use]
    pub fn units(self) -> Units {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Units {
            walker,
            root: self.root,
            policy: self.policy,
            metrics: self.metrics,
            recursive_root: None,
        }
    }
}

/// Iterator over the units of one walk.
pub struct Units {
    walker: walkdir::IntoIter,
    root: PathBuf,
    policy: WalkPolicy,
    metrics: Option<Metrics>,
    recursive_root: Option<PathBuf>,
}

impl Units {
    fn record_walk_error(&self, path: Option<&Path>, error: &dyn std::fmt::Display) {
        warn!(
            error = %error,
            path = ?path,
            "skipping directory that could not be listed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_walk_error();
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.policy.skip_dirs.iter().any(|skip| skip == name)
    }

    fn is_special(&self, name: &str) -> bool {
        self.policy.special_dirs.iter().any(|special| special == name)
    }

    fn inside_recursive_root(&mut self, path: &Path) -> bool {
        match &self.recursive_root {
            Some(active) if path.starts_with(active) => true,
            Some(_) => {
                self.recursive_root = None;
                false
            }
            None => false,
        }
    }
}

impl Iterator for Units {
    type Item = DirectoryUnit;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_walk_error(err.path(), &err);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let depth = entry.depth();
            let name = entry.file_name().to_string_lossy().into_owned();
            if depth > 0 && self.is_skipped(&name) {
                debug!(path = %entry.path().display(), "skip-listed directory");
                self.walker.skip_current_dir();
                continue;
            }

            let relative_path = if depth == 0 {
                PathBuf::from(".")
            } else {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map_or_else(|_| PathBuf::from(&name), Path::to_path_buf)
            };
            if self.policy.no_hidden
                && depth > 0
                && codec::is_hidden(&codec::stem_for(&relative_path))
            {
                self.walker.skip_current_dir();
                continue;
            }

            let path = entry.path().to_path_buf();
            if depth > 0 && self.inside_recursive_root(&path) {
                return Some(DirectoryUnit {
                    path,
                    relative_path,
                    files: Vec::new(),
                    flat_size: 0,
                    kind: UnitKind::RecursiveChild,
                });
            }

            let (files, flat_size) = match list_files(&path) {
                Ok(listing) => listing,
                Err(err) => {
                    self.record_walk_error(Some(&path), &err);
                    self.walker.skip_current_dir();
                    continue;
                }
            };

            let kind = if depth > 0 && self.is_special(&name) {
                self.recursive_root = Some(path.clone());
                UnitKind::RecursiveRoot
            } else {
                UnitKind::Standalone
            };

            return Some(DirectoryUnit {
                path,
                relative_path,
                files,
                flat_size,
                kind,
            });
        }
    }
}

fn list_files(dir: &Path) -> io::Result<(Vec<OsString>, u64)> {
    let mut files = Vec::new();
    let mut flat_size = 0_u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_file() {
            flat_size = flat_size.saturating_add(entry.metadata()?.len());
        }
        files.push(entry.file_name());
    }
    files.sort();
    Ok((files, flat_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_test_support::fixtures::write_tree;
    use tempfile::TempDir;

    type TestResult<T> = anyhow::Result<T>;

    fn walk(root: &Path, policy: WalkPolicy) -> Vec<DirectoryUnit> {
        Classifier::new(root, policy).units().collect()
    }

    fn relative(units: &[DirectoryUnit]) -> Vec<String> {
        units
            .iter()
            .map(|unit| unit.relative_path.display().to_string())
            .collect()
    }

    #[test]
    fn units_are_pre_order_with_flat_listings() -> TestResult<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("data");
        write_tree(
            &root,
            &[
                ("a.txt", b"0123456789"),
                ("sub/b.txt", &[7_u8; 20]),
                ("sub/inner/c.txt", b"c"),
            ],
        )?;
        fs::create_dir_all(root.join("empty"))?;

        let units = walk(&root, WalkPolicy::default());
        assert_eq!(relative(&units), [".", "empty", "sub", "sub/inner"]);
        assert!(units[0].is_root());
        assert_eq!(units[0].files, [OsString::from("a.txt")]);
        assert_eq!(units[0].flat_size, 10);
        assert!(units[1].files.is_empty());
        assert_eq!(units[2].flat_size, 20);
        assert!(units.iter().all(|unit| unit.kind == UnitKind::Standalone));
        Ok(())
    }

    #[test]
    fn special_directory_covers_all_descendants() -> TestResult<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("repo");
        write_tree(
            &root,
            &[
                ("README", b"r"),
                (".git/HEAD", b"ref"),
                (".git/objects/ab/cdef", b"blob"),
                ("src/main.rs", b"fn main() {}"),
            ],
        )?;

        let units = walk(&root, WalkPolicy::default());
        let kinds: Vec<(String, UnitKind)> = units
            .iter()
            .map(|unit| (unit.relative_path.display().to_string(), unit.kind))
            .collect();
        assert_eq!(
            kinds,
            [
                (".".to_string(), UnitKind::Standalone),
                (".git".to_string(), UnitKind::RecursiveRoot),
                (".git/objects".to_string(), UnitKind::RecursiveChild),
                (".git/objects/ab".to_string(), UnitKind::RecursiveChild),
                ("src".to_string(), UnitKind::Standalone),
            ]
        );
        Ok(())
    }

    #[test]
    fn skip_list_and_hidden_filter_prune_subtrees() -> TestResult<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("data");
        write_tree(
            &root,
            &[
                (".snapshot/daily/x", b"x"),
                (".cache/deep/y", b"y"),
                ("visible/z", b"z"),
            ],
        )?;

        let all = walk(&root, WalkPolicy::default());
        assert_eq!(relative(&all), [".", ".cache", ".cache/deep", "visible"]);

        let policy = WalkPolicy {
            no_hidden: true,
            ..WalkPolicy::default()
        };
        assert_eq!(relative(&walk(&root, policy)), [".", "visible"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_counted_and_skipped() -> TestResult<()> {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            return Ok(());
        }
        let temp = TempDir::new()?;
        let root = temp.path().join("data");
        write_tree(&root, &[("locked/secret", b"s"), ("open/file", b"f")])?;
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        let metrics = Metrics::new()?;
        let units: Vec<_> = Classifier::new(&root, WalkPolicy::default())
            .with_metrics(Some(metrics.clone()))
            .units()
            .collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        assert_eq!(relative(&units), [".", "open"]);
        assert_eq!(metrics.snapshot().walk_errors, 1);
        Ok(())
    }

    #[test]
    fn root_stem_uses_directory_name() {
        assert_eq!(root_stem(Path::new("/srv/data")), "data");
        assert_ne!(root_stem(Path::new(".")), "");
    }
}
