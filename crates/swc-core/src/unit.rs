//! Directory units produced by the tree walk.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// How a directory takes part in archiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Merged with neighbouring directories into one bundle archive.
    Bundle,
    /// Archived on its own, without descendants.
    Standalone,
    /// Archived together with every descendant.
    RecursiveRoot,
    /// Covered by an ancestor [`UnitKind::RecursiveRoot`]; never archived alone.
    RecursiveChild,
}

/// One directory reached by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUnit {
    /// Path of the directory on disk.
    pub path: PathBuf,
    /// Path relative to the walk root; `.` for the root itself.
    pub relative_path: PathBuf,
    /// Non-directory entries directly inside `path`, sorted by name.
    pub files: Vec<OsString>,
    /// Total size of the regular files in `files`.
    pub flat_size: u64,
    /// Classification of the directory.
    pub kind: UnitKind,
}

impl DirectoryUnit {
    /// Whether this unit is the walk root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.relative_path == Path::new(".")
    }
}
