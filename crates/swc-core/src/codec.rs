//! Object names for archives and their inverse.
//!
//! # Design
//! - Names are `[<prefix>/]<stem><tag>.tar.gz`; the tag is empty, `.bundle`
//!   or `.root`. These suffixes are shared with archives already stored, so
//!   they never change.
//! - The tag is carried as [`ArchiveTag`] everywhere inside the process and
//!   only parsed back from a name at the listing boundary.
//! - Decoded paths are sanitised before they touch the local filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Suffix shared by every archive object.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
/// Tag marking a multi-directory bundle.
pub const BUNDLE_TAG: &str = ".bundle";
/// Tag marking an archive whose members are relative to the walk root.
pub const ROOT_TAG: &str = ".root";

/// Naming tag of an archive object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveTag {
    /// One directory, members relative to that directory.
    Plain,
    /// Several directories, members relative to the walk root.
    Bundle,
    /// The walk root or a recursive subtree, members relative to the walk root.
    Root,
}

impl ArchiveTag {
    /// Full suffix appended to the stem.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Plain => ".tar.gz",
            Self::Bundle => ".bundle.tar.gz",
            Self::Root => ".root.tar.gz",
        }
    }

    /// Where archives with this tag are unpacked.
    #[must_use]
    pub const fn extraction_mode(self) -> ExtractionMode {
        match self {
            Self::Plain => ExtractionMode::IntoDirectory,
            Self::Bundle | Self::Root => ExtractionMode::Embedded,
        }
    }
}

/// How an archive's member paths map onto the restore target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Members carry their path below the walk root; unpack at the root.
    Embedded,
    /// Members are relative to one directory named after the object.
    IntoDirectory,
}

/// Result of decoding an archive object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Stem with prefix and suffix removed, `/`-separated.
    pub relative_path: String,
    /// Naming tag recovered from the suffix.
    pub tag: ArchiveTag,
}

impl DecodedName {
    /// Extraction mode implied by the tag.
    #[must_use]
    pub const fn mode(&self) -> ExtractionMode {
        self.tag.extraction_mode()
    }

    /// Directory the archive must be unpacked into below `local_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoded path is absolute or escapes the root.
    pub fn restore_target(&self, local_dir: &Path) -> CoreResult<PathBuf> {
        match self.mode() {
            ExtractionMode::Embedded => Ok(local_dir.to_path_buf()),
            ExtractionMode::IntoDirectory => {
                Ok(local_dir.join(sanitize_relative(&self.relative_path)?))
            }
        }
    }
}

/// Object name for `stem` archived with `tag` below `prefix`.
#[must_use]
pub fn encode(stem: &str, tag: ArchiveTag, prefix: Option<&str>) -> String {
    let name = format!("{stem}{}", tag.suffix());
    match prefix.filter(|prefix| !prefix.is_empty()) {
        Some(prefix) if prefix.ends_with('/') => format!("{prefix}{name}"),
        Some(prefix) => format!("{prefix}/{name}"),
        None => name,
    }
}

/// Recover the stem and tag of an archive object name.
///
/// Returns `None` for names that are not archives.
#[must_use]
pub fn decode(name: &str, prefix: Option<&str>) -> Option<DecodedName> {
    let rest = prefix
        .filter(|prefix| !prefix.is_empty())
        .and_then(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let stem = rest.strip_suffix(ARCHIVE_SUFFIX)?;

    let (relative_path, tag) = if let Some(stem) = stem.strip_suffix(ROOT_TAG) {
        (stem, ArchiveTag::Root)
    } else if let Some(stem) = stem.strip_suffix(BUNDLE_TAG) {
        (stem, ArchiveTag::Bundle)
    } else {
        (stem, ArchiveTag::Plain)
    };
    if relative_path.is_empty() {
        return None;
    }

    Some(DecodedName {
        relative_path: relative_path.to_string(),
        tag,
    })
}

/// Check that `name` decodes back to `tag`.
///
/// A plain archive of a directory named `x.root` or `x.bundle` would be
/// restored as a root or bundle archive, so such names are refused.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] when the name carries another tag.
pub fn ensure_reversible(name: &str, tag: ArchiveTag) -> CoreResult<()> {
    match decode(name, None) {
        Some(decoded) if decoded.tag == tag => Ok(()),
        _ => Err(CoreError::invalid("object_name", "reserved_tag", name)),
    }
}

/// `/`-separated rendering of a relative path used as an object stem.
#[must_use]
pub fn stem_for(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether any component of a `/`-separated name starts with a dot.
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.split('/').any(|part| part.starts_with('.'))
}

/// Reject absolute paths and parent references in a stored name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] when the name is absolute or contains
/// anything other than normal components.
pub fn sanitize_relative(entry: &str) -> CoreResult<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(CoreError::invalid("object_name", "absolute_path", entry));
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => return Err(CoreError::invalid("object_name", "invalid_segment", entry)),
        }
    }

    Ok(sanitized)
}
