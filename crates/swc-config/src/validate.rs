//! Parsing helpers for command-line supplied values.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::model::ObjectMetadata;

const MEGA: u64 = 1_000_000;
const GIGA: u64 = 1_000_000_000;

/// Parse a byte count written as digits with an optional `M` or `G` suffix.
///
/// Suffixes are decimal (`10M` is ten million bytes) and case-insensitive.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the suffix is unknown, the
/// number is malformed, or the result overflows.
pub fn parse_size(value: &str) -> ConfigResult<u64> {
    let trimmed = value.trim();
    let Some(last) = trimmed.chars().last() else {
        return Err(ConfigError::invalid("size", value, "empty size"));
    };

    let (digits, multiplier) = match last.to_ascii_uppercase() {
        'M' => (&trimmed[..trimmed.len() - 1], MEGA),
        'G' => (&trimmed[..trimmed.len() - 1], GIGA),
        c if c.is_ascii_digit() => (trimmed, 1),
        _ => return Err(ConfigError::invalid("size", value, "unknown size suffix")),
    };

    let base = digits
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid("size", value, "size must be a whole number"))?;
    base.checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid("size", value, "size is too large"))
}

/// Parse a `key:value` metadata pair.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] unless the input holds exactly one
/// colon separating a non-empty key from the value.
pub fn parse_metadata(value: &str) -> ConfigResult<ObjectMetadata> {
    let mut parts = value.split(':');
    let (Some(key), Some(meta), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ConfigError::invalid(
            "metadata",
            value,
            "expected exactly one ':' between key and value",
        ));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::invalid("metadata", value, "metadata key is empty"));
    }
    Ok(ObjectMetadata {
        key: key.to_string(),
        value: meta.trim().to_string(),
    })
}

/// Parse a worker count, rejecting zero.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for zero or non-numeric input.
pub fn parse_parallelism(value: &str) -> ConfigResult<NonZeroUsize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ConfigError::invalid("parallelism", value, "must be at least 1"))
}

/// Check that `path` is an accessible directory and strip trailing slashes.
///
/// # Errors
///
/// Returns [`ConfigError::Directory`] when the path cannot be inspected and
/// [`ConfigError::NotADirectory`] when it is something else.
pub fn resolve_directory(path: &Path) -> ConfigResult<PathBuf> {
    let metadata = fs::metadata(path).map_err(|source| ConfigError::Directory {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(strip_trailing_slashes(path))
}

fn strip_trailing_slashes(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}
