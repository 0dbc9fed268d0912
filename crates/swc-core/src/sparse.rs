//! Pre-sized destination files written by independent segment workers.
//!
//! Writers never truncate and only touch their own byte range, so disjoint
//! ranges may be written concurrently in any order.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{CoreError, CoreResult};

/// Create or truncate `path` and extend it to `total_size` bytes.
///
/// The file is sparse where the filesystem supports it.
///
/// # Errors
///
/// Returns an error if the file cannot be created or resized.
pub async fn allocate(path: &Path, total_size: u64) -> CoreResult<()> {
    let file = File::create(path)
        .await
        .map_err(|source| CoreError::io("sparse.create", path, source))?;
    file.set_len(total_size)
        .await
        .map_err(|source| CoreError::io("sparse.set_len", path, source))
}

/// Write `bytes` at `offset` of an allocated file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, positioned or written.
pub async fn write_segment(path: &Path, offset: u64, bytes: &[u8]) -> CoreResult<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .map_err(|source| CoreError::io("sparse.open", path, source))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|source| CoreError::io("sparse.seek", path, source))?;
    file.write_all(bytes)
        .await
        .map_err(|source| CoreError::io("sparse.write", path, source))?;
    file.flush()
        .await
        .map_err(|source| CoreError::io("sparse.flush", path, source))
}
