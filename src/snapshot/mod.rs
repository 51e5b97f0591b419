//! Checksummed binary snapshot files.
//!
//! Layout: `[payload][magic: 4 bytes][blake3(payload): 32 bytes]`. Writes go to a temp file in
//! the target directory, are fsynced and then renamed over the destination, so readers only
//! ever see a complete old file or a complete new one.

pub mod error;

pub use error::{SnapshotError, SnapshotResult};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use rkyv::util::AlignedVec;
use tempfile::NamedTempFile;
use tracing::debug;

/// Alignment of decoded payload buffers handed to `rkyv`.
pub const PAYLOAD_ALIGNMENT: usize = 16;

const CHECKSUM_LEN: usize = blake3::OUT_LEN;

/// Writes `bytes` to `path` atomically (temp file + fsync + rename).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> SnapshotResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SnapshotError::Io(e.error))?;
    Ok(())
}

/// Appends the magic and checksum footer to `payload`.
pub fn frame(magic: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4 + CHECKSUM_LEN);
    out.extend_from_slice(payload);
    out.extend_from_slice(magic);
    out.extend_from_slice(blake3::hash(payload).as_bytes());
    out
}

/// Verifies the footer and returns the payload slice.
pub fn unframe<'a>(magic: &[u8; 4], raw: &'a [u8]) -> SnapshotResult<&'a [u8]> {
    let footer = 4 + CHECKSUM_LEN;
    if raw.len() < footer {
        return Err(SnapshotError::Truncated { len: raw.len() });
    }

    let (payload, tail) = raw.split_at(raw.len() - footer);
    let (found_magic, checksum) = tail.split_at(4);
    if found_magic != magic {
        return Err(SnapshotError::BadMagic);
    }
    if blake3::hash(payload).as_bytes() != checksum {
        return Err(SnapshotError::ChecksumMismatch);
    }
    Ok(payload)
}

/// Frames and writes a snapshot.
pub fn write_snapshot(path: &Path, magic: &[u8; 4], payload: &[u8]) -> SnapshotResult<()> {
    write_atomic(path, &frame(magic, payload))?;
    debug!(path = %path.display(), bytes = payload.len(), "Snapshot written");
    Ok(())
}

/// Maps a snapshot, verifies it and copies the payload into an aligned buffer.
pub fn read_snapshot(
    path: &Path,
    magic: &[u8; 4],
) -> SnapshotResult<AlignedVec<PAYLOAD_ALIGNMENT>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(SnapshotError::Truncated { len: 0 });
    }

    // SAFETY: the map is read-only and dropped before returning; snapshot files are only
    // replaced by rename, never modified in place.
    let mmap = unsafe { Mmap::map(&file)? };
    let payload = unframe(magic, &mmap)?;

    let mut aligned = AlignedVec::<PAYLOAD_ALIGNMENT>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    Ok(aligned)
}
