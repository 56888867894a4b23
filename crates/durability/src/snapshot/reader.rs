//! Snapshot reader for recovery
//!
//! Loads and validates snapshot files, falling back to older snapshots when
//! the newest is damaged.

use super::SnapshotError;
use crate::format::{sorted_files, FileHeader, FILE_HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_PREFIX};
use byteorder::{ByteOrder, LittleEndian};
use keeperlog_core::Zxid;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Smallest possible snapshot: header, zxid, length, CRC
const MIN_SNAPSHOT_SIZE: usize = FILE_HEADER_SIZE + 8 + 8 + 4;

/// A snapshot file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// zxid in the file name
    pub zxid: Zxid,
    /// Full path
    pub path: PathBuf,
}

/// Validated snapshot contents
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// zxid the snapshot is tagged with
    pub tagged_zxid: Zxid,
    /// Database id from the header
    pub dbid: u64,
    /// Serialized tree image
    pub payload: Vec<u8>,
    /// File the snapshot came from
    pub path: PathBuf,
}

/// Snapshot reader for recovery
pub struct SnapshotReader {
    snap_dir: PathBuf,
}

impl SnapshotReader {
    /// Create a reader over `snap_dir`
    pub fn new(snap_dir: impl Into<PathBuf>) -> Self {
        SnapshotReader {
            snap_dir: snap_dir.into(),
        }
    }

    /// Snapshot files ascending by zxid. A missing directory has none.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotFile>, SnapshotError> {
        if !self.snap_dir.exists() {
            return Ok(Vec::new());
        }
        Ok(sorted_files(&self.snap_dir, SNAPSHOT_PREFIX)?
            .into_iter()
            .map(|(zxid, path)| SnapshotFile { zxid, path })
            .collect())
    }

    /// Load and validate one snapshot file.
    ///
    /// Checks size, magic, version, the tag against the file name, the
    /// payload length, and the CRC.
    pub fn load(&self, file: &SnapshotFile) -> Result<LoadedSnapshot, SnapshotError> {
        let bytes = std::fs::read(&file.path)?;
        let invalid = |reason: String| SnapshotError::Invalid {
            path: file.path.clone(),
            reason,
        };

        if bytes.len() < MIN_SNAPSHOT_SIZE {
            return Err(invalid(format!("file too small: {} bytes", bytes.len())));
        }

        let header = FileHeader::from_bytes(&bytes[..FILE_HEADER_SIZE], SNAPSHOT_MAGIC)
            .map_err(|e| invalid(e.to_string()))?;

        let tag_at = FILE_HEADER_SIZE;
        let tagged_zxid = LittleEndian::read_u64(&bytes[tag_at..tag_at + 8]);
        if tagged_zxid != file.zxid {
            return Err(invalid(format!(
                "tag {:#x} does not match file name {:#x}",
                tagged_zxid, file.zxid
            )));
        }

        let payload_at = tag_at + 16;
        let payload_len = LittleEndian::read_u64(&bytes[tag_at + 8..payload_at]);
        let available = (bytes.len() - payload_at - 4) as u64;
        if payload_len != available {
            return Err(invalid(format!(
                "payload length {} but {} bytes present",
                payload_len, available
            )));
        }

        let crc_at = bytes.len() - 4;
        let stored = LittleEndian::read_u32(&bytes[crc_at..]);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[..crc_at]);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(invalid(format!(
                "CRC mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        Ok(LoadedSnapshot {
            tagged_zxid,
            dbid: header.dbid,
            payload: bytes[payload_at..crc_at].to_vec(),
            path: file.path.clone(),
        })
    }

    /// Newest snapshot that passes validation.
    ///
    /// Returns `Ok(None)` when there are no snapshot files at all and
    /// `NoUsableSnapshot` when there are some but every one is damaged.
    pub fn load_newest(&self) -> Result<Option<LoadedSnapshot>, SnapshotError> {
        let files = self.list_snapshots()?;
        if files.is_empty() {
            return Ok(None);
        }

        let mut tried = 0;
        for file in files.iter().rev() {
            tried += 1;
            match self.load(file) {
                Ok(snapshot) => {
                    debug!(zxid = format!("{:#x}", snapshot.tagged_zxid), "Loaded snapshot");
                    return Ok(Some(snapshot));
                }
                Err(SnapshotError::Invalid { path, reason }) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping invalid snapshot");
                }
                Err(e) => return Err(e),
            }
        }

        Err(SnapshotError::NoUsableSnapshot {
            dir: self.snap_dir.clone(),
            tried,
        })
    }

    /// Up to `n` valid snapshots, newest first.
    pub fn find_valid_snapshots(&self, n: usize) -> Result<Vec<SnapshotFile>, SnapshotError> {
        let mut valid = Vec::new();
        for file in self.list_snapshots()?.into_iter().rev() {
            if valid.len() >= n {
                break;
            }
            match self.load(&file) {
                Ok(_) => valid.push(file),
                Err(SnapshotError::Invalid { path, reason }) => {
                    debug!(path = %path.display(), reason = %reason, "Invalid snapshot ignored");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(valid)
    }

    /// Snapshot directory
    pub fn snap_dir(&self) -> &Path {
        &self.snap_dir
    }
}
