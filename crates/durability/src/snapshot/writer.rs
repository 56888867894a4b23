//! Crash-safe snapshot writer
//!
//! Uses the write-fsync-rename pattern for atomic snapshot creation.
//!
//! # Crash Safety
//!
//! 1. Write to a temporary file (`.snapshot.<zxid>.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final path (`snapshot.<zxid>`)
//! 4. fsync the parent directory
//!
//! Either the complete snapshot exists or it doesn't.
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────┬──────────────────┬──────────────────┬─────────────┬──────────┐
//! │ File Header (16) │ Tagged zxid (8)  │ Payload len (8)  │ Payload     │ CRC32 (4)│
//! └──────────────────┴──────────────────┴──────────────────┴─────────────┴──────────┘
//! ```
//!
//! The CRC covers everything before it.

use super::SnapshotError;
use crate::format::{snapshot_file_name, snapshot_temp_name, FileHeader};
use keeperlog_core::Zxid;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Snapshot writer with crash-safe semantics
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    snap_dir: PathBuf,
    dbid: u64,
}

impl SnapshotWriter {
    /// Create a new snapshot writer
    ///
    /// Creates the snapshot directory if it doesn't exist.
    pub fn new(snap_dir: impl Into<PathBuf>, dbid: u64) -> Result<Self, SnapshotError> {
        let snap_dir = snap_dir.into();
        std::fs::create_dir_all(&snap_dir)?;
        Ok(SnapshotWriter { snap_dir, dbid })
    }

    /// Get the snapshot directory
    pub fn snap_dir(&self) -> &Path {
        &self.snap_dir
    }

    /// Write `payload` as the snapshot tagged `tagged_zxid`.
    ///
    /// The payload is produced by the caller from a copied view of the tree,
    /// so this never holds any lock the append path needs.
    pub fn write(&self, payload: &[u8], tagged_zxid: Zxid) -> Result<SnapshotInfo, SnapshotError> {
        let final_path = self.snap_dir.join(snapshot_file_name(tagged_zxid));
        let temp_path = self.snap_dir.join(snapshot_temp_name(tagged_zxid));

        let mut bytes = Vec::with_capacity(payload.len() + 40);
        bytes.extend_from_slice(&FileHeader::snapshot(self.dbid).to_bytes());
        bytes.extend_from_slice(&tagged_zxid.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes);
        let crc = hasher.finalize();
        bytes.extend_from_slice(&crc.to_le_bytes());

        // Step 1: Write to temporary file
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;

        // Step 2: fsync the file
        file.sync_all()?;
        drop(file);

        // Step 3: Atomic rename
        std::fs::rename(&temp_path, &final_path)?;

        // Step 4: fsync parent directory
        File::open(&self.snap_dir)?.sync_all()?;

        info!(
            zxid = format!("{:#x}", tagged_zxid),
            bytes = bytes.len(),
            path = %final_path.display(),
            "Snapshot written"
        );

        Ok(SnapshotInfo {
            tagged_zxid,
            path: final_path,
            size: bytes.len() as u64,
            crc,
        })
    }

    /// Remove temporary files left behind by interrupted writes.
    pub fn cleanup_temp_files(&self) -> Result<usize, SnapshotError> {
        let mut count = 0;

        if !self.snap_dir.exists() {
            return Ok(0);
        }

        for entry in std::fs::read_dir(&self.snap_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".snapshot.") && name.ends_with(".tmp") {
                std::fs::remove_file(entry.path())?;
                debug!(file = %name, "Removed incomplete snapshot");
                count += 1;
            }
        }

        Ok(count)
    }
}

/// Information about a written snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// zxid the snapshot is tagged with
    pub tagged_zxid: Zxid,
    /// Path to the snapshot file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// CRC32 stored in the file
    pub crc: u32,
}
