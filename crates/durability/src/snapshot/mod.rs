//! Snapshot files
//!
//! A snapshot stores an opaque tree image tagged with the zxid the tree had
//! reached when the image was taken. The tag is a lower bound: the image may
//! already contain some later transactions.

pub mod reader;
pub mod writer;

pub use reader::{LoadedSnapshot, SnapshotFile, SnapshotReader};
pub use writer::{SnapshotInfo, SnapshotWriter};

use std::path::PathBuf;

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem failure
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot files exist but none passed validation
    #[error("no usable snapshot in {} ({tried} tried)", .dir.display())]
    NoUsableSnapshot {
        /// Snapshot directory
        dir: PathBuf,
        /// Files examined
        tried: usize,
    },

    /// A snapshot file failed validation
    #[error("invalid snapshot {}: {reason}", .path.display())]
    Invalid {
        /// File path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },
}
