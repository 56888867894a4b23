//! Error type for the persistence engine

use keeperlog_core::Zxid;
use keeperlog_durability::{SnapshotError, WalError};
use keeperlog_storage::ImageError;
use std::path::PathBuf;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors that stop startup or live processing.
///
/// Per-transaction failures are never reported here; they come back as
/// [`Outcome`](keeperlog_core::Outcome) values.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem error outside the log and snapshot layers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transaction log failure
    #[error("transaction log error: {0}")]
    Wal(#[from] WalError),

    /// Snapshot file failure
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Snapshot payload could not be encoded or decoded
    #[error("tree image error: {0}")]
    Image(#[from] ImageError),

    /// A data directory is missing and autocreate is disabled
    #[error("missing data directory {} (autocreate is disabled)", .path.display())]
    MissingDirectory {
        /// Directory that was expected
        path: PathBuf,
    },

    /// Another process holds the directory lock
    #[error("data directory {} is locked by another process", .path.display())]
    DirectoryLocked {
        /// Lock file that could not be acquired
        path: PathBuf,
    },

    /// The log does not continue from the loaded snapshot
    #[error("log gap: expected zxid {expected:#x}, found {found:#x}")]
    LogGap {
        /// First zxid replay needed
        expected: Zxid,
        /// First zxid the log could provide
        found: Zxid,
    },

    /// Configuration could not be read or is invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl PersistenceError {
    /// True when the error means on-disk state cannot be trusted
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            PersistenceError::LogGap { .. }
                | PersistenceError::Snapshot(SnapshotError::NoUsableSnapshot { .. })
        )
    }
}
