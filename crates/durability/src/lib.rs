//! Durability layer for keeperlog
//!
//! This crate handles everything that touches disk:
//!
//! - Binary record codec: length-prefixed, checksummed transaction frames
//! - WAL: segmented transaction log named by first zxid, with preallocation,
//!   pluggable roll policies and cross-segment replay iterators
//! - Durability modes: Always (default), Standard, Flush
//! - Snapshots: crash-safe write-fsync-rename files holding a tree image
//!
//! Nothing here knows what a transaction does. Applying them is the job of
//! `keeperlog-storage`; deciding what to replay is the job of
//! `keeperlog-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod snapshot;
pub mod wal;

pub use format::{FileHeader, FileHeaderError, FrameError, TxnFrame, MAX_RECORD_SIZE};
pub use snapshot::{
    LoadedSnapshot, SnapshotError, SnapshotFile, SnapshotInfo, SnapshotReader, SnapshotWriter,
};
pub use wal::{
    select_log_files, DurabilityMode, LogFile, NeverRoll, RollAtSize, RollEveryN, RollPolicy,
    SegmentStats, TxnIterator, TxnLog, WalConfig, WalConfigError, WalCounters, WalError,
};
