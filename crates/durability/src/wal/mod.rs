//! Write-ahead transaction log
//!
//! - `config`: WAL configuration (WalConfig, WalConfigError)
//! - `mode`: when commits fsync (DurabilityMode)
//! - `roll`: segment roll policies
//! - `segment`: tail segment writer and single-segment reader
//! - `iterator`: cross-segment replay iterator
//! - `manager`: the log itself (TxnLog)

pub mod config;
pub mod iterator;
pub mod manager;
pub mod mode;
pub mod roll;
pub mod segment;

pub use config::{WalConfig, WalConfigError};
pub use iterator::TxnIterator;
pub use manager::{list_log_files, select_log_files, LogFile, TxnLog, WalCounters};
pub use mode::DurabilityMode;
pub use roll::{NeverRoll, RollAtSize, RollEveryN, RollPolicy, SegmentStats};
pub use segment::{LogSegment, SegmentReader};

use crate::format::FileHeaderError;
use keeperlog_core::Zxid;
use std::path::PathBuf;

/// Transaction log errors
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// Filesystem failure
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Segment header missing or wrong
    #[error("invalid log segment header in {}: {source}", .path.display())]
    InvalidHeader {
        /// Segment path
        path: PathBuf,
        /// What was wrong
        #[source]
        source: FileHeaderError,
    },

    /// Encoded record exceeds what the reader accepts
    #[error("record for zxid {zxid:#x} is {size} bytes, maximum is {max}")]
    RecordTooLarge {
        /// Transaction id of the refused record
        zxid: Zxid,
        /// Encoded length
        size: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Configuration rejected by `WalConfig::validate`
    #[error("invalid WAL configuration: {0}")]
    Config(#[from] WalConfigError),
}
