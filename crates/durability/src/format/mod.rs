//! Binary on-disk formats
//!
//! - `file_header`: 16-byte header shared by log segments and snapshots
//! - `names`: `log.<zxid>` / `snapshot.<zxid>` file naming
//! - `txn_body`: header and body encoding
//! - `txn_frame`: length-prefixed, checksummed record frame

pub mod file_header;
pub mod names;
pub mod txn_body;
pub mod txn_frame;

pub use file_header::{
    FileHeader, FileHeaderError, FILE_FORMAT_VERSION, FILE_HEADER_SIZE, LOG_MAGIC, SNAPSHOT_MAGIC,
};
pub use names::{
    log_file_name, snapshot_file_name, snapshot_temp_name, sorted_files, zxid_from_name,
    LOG_PREFIX, SNAPSHOT_PREFIX, VERSION_DIR,
};
pub use txn_body::TXN_HEADER_SIZE;
pub use txn_frame::{FrameError, TxnFrame, FRAME_FORMAT_VERSION, FRAME_OVERHEAD, MAX_RECORD_SIZE};
