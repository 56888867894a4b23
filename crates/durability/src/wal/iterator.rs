//! Cross-segment transaction iterator.
//!
//! The iterator walks a fixed, ascending list of segments chosen up front by
//! [`select_log_files`](super::select_log_files) and concatenates their record
//! streams. The only state carried between segments is which one is current.

use super::segment::SegmentReader;
use super::{LogFile, WalError};
use keeperlog_core::{Txn, TxnHeader, Zxid};
use std::io;
use tracing::{debug, warn};

/// Iterator over logged transactions in zxid order
pub struct TxnIterator {
    files: Vec<LogFile>,
    next_file: usize,
    reader: Option<SegmentReader>,
    current: Option<(TxnHeader, Txn)>,
    storage_size: u64,
}

impl TxnIterator {
    /// Position at the first record with `zxid >= since`.
    ///
    /// Without `fast_forward`, or when no such record survives in `files`,
    /// the iterator sits on the first record of the earliest readable
    /// segment. Callers must compare [`header`](Self::header) with what they
    /// expected.
    pub(crate) fn new(files: Vec<LogFile>, since: Zxid, fast_forward: bool) -> Result<Self, WalError> {
        let mut iter = Self::start(files.clone())?;
        if !fast_forward {
            return Ok(iter);
        }

        while let Some((header, _)) = &iter.current {
            if header.zxid >= since {
                return Ok(iter);
            }
            iter.advance()?;
        }

        debug!(since, "No logged transaction at or after requested zxid");
        Self::start(files)
    }

    fn start(files: Vec<LogFile>) -> Result<Self, WalError> {
        let mut iter = TxnIterator {
            files,
            next_file: 0,
            reader: None,
            current: None,
            storage_size: 0,
        };
        iter.advance()?;
        Ok(iter)
    }

    /// Move to the next record. Returns `false` once the log is exhausted.
    pub fn advance(&mut self) -> Result<bool, WalError> {
        loop {
            if let Some(reader) = self.reader.as_mut() {
                if let Some(record) = reader.next_txn()? {
                    self.current = Some(record);
                    return Ok(true);
                }
                self.reader = None;
            }
            if !self.open_next()? {
                self.current = None;
                return Ok(false);
            }
        }
    }

    fn open_next(&mut self) -> Result<bool, WalError> {
        while self.next_file < self.files.len() {
            let file = &self.files[self.next_file];
            self.next_file += 1;
            match SegmentReader::open(&file.path, file.first_zxid) {
                Ok(reader) => {
                    self.storage_size += reader.file_size();
                    self.reader = Some(reader);
                    return Ok(true);
                }
                Err(WalError::InvalidHeader { path, source }) => {
                    warn!(path = %path.display(), error = %source, "Skipping log segment with invalid header");
                }
                Err(WalError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %file.path.display(), "Log segment disappeared before it could be read");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Header of the current record
    pub fn header(&self) -> Option<&TxnHeader> {
        self.current.as_ref().map(|(h, _)| h)
    }

    /// Body of the current record
    pub fn txn(&self) -> Option<&Txn> {
        self.current.as_ref().map(|(_, t)| t)
    }

    /// Current record
    pub fn current(&self) -> Option<(&TxnHeader, &Txn)> {
        self.current.as_ref().map(|(h, t)| (h, t))
    }

    /// Total on-disk size of the segments opened so far
    pub fn storage_size(&self) -> u64 {
        self.storage_size
    }

    /// Segments this iterator walks
    pub fn files(&self) -> &[LogFile] {
        &self.files
    }
}
