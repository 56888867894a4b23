//! Log segment files.
//!
//! A segment is named after the first zxid it holds and starts with a
//! [`FileHeader`]. Records follow back to back as [`TxnFrame`]s.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (16 bytes, "ZKLG")     │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! ├────────────────────────────────────┤
//! │ Frame N                            │
//! ├────────────────────────────────────┤
//! │ Zero padding (preallocated)        │
//! └────────────────────────────────────┘
//! ```

use super::roll::SegmentStats;
use super::{WalConfig, WalError};
use crate::format::{
    log_file_name, FileHeader, FrameError, TxnFrame, FILE_HEADER_SIZE, LOG_MAGIC,
};
use keeperlog_core::{Txn, TxnHeader, Zxid};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Writable tail segment.
///
/// Only the tail is ever written; once closed a segment is immutable.
pub struct LogSegment {
    /// Buffered file handle
    file: BufWriter<File>,

    /// Path to segment file
    path: PathBuf,

    /// zxid in the file name
    first_zxid: Zxid,

    /// End of written data (header included)
    position: u64,

    /// Current file length on disk, padding included
    allocated: u64,

    /// Extension block size, 0 for none
    preallocate_size: u64,

    /// Records appended
    records: u64,

    /// Whether this segment is closed (immutable)
    closed: bool,
}

impl LogSegment {
    /// Create a new segment and durably write its header.
    ///
    /// An existing file with the same name is replaced: restore only hands out
    /// zxids above everything readable, so whatever it held was never applied.
    pub fn create(dir: &Path, first_zxid: Zxid, config: &WalConfig) -> Result<Self, WalError> {
        let path = dir.join(log_file_name(first_zxid));
        if path.exists() {
            warn!(path = %path.display(), "Replacing existing log segment");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)?;

        file.write_all(&FileHeader::log(config.dbid).to_bytes())?;
        file.sync_all()?;
        File::open(dir)?.sync_all()?;

        debug!(path = %path.display(), first_zxid, "Created log segment");

        Ok(LogSegment {
            file: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            path,
            first_zxid,
            position: FILE_HEADER_SIZE as u64,
            allocated: FILE_HEADER_SIZE as u64,
            preallocate_size: config.preallocate_size,
            records: 0,
            closed: false,
        })
    }

    /// Append one encoded frame.
    ///
    /// When the frame would run past the preallocated length, buffered bytes
    /// are flushed before the file is extended, so the zero fill can never
    /// land ahead of data still sitting in the buffer.
    pub fn append(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Cannot write to closed segment",
            ));
        }

        let end = self.position + frame.len() as u64;
        if self.preallocate_size > 0 && end > self.allocated {
            self.file.flush()?;
            let mut new_len = self.allocated;
            while new_len < end {
                new_len += self.preallocate_size;
            }
            self.file.get_ref().set_len(new_len)?;
            self.allocated = new_len;
        }

        self.file.write_all(frame)?;
        self.position = end;
        self.records += 1;
        Ok(())
    }

    /// Push buffered bytes to the OS.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()
    }

    /// Mark segment as closed (immutable). Syncs data to disk first.
    pub fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.file.flush()?;
            self.file.get_ref().sync_all()?;
            self.closed = true;
        }
        Ok(())
    }

    /// zxid the segment is named after
    pub fn first_zxid(&self) -> Zxid {
        self.first_zxid
    }

    /// Path of the segment file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written, header included
    pub fn size(&self) -> u64 {
        self.position
    }

    /// Check if segment is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Counters handed to the roll policy
    pub fn stats(&self) -> SegmentStats {
        SegmentStats {
            first_zxid: self.first_zxid,
            records: self.records,
            bytes: self.position,
        }
    }
}

impl Drop for LogSegment {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.file.flush();
        }
    }
}

/// Forward-only reader over one segment.
///
/// Reading stops cleanly at end of file, at zero padding, at a truncated
/// tail, or at the first malformed frame. None of these are errors: they all
/// mean the readable log ends here.
pub struct SegmentReader {
    reader: BufReader<File>,
    path: PathBuf,
    first_zxid: Zxid,
    header: FileHeader,
    file_size: u64,
    position: u64,
    finished: bool,
}

impl SegmentReader {
    /// Open a segment and validate its header.
    pub fn open(path: &Path, first_zxid: Zxid) -> Result<Self, WalError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header =
            FileHeader::read_from(&mut reader, LOG_MAGIC).map_err(|source| WalError::InvalidHeader {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(SegmentReader {
            reader,
            path: path.to_path_buf(),
            first_zxid,
            header,
            file_size,
            position: FILE_HEADER_SIZE as u64,
            finished: false,
        })
    }

    /// Next record, or `None` once the readable part of the segment is done.
    pub fn next_txn(&mut self) -> Result<Option<(TxnHeader, Txn)>, WalError> {
        if self.finished {
            return Ok(None);
        }
        match self.read_frame() {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn read_frame(&mut self) -> Result<Option<(TxnHeader, Txn)>, WalError> {
        let mut len_bytes = [0u8; 4];
        let got = read_full(&mut self.reader, &mut len_bytes)?;
        if got == 0 {
            return Ok(None);
        }
        if got < len_bytes.len() {
            self.log_stop(&FrameError::Truncated);
            return Ok(None);
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if let Err(e) = TxnFrame::check_length(len) {
            self.log_stop(&e);
            return Ok(None);
        }

        let mut rest = vec![0u8; len + 4];
        if read_full(&mut self.reader, &mut rest)? < rest.len() {
            self.log_stop(&FrameError::Truncated);
            return Ok(None);
        }

        match TxnFrame::decode_content(&rest[..len], &rest[len..]) {
            Ok(record) => {
                self.position += 4 + rest.len() as u64;
                Ok(Some(record))
            }
            Err(e) => {
                self.log_stop(&e);
                Ok(None)
            }
        }
    }

    fn log_stop(&self, reason: &FrameError) {
        match reason {
            FrameError::Malformed(detail) => warn!(
                path = %self.path.display(),
                offset = self.position,
                detail = %detail,
                "Malformed log record, treating as end of segment"
            ),
            FrameError::Truncated => debug!(
                path = %self.path.display(),
                offset = self.position,
                "Truncated record at end of segment"
            ),
            FrameError::EndOfLog => debug!(
                path = %self.path.display(),
                offset = self.position,
                "Reached preallocated padding"
            ),
        }
    }

    /// zxid in the file name
    pub fn first_zxid(&self) -> Zxid {
        self.first_zxid
    }

    /// Validated file header
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// File size on disk when opened
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// End offset of the last record returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Path of the segment file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fill `buf` as far as the stream allows; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
