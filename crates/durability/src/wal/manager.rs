//! Transaction log manager.
//!
//! [`TxnLog`] owns a log directory: it appends to the tail segment, rolls when
//! the [`RollPolicy`] says so, and hands out [`TxnIterator`]s for replay.

use super::iterator::TxnIterator;
use super::roll::RollPolicy;
use super::segment::{LogSegment, SegmentReader};
use super::{WalConfig, WalError};
use crate::format::{sorted_files, TxnFrame, LOG_PREFIX, MAX_RECORD_SIZE};
use keeperlog_core::{Txn, TxnHeader, Zxid};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A log segment on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// zxid in the file name
    pub first_zxid: Zxid,
    /// Full path
    pub path: PathBuf,
}

/// Cumulative WAL operation counters.
///
/// These counters accumulate over the lifetime of the [`TxnLog`] and are
/// never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Records appended
    pub appends: u64,
    /// fsync calls, including those made when closing a rolled segment
    pub sync_calls: u64,
    /// Frame bytes written
    pub bytes_written: u64,
    /// Nanoseconds spent in fsync
    pub sync_nanos: u64,
    /// Segments rolled
    pub rolls: u64,
}

/// Segments that may hold records with `zxid >= since`.
///
/// Every segment starting at or after `since`, plus the newest segment
/// starting strictly before it, whose tail may run past `since`. `files` must
/// be sorted by `first_zxid`.
pub fn select_log_files(files: &[LogFile], since: Zxid) -> Vec<LogFile> {
    let log_zxid = files
        .iter()
        .map(|f| f.first_zxid)
        .filter(|&z| z < since)
        .max()
        .unwrap_or(0);
    files
        .iter()
        .filter(|f| f.first_zxid >= log_zxid)
        .cloned()
        .collect()
}

/// Write-ahead transaction log over one directory.
///
/// Appends are not visible to readers until [`commit`](Self::commit) has
/// flushed them.
pub struct TxnLog {
    log_dir: PathBuf,
    config: WalConfig,
    roll_policy: Box<dyn RollPolicy>,
    tail: Option<LogSegment>,
    last_zxid_seen: Zxid,
    commits_since_sync: usize,
    last_sync: Instant,
    counters: WalCounters,
}

impl TxnLog {
    /// Open the log in `log_dir`, creating the directory if needed.
    ///
    /// No segment is opened until the first append, which names the new
    /// segment after its own zxid.
    pub fn open(
        log_dir: impl Into<PathBuf>,
        config: WalConfig,
        roll_policy: Box<dyn RollPolicy>,
    ) -> Result<Self, WalError> {
        config.validate()?;
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;
        debug!(dir = %log_dir.display(), mode = config.durability.description(), "Opened transaction log");

        Ok(TxnLog {
            log_dir,
            config,
            roll_policy,
            tail: None,
            last_zxid_seen: 0,
            commits_since_sync: 0,
            last_sync: Instant::now(),
            counters: WalCounters::default(),
        })
    }

    /// Append a transaction to the tail segment.
    ///
    /// Rolls first if the policy asks for it. The record is buffered; call
    /// [`commit`](Self::commit) to make it durable. A record the reader would
    /// reject as oversized is refused before anything is written.
    pub fn append(&mut self, header: &TxnHeader, txn: &Txn) -> Result<(), WalError> {
        let frame = TxnFrame::encode(header, txn);
        // Length word value: everything but itself and the trailing CRC.
        let size = frame.len() - 8;
        if size > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                zxid: header.zxid,
                size,
                max: MAX_RECORD_SIZE,
            });
        }

        if header.zxid <= self.last_zxid_seen {
            warn!(
                zxid = header.zxid,
                last = self.last_zxid_seen,
                op = %txn.op_code(),
                "Appended zxid does not increase"
            );
        } else {
            self.last_zxid_seen = header.zxid;
        }

        let roll = self
            .tail
            .as_ref()
            .map(|tail| self.roll_policy.should_roll(&tail.stats(), header))
            .unwrap_or(false);
        if roll {
            self.roll_log()?;
        }

        if self.tail.is_none() {
            info!(first_zxid = header.zxid, dir = %self.log_dir.display(), "Creating new log segment");
            self.tail = Some(LogSegment::create(&self.log_dir, header.zxid, &self.config)?);
        }

        if let Some(tail) = self.tail.as_mut() {
            tail.append(&frame)?;
        }
        self.counters.appends += 1;
        self.counters.bytes_written += frame.len() as u64;
        Ok(())
    }

    /// Close the tail segment; the next append starts a new one.
    pub fn roll_log(&mut self) -> Result<(), WalError> {
        if let Some(mut tail) = self.tail.take() {
            let start = Instant::now();
            tail.close()?;
            self.record_sync(start);
            self.counters.rolls += 1;
            debug!(first_zxid = tail.first_zxid(), bytes = tail.size(), "Rolled log segment");
        }
        Ok(())
    }

    /// Flush appended records and fsync as the durability mode requires.
    pub fn commit(&mut self) -> Result<(), WalError> {
        let Some(tail) = self.tail.as_mut() else {
            return Ok(());
        };
        tail.flush()?;
        self.commits_since_sync += 1;

        if self
            .config
            .durability
            .should_sync(self.commits_since_sync, self.last_sync.elapsed())
        {
            let start = Instant::now();
            tail.sync()?;
            self.record_sync(start);
        }
        Ok(())
    }

    fn record_sync(&mut self, start: Instant) {
        self.counters.sync_calls += 1;
        self.counters.sync_nanos += start.elapsed().as_nanos() as u64;
        self.commits_since_sync = 0;
        self.last_sync = Instant::now();
    }

    /// Flush, fsync and close the tail.
    pub fn close(&mut self) -> Result<(), WalError> {
        if let Some(mut tail) = self.tail.take() {
            let start = Instant::now();
            tail.close()?;
            self.record_sync(start);
        }
        Ok(())
    }

    /// All log segments in the directory, ascending by first zxid
    pub fn log_files(&self) -> Result<Vec<LogFile>, WalError> {
        list_log_files(&self.log_dir)
    }

    /// Segments that may hold records with `zxid >= since`
    pub fn get_log_files(&self, since: Zxid) -> Result<Vec<LogFile>, WalError> {
        Ok(select_log_files(&self.log_files()?, since))
    }

    /// Iterator positioned at the first record with `zxid >= since`.
    pub fn read(&self, since: Zxid) -> Result<TxnIterator, WalError> {
        self.read_from(since, true)
    }

    /// Iterator over the segments selected for `since`.
    ///
    /// With `fast_forward == false` the iterator starts at the first record
    /// of the earliest selected segment.
    pub fn read_from(&self, since: Zxid, fast_forward: bool) -> Result<TxnIterator, WalError> {
        TxnIterator::new(self.get_log_files(since)?, since, fast_forward)
    }

    /// zxid of the last readable record, or 0 for an empty log.
    ///
    /// Scans segments newest first and stops at the first one holding any
    /// readable record.
    pub fn last_logged_zxid(&self) -> Result<Zxid, WalError> {
        for file in self.log_files()?.iter().rev() {
            let mut reader = match SegmentReader::open(&file.path, file.first_zxid) {
                Ok(reader) => reader,
                Err(WalError::InvalidHeader { path, source }) => {
                    warn!(path = %path.display(), error = %source, "Skipping log segment with invalid header");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut last = None;
            while let Some((header, _)) = reader.next_txn()? {
                last = Some(header.zxid);
            }
            if let Some(zxid) = last {
                return Ok(zxid);
            }
        }
        Ok(0)
    }

    /// Snapshot of cumulative counters
    pub fn counters(&self) -> WalCounters {
        self.counters.clone()
    }

    /// Log directory
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// First zxid of the open tail segment, if any
    pub fn current_segment(&self) -> Option<Zxid> {
        self.tail.as_ref().map(LogSegment::first_zxid)
    }

    /// Active configuration
    pub fn config(&self) -> &WalConfig {
        &self.config
    }
}

impl Drop for TxnLog {
    fn drop(&mut self) {
        if let Some(tail) = self.tail.as_mut() {
            let _ = tail.flush();
        }
    }
}

/// All log segments in `dir`, ascending by first zxid
pub fn list_log_files(dir: &Path) -> Result<Vec<LogFile>, WalError> {
    Ok(sorted_files(dir, LOG_PREFIX)?
        .into_iter()
        .map(|(first_zxid, path)| LogFile { first_zxid, path })
        .collect())
}
