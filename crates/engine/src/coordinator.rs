//! Persistence coordinator
//!
//! Owns the transaction log and the snapshot directory and drives the tree
//! through them:
//!
//! 1. `restore`: newest usable snapshot, then every logged transaction after
//!    its tag, in zxid order
//! 2. `process_transaction`: log, commit, then apply
//! 3. `take_snapshot`: write an image of the tree tagged with its watermark
//!
//! A snapshot's tag is a lower bound on what the image contains, so replay
//! re-applies some transactions the image already reflects. That is safe
//! because `apply_transaction` skips anything at or below the watermark and
//! tolerates failures on the rest.

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use crate::paths::SnapLogPaths;
use keeperlog_core::{Txn, TxnHeader, Zxid};
use keeperlog_durability::{
    LoadedSnapshot, LogFile, SnapshotError, SnapshotInfo, SnapshotReader, SnapshotWriter, TxnLog,
    WalCounters,
};
use keeperlog_storage::{DataTree, TxnResult};
use std::fs::File;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the last restore did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Tag of the snapshot loaded, if any
    pub snapshot_zxid: Option<Zxid>,
    /// Records the iterator produced
    pub records_read: u64,
    /// Records applied to the tree
    pub records_applied: u64,
    /// Records at or below the watermark
    pub records_skipped: u64,
    /// Applied records whose outcome was not `Ok`
    pub failed_outcomes: u64,
    /// Watermark after replay
    pub final_zxid: Zxid,
}

/// Coordinates the log, the snapshots and the tree
pub struct PersistenceCoordinator {
    paths: SnapLogPaths,
    txn_log: TxnLog,
    snap_writer: SnapshotWriter,
    snap_reader: SnapshotReader,
    restore_stats: RestoreStats,
    _lock_file: File,
}

impl PersistenceCoordinator {
    /// Open the directories described by `paths`.
    ///
    /// Creates missing directories when `config.autocreate` is set, takes the
    /// directory lock and opens the log. Nothing is read yet; call
    /// [`restore`](Self::restore).
    pub fn open(paths: SnapLogPaths, config: &PersistenceConfig) -> Result<Self> {
        config.validate()?;
        paths.prepare(config.autocreate)?;
        let lock_file = paths.lock()?;

        let txn_log = TxnLog::open(paths.log_dir(), config.wal_config()?, config.roll_policy())?;
        let snap_writer = SnapshotWriter::new(paths.snap_dir(), config.dbid)?;
        let snap_reader = SnapshotReader::new(paths.snap_dir());

        info!(
            data_dir = %paths.data_dir().display(),
            log_dir = %paths.log_dir().display(),
            durability = %config.durability,
            "Opened persistence directories"
        );

        Ok(PersistenceCoordinator {
            paths,
            txn_log,
            snap_writer,
            snap_reader,
            restore_stats: RestoreStats::default(),
            _lock_file: lock_file,
        })
    }

    /// Rebuild `tree` from disk and return its watermark.
    ///
    /// `tree` should be freshly constructed; it is replaced when a snapshot
    /// is found. A fresh directory restores to watermark 0.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::LogGap`] if any record replayed after the
    ///   snapshot's tag does not directly follow the one before it
    /// - [`SnapshotError::NoUsableSnapshot`] if no snapshot validates and
    ///   decodes, and the log does not start at zxid 1
    pub fn restore(&mut self, tree: &mut DataTree) -> Result<Zxid> {
        let start = Instant::now();
        let mut stats = RestoreStats::default();

        let removed = self.snap_writer.cleanup_temp_files()?;
        if removed > 0 {
            info!(removed, "Removed leftover snapshot temp files");
        }

        if let Some((image, snapshot)) = self.load_snapshot()? {
            *tree = image;
            tree.set_last_processed_zxid(snapshot.tagged_zxid);
            stats.snapshot_zxid = Some(snapshot.tagged_zxid);
            info!(
                zxid = format_args!("{:#x}", snapshot.tagged_zxid),
                path = %snapshot.path.display(),
                nodes = tree.node_count(),
                "Loaded snapshot"
            );
        }

        let watermark = tree.last_processed_zxid();
        let mut iter = self.txn_log.read(watermark + 1)?;

        while let Some((header, txn)) = iter.current() {
            stats.records_read += 1;

            // A record that skips ahead means everything between was lost,
            // whether at a segment boundary or inside one.
            let expected = tree.last_processed_zxid() + 1;
            if header.zxid > expected {
                return Err(PersistenceError::LogGap {
                    expected,
                    found: header.zxid,
                });
            }

            match tree.apply_transaction(header, txn) {
                None => stats.records_skipped += 1,
                Some(result) => {
                    stats.records_applied += 1;
                    if !result.outcome.is_ok() {
                        stats.failed_outcomes += 1;
                    }
                }
            }
            iter.advance()?;
        }

        stats.final_zxid = tree.last_processed_zxid();
        info!(
            zxid = format_args!("{:#x}", stats.final_zxid),
            applied = stats.records_applied,
            skipped = stats.records_skipped,
            failed = stats.failed_outcomes,
            log_bytes = iter.storage_size(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Restore complete"
        );
        self.restore_stats = stats;
        Ok(tree.last_processed_zxid())
    }

    /// Newest snapshot that validates and whose image decodes.
    ///
    /// Falls back through older snapshots on either failure. With none
    /// usable, a log starting at zxid 1 can rebuild everything; otherwise
    /// the directory has lost data.
    fn load_snapshot(&self) -> Result<Option<(DataTree, LoadedSnapshot)>> {
        let files = self.snap_reader.list_snapshots()?;
        if files.is_empty() {
            return Ok(None);
        }

        let mut tried = 0;
        for file in files.iter().rev() {
            tried += 1;
            let snapshot = match self.snap_reader.load(file) {
                Ok(snapshot) => snapshot,
                Err(SnapshotError::Invalid { path, reason }) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping invalid snapshot");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match DataTree::from_image(&snapshot.payload) {
                Ok(image) => return Ok(Some((image, snapshot))),
                Err(e) => {
                    warn!(
                        path = %snapshot.path.display(),
                        error = %e,
                        "Skipping snapshot whose image does not decode"
                    );
                }
            }
        }

        let dir = self.snap_reader.snap_dir().to_path_buf();
        let files = self.txn_log.log_files()?;
        if files.first().is_some_and(|f| f.first_zxid <= 1) {
            warn!(dir = %dir.display(), tried, "No usable snapshot, replaying the full log");
            Ok(None)
        } else {
            Err(SnapshotError::NoUsableSnapshot { dir, tried }.into())
        }
    }

    /// Log `txn`, make it durable per the durability mode, then apply it.
    ///
    /// The log write happens first: a transaction that fails to log is never
    /// applied.
    pub fn process_transaction(
        &mut self,
        header: &TxnHeader,
        txn: &Txn,
        tree: &mut DataTree,
    ) -> Result<Option<TxnResult>> {
        self.append(header, txn)?;
        Ok(tree.apply_transaction(header, txn))
    }

    /// Log and commit without applying
    pub fn append(&mut self, header: &TxnHeader, txn: &Txn) -> Result<()> {
        self.txn_log.append(header, txn)?;
        self.txn_log.commit()?;
        Ok(())
    }

    /// Write a snapshot of `tree`, tagged with its watermark
    pub fn take_snapshot(&self, tree: &DataTree) -> Result<SnapshotInfo> {
        write_snapshot(&self.snap_writer, tree)
    }

    /// Start a new log segment at the next append
    pub fn roll_log(&mut self) -> Result<()> {
        self.txn_log.roll_log()?;
        Ok(())
    }

    /// Flush and sync the log
    pub fn commit(&mut self) -> Result<()> {
        self.txn_log.commit()?;
        Ok(())
    }

    /// Sync and close the tail segment
    pub fn close(&mut self) -> Result<()> {
        self.txn_log.close()?;
        Ok(())
    }

    /// Segments currently on disk, ascending
    pub fn log_files(&self) -> Result<Vec<LogFile>> {
        Ok(self.txn_log.log_files()?)
    }

    /// Highest zxid present in the log
    pub fn last_logged_zxid(&self) -> Result<Zxid> {
        Ok(self.txn_log.last_logged_zxid()?)
    }

    /// Log counters since open
    pub fn wal_counters(&self) -> WalCounters {
        self.txn_log.counters()
    }

    /// Stats of the last restore
    pub fn restore_stats(&self) -> &RestoreStats {
        &self.restore_stats
    }

    /// Directory layout
    pub fn paths(&self) -> &SnapLogPaths {
        &self.paths
    }

    /// Writer handle usable from another thread
    pub fn snapshot_writer(&self) -> SnapshotWriter {
        self.snap_writer.clone()
    }

    /// Reader over the snapshot directory
    pub fn snapshot_reader(&self) -> &SnapshotReader {
        &self.snap_reader
    }
}

/// Serialize `tree` and write it as a snapshot tagged with its watermark.
pub(crate) fn write_snapshot(writer: &SnapshotWriter, tree: &DataTree) -> Result<SnapshotInfo> {
    let zxid = tree.last_processed_zxid();
    let payload = tree.serialize_image()?;
    let info = writer.write(&payload, zxid)?;
    debug!(
        zxid = format_args!("{:#x}", zxid),
        bytes = info.size,
        nodes = tree.node_count(),
        "Wrote snapshot"
    );
    Ok(info)
}
