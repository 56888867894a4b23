//! Embeddable database handle
//!
//! `KeeperDatabase` pairs a [`PersistenceCoordinator`] with a shared tree.
//! Writes are serialized by a mutex around the coordinator and applied under
//! the tree's write lock; readers take read locks and never see a transaction
//! before its apply has returned.
//!
//! Snapshots clone the tree under a read lock and serialize on their own
//! thread, so appends continue while the snapshot is written.

use crate::config::{PersistenceConfig, CONFIG_FILE_NAME};
use crate::coordinator::{write_snapshot, PersistenceCoordinator, RestoreStats};
use crate::error::{PersistenceError, Result};
use crate::paths::SnapLogPaths;
use keeperlog_core::{Stat, Txn, TxnHeader, Zxid};
use keeperlog_durability::{SnapshotInfo, SnapshotWriter, WalCounters};
use keeperlog_storage::{DataTree, TxnResult};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Handle to a background snapshot
pub type SnapshotHandle = JoinHandle<Result<SnapshotInfo>>;

struct Sequencer {
    coordinator: PersistenceCoordinator,
    txns_since_snapshot: u64,
    #[cfg(test)]
    fail_maintenance: bool,
}

/// A restored tree plus the log that keeps it durable
pub struct KeeperDatabase {
    tree: Arc<RwLock<DataTree>>,
    sequencer: Mutex<Sequencer>,
    snap_writer: SnapshotWriter,
    snapshot_in_flight: Arc<AtomicBool>,
    snap_count: Option<u64>,
    config: PersistenceConfig,
}

impl KeeperDatabase {
    /// Open `data_dir` using its `keeperlog.toml`.
    ///
    /// Creates the directory and a default config file if missing.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        PersistenceConfig::write_default_if_missing(&config_path)?;
        let config = PersistenceConfig::from_file(&config_path)?;
        Self::open_with_config(data_dir, config)
    }

    /// Open `data_dir` with an explicit config, then restore.
    pub fn open_with_config(data_dir: impl AsRef<Path>, config: PersistenceConfig) -> Result<Self> {
        let paths = SnapLogPaths::new(data_dir, config.data_log_dir.as_deref());
        let mut coordinator = PersistenceCoordinator::open(paths, &config)?;

        let mut tree = DataTree::new();
        coordinator.restore(&mut tree)?;
        let snap_writer = coordinator.snapshot_writer();

        info!(
            zxid = format_args!("{:#x}", tree.last_processed_zxid()),
            nodes = tree.node_count(),
            sessions = tree.sessions().len(),
            "Database open"
        );

        Ok(KeeperDatabase {
            tree: Arc::new(RwLock::new(tree)),
            sequencer: Mutex::new(Sequencer {
                coordinator,
                txns_since_snapshot: 0,
                #[cfg(test)]
                fail_maintenance: false,
            }),
            snap_writer,
            snapshot_in_flight: Arc::new(AtomicBool::new(false)),
            snap_count: config.snap_count,
            config,
        })
    }

    /// Log and apply one transaction.
    ///
    /// Returns `None` if the transaction was already applied. When
    /// `snap_count` is configured, every `snap_count` transactions the log
    /// is rolled and a background snapshot started.
    ///
    /// An error means the transaction was not logged and not applied. Once
    /// it is committed and applied, a failed roll or snapshot start is only
    /// logged.
    pub fn process(&self, header: &TxnHeader, txn: &Txn) -> Result<Option<TxnResult>> {
        let mut seq = self.sequencer.lock();
        seq.coordinator.append(header, txn)?;
        let result = self.tree.write().apply_transaction(header, txn);

        if let Some(snap_count) = self.snap_count {
            seq.txns_since_snapshot += 1;
            if seq.txns_since_snapshot >= snap_count {
                seq.txns_since_snapshot = 0;
                if let Err(e) = self.roll_and_snapshot(&mut seq) {
                    error!(
                        zxid = format_args!("{:#x}", header.zxid),
                        error = %e,
                        "Periodic roll or snapshot failed after commit"
                    );
                }
            }
        }
        Ok(result)
    }

    fn roll_and_snapshot(&self, seq: &mut Sequencer) -> Result<()> {
        #[cfg(test)]
        if seq.fail_maintenance {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "roll failed",
            )));
        }
        seq.coordinator.roll_log()?;
        // Detached; the thread clears the in-flight flag when done.
        self.snapshot_in_background()?;
        Ok(())
    }

    /// Snapshot the current tree on a separate thread.
    ///
    /// Returns `Ok(None)` if a background snapshot is already running.
    pub fn snapshot_in_background(&self) -> Result<Option<SnapshotHandle>> {
        if self.snapshot_in_flight.swap(true, Ordering::AcqRel) {
            warn!("Snapshot already in progress, skipping");
            return Ok(None);
        }

        let copy = self.tree.read().clone();
        let writer = self.snap_writer.clone();
        let in_flight = Arc::clone(&self.snapshot_in_flight);

        let spawned = std::thread::Builder::new()
            .name("keeperlog-snapshot".into())
            .spawn(move || {
                let result = write_snapshot(&writer, &copy);
                if let Err(e) = &result {
                    error!(error = %e, "Background snapshot failed");
                }
                in_flight.store(false, Ordering::Release);
                result
            });

        match spawned {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                self.snapshot_in_flight.store(false, Ordering::Release);
                Err(PersistenceError::Io(e))
            }
        }
    }

    /// Snapshot the current tree on the calling thread
    pub fn take_snapshot(&self) -> Result<SnapshotInfo> {
        let copy = self.tree.read().clone();
        write_snapshot(&self.snap_writer, &copy)
    }

    /// Flush and sync the log
    pub fn commit(&self) -> Result<()> {
        self.sequencer.lock().coordinator.commit()
    }

    /// Start a new log segment at the next transaction
    pub fn roll_log(&self) -> Result<()> {
        self.sequencer.lock().coordinator.roll_log()
    }

    /// Sync and close the log. Later transactions open a new segment.
    pub fn close(&self) -> Result<()> {
        self.sequencer.lock().coordinator.close()
    }

    /// Run `f` against the tree under a read lock
    pub fn with_tree<R>(&self, f: impl FnOnce(&DataTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// Shared handle to the tree
    pub fn tree(&self) -> Arc<RwLock<DataTree>> {
        Arc::clone(&self.tree)
    }

    /// Highest applied zxid
    pub fn last_processed_zxid(&self) -> Zxid {
        self.tree.read().last_processed_zxid()
    }

    /// Stat of a node
    pub fn stat(&self, path: &str) -> Option<Stat> {
        self.tree.read().stat(path)
    }

    /// Copy of a node's data
    pub fn get_data(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.read().get_data(path).map(<[u8]>::to_vec)
    }

    /// Sorted child names of a node
    pub fn get_children(&self, path: &str) -> Option<Vec<String>> {
        self.tree.read().get_children(path)
    }

    /// Path the next sequential create under `prefix` would get
    pub fn next_sequential_path(&self, prefix: &str) -> Option<String> {
        self.tree.read().next_sequential_path(prefix)
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.tree.read().node_count()
    }

    /// Digest of the whole tree
    pub fn digest(&self) -> u32 {
        self.tree.read().digest()
    }

    /// Stats of the restore done at open
    pub fn restore_stats(&self) -> RestoreStats {
        self.sequencer.lock().coordinator.restore_stats().clone()
    }

    /// Log counters since open
    pub fn wal_counters(&self) -> WalCounters {
        self.sequencer.lock().coordinator.wal_counters()
    }

    /// Config the database was opened with
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }
}

impl Drop for KeeperDatabase {
    fn drop(&mut self) {
        if let Err(e) = self.sequencer.get_mut().coordinator.close() {
            warn!(error = %e, "Failed to close transaction log on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeperlog_core::{OpCode, Outcome};
    use tempfile::TempDir;

    fn header(zxid: Zxid) -> TxnHeader {
        TxnHeader::new(1, zxid as i32, zxid, 0, OpCode::Create)
    }

    #[test]
    fn test_open_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let db = KeeperDatabase::open(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(db.config(), &PersistenceConfig::default());
        assert_eq!(db.last_processed_zxid(), 0);
    }

    #[test]
    fn test_process_is_visible_to_readers() {
        let dir = TempDir::new().unwrap();
        let db = KeeperDatabase::open_with_config(dir.path(), PersistenceConfig::for_testing())
            .unwrap();

        let result = db
            .process(&header(1), &Txn::create("/a", b"v".to_vec(), -1))
            .unwrap()
            .unwrap();
        assert_eq!(result.outcome, Outcome::Ok);
        assert_eq!(db.get_data("/a"), Some(b"v".to_vec()));
        assert_eq!(db.get_children("/"), Some(vec!["a".to_string()]));
        assert_eq!(db.wal_counters().appends, 1);
    }

    #[test]
    fn test_replayed_zxid_is_skipped() {
        let dir = TempDir::new().unwrap();
        let db = KeeperDatabase::open_with_config(dir.path(), PersistenceConfig::for_testing())
            .unwrap();

        db.process(&header(1), &Txn::create("/a", vec![], -1)).unwrap();
        assert!(db
            .process(&header(1), &Txn::create("/b", vec![], -1))
            .unwrap()
            .is_none());
        assert!(db.stat("/b").is_none());
    }

    #[test]
    fn test_background_snapshot_is_tagged_with_watermark() {
        let dir = TempDir::new().unwrap();
        let db = KeeperDatabase::open_with_config(dir.path(), PersistenceConfig::for_testing())
            .unwrap();
        for zxid in 1..=5 {
            db.process(&header(zxid), &Txn::create(format!("/n{}", zxid), vec![], -1))
                .unwrap();
        }

        let handle = db.snapshot_in_background().unwrap().unwrap();
        let info = handle.join().unwrap().unwrap();
        assert_eq!(info.tagged_zxid, 5);
        assert!(info.path.exists());
    }

    #[test]
    fn test_failed_roll_does_not_fail_committed_transaction() {
        let dir = TempDir::new().unwrap();
        let config = PersistenceConfig::for_testing().with_snap_count(2);
        {
            let db = KeeperDatabase::open_with_config(dir.path(), config.clone()).unwrap();
            db.sequencer.lock().fail_maintenance = true;
            for zxid in 1..=4 {
                let result = db
                    .process(&header(zxid), &Txn::create(format!("/n{}", zxid), vec![], -1))
                    .unwrap()
                    .unwrap();
                assert_eq!(result.outcome, Outcome::Ok);
            }
            assert_eq!(db.last_processed_zxid(), 4);
            assert_eq!(db.wal_counters().rolls, 0);
        }

        let db = KeeperDatabase::open_with_config(dir.path(), config).unwrap();
        assert_eq!(db.last_processed_zxid(), 4);
        assert_eq!(db.restore_stats().snapshot_zxid, None);
    }

    #[test]
    fn test_snap_count_rolls_and_snapshots() {
        let dir = TempDir::new().unwrap();
        let config = PersistenceConfig::for_testing().with_snap_count(4);
        {
            let db = KeeperDatabase::open_with_config(dir.path(), config.clone()).unwrap();
            for zxid in 1..=10 {
                db.process(&header(zxid), &Txn::create(format!("/n{}", zxid), vec![], -1))
                    .unwrap();
            }
            // Wait out any snapshot still being written.
            while db.snapshot_in_flight.load(Ordering::Acquire) {
                std::thread::yield_now();
            }
            assert!(db.wal_counters().rolls >= 2);
        }

        let db = KeeperDatabase::open_with_config(dir.path(), config).unwrap();
        assert_eq!(db.last_processed_zxid(), 10);
        assert_eq!(db.node_count(), 11);
        assert!(db.restore_stats().snapshot_zxid.is_some());
    }
}
