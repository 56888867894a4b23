//! Shared helpers for the end-to-end tests

#![allow(dead_code)]

use keeperlog::layers::durability::SnapshotWriter;
use keeperlog::{
    DataTree, KeeperDatabase, PersistenceConfig, SessionId, SnapLogPaths, Txn, TxnHeader, Zxid,
};
use std::path::Path;

/// Session used by every generated transaction
pub const SESSION: SessionId = 0x5e55_1011;

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Header with a fixed timestamp so frames are reproducible
pub fn header(zxid: Zxid, txn: &Txn) -> TxnHeader {
    TxnHeader::new(SESSION, zxid as i32, zxid, 1_000 + zxid as i64, txn.op_code())
}

/// Config with small segments and no auto-snapshots
pub fn config() -> PersistenceConfig {
    PersistenceConfig::for_testing()
}

/// Open `dir` with [`config`]
pub fn open(dir: &Path) -> KeeperDatabase {
    KeeperDatabase::open_with_config(dir, config()).unwrap()
}

/// Process `txn` at the next zxid and return that zxid
pub fn submit(db: &KeeperDatabase, txn: Txn) -> Zxid {
    let zxid = db.last_processed_zxid() + 1;
    db.process(&header(zxid, &txn), &txn).unwrap();
    zxid
}

/// Create the next sequential child of `prefix`, the way a leader would:
/// the name and the parent cversion both come from the current tree.
pub fn submit_sequential(db: &KeeperDatabase, prefix: &str) -> (Zxid, String) {
    let path = db.next_sequential_path(prefix).unwrap();
    let (parent, _) = keeperlog::path::split_parent(prefix).unwrap();
    let parent_cversion = db.stat(parent).unwrap().cversion + 1;
    let zxid = submit(db, Txn::create(path.clone(), b"seq".to_vec(), parent_cversion));
    (zxid, path)
}

/// Write a snapshot of `tree` whose tag lags its content, as happens when a
/// snapshot is taken while transactions keep applying.
pub fn write_fuzzy_snapshot(dir: &Path, tree: &DataTree, tag: Zxid) {
    let mut copy = tree.clone();
    copy.set_last_processed_zxid(tag);
    let writer = SnapshotWriter::new(SnapLogPaths::new(dir, None).snap_dir(), 0).unwrap();
    writer.write(&copy.serialize_image().unwrap(), tag).unwrap();
}
