//! Restore from a snapshot that lags the log
//!
//! Snapshots are taken while transactions keep applying, so a snapshot's
//! content can run ahead of its tag. These tests write such snapshots
//! explicitly and check that restore still lands on the live state.

mod common;

use common::*;
use keeperlog::{Acl, CreateSessionTxn, ErrorTxn, KeeperDatabase, Outcome, PersistenceError, Txn};
use tempfile::TempDir;

const NUM_MESSAGES: usize = 100;

#[test]
fn test_restore_continues_sequential_names() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let (last_path, live_digest, last_zxid) = {
        let db = open(dir.path());
        submit(&db, Txn::create("/test", Vec::new(), -1));
        let mut last = (0, String::new());
        for _ in 0..NUM_MESSAGES {
            last = submit_sequential(&db, "/test/seq-");
        }
        let (last_zxid, last_path) = last;

        db.with_tree(|tree| write_fuzzy_snapshot(dir.path(), tree, last_zxid - 10));
        (last_path, db.digest(), last_zxid)
    };

    let db = open(dir.path());
    assert_eq!(db.last_processed_zxid(), last_zxid);
    assert_eq!(db.restore_stats().snapshot_zxid, Some(last_zxid - 10));
    assert_eq!(db.restore_stats().records_applied, 10);
    // Every replayed create hits a node the snapshot already holds.
    assert_eq!(db.restore_stats().failed_outcomes, 10);
    assert_eq!(db.digest(), live_digest);

    let children = db.get_children("/test").unwrap();
    assert_eq!(children.len(), NUM_MESSAGES);

    let last_index: i32 = last_path["/test/seq-".len()..].parse().unwrap();
    let next = db.next_sequential_path("/test/seq-").unwrap();
    let next_index: i32 = next["/test/seq-".len()..].parse().unwrap();
    assert_eq!(next_index, last_index + 1);
    assert_eq!(db.stat("/test").unwrap().cversion, NUM_MESSAGES as i32);
}

#[test]
fn test_restore_with_transaction_errors() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let (live_digest, last_zxid) = {
        let db = open(dir.path());
        submit(&db, Txn::create("/present", Vec::new(), -1));
        for i in 0..NUM_MESSAGES {
            let path = format!("/invaliddir/test-{:010}", i);
            submit(&db, Txn::create(path, b"x".to_vec(), -1));
        }
        submit(&db, Txn::Error(ErrorTxn { err: Outcome::NoNode.code() }));
        submit(
            &db,
            Txn::multi(vec![
                Txn::create("/present/child", Vec::new(), -1),
                Txn::Error(ErrorTxn { err: Outcome::NodeExists.code() }),
            ]),
        );
        let last_zxid = db.last_processed_zxid();
        db.with_tree(|tree| write_fuzzy_snapshot(dir.path(), tree, last_zxid - 10));
        (db.digest(), last_zxid)
    };

    let db = open(dir.path());
    assert_eq!(db.last_processed_zxid(), last_zxid);
    assert_eq!(db.digest(), live_digest);
    assert!(db.stat("/invaliddir").is_none());
    assert!(db.stat("/present/child").is_none());
}

#[test]
fn test_reload_snapshot_with_missing_parent() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let (live_digest, root_cversion) = {
        let db = open(dir.path());
        let a_zxid = submit(&db, Txn::create("/a", Vec::new(), -1));
        submit(&db, Txn::create("/a/b", Vec::new(), -1));
        submit(&db, Txn::delete("/a/b"));
        submit(&db, Txn::delete("/a"));

        db.with_tree(|tree| write_fuzzy_snapshot(dir.path(), tree, a_zxid));
        (db.digest(), db.stat("/").unwrap().cversion)
    };

    let db = open(dir.path());
    assert_eq!(db.last_processed_zxid(), 4);
    assert!(db.stat("/a").is_none());
    assert_eq!(db.stat("/").unwrap().cversion, root_cversion);
    assert_eq!(db.digest(), live_digest);
}

#[test]
fn test_node_exists_replay_advances_parent_cversion() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let live_digest = {
        let db = open(dir.path());
        submit(&db, Txn::create("/p", Vec::new(), -1));
        let tag = db.last_processed_zxid();

        // The snapshot serialized /p before the child's create bumped its
        // cversion, but picked up the child itself.
        let mut fuzzy = db.with_tree(|tree| tree.clone());
        fuzzy.create_node("/p/c", Vec::new(), &Acl::open_unsafe(), 0, 0, tag + 1, 0);
        assert_eq!(fuzzy.stat("/p").unwrap().cversion, 0);

        submit(&db, Txn::create("/p/c", Vec::new(), 2));
        submit(&db, Txn::delete("/p/c"));
        submit(
            &db,
            Txn::multi(vec![
                Txn::create("/p/c", Vec::new(), 5),
                Txn::delete("/p/c"),
            ]),
        );

        write_fuzzy_snapshot(dir.path(), &fuzzy, tag);
        db.digest()
    };

    let db = open(dir.path());
    assert_eq!(db.restore_stats().failed_outcomes, 1);
    assert_eq!(db.digest(), live_digest);
    let stat = db.stat("/p").unwrap();
    assert_eq!(stat.cversion, 6);
    assert_eq!(stat.pzxid, 4);
    assert!(db.stat("/p/c").is_none());
}

#[test]
fn test_sessions_and_ephemerals_survive_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    {
        let db = open(dir.path());
        submit(&db, Txn::CreateSession(CreateSessionTxn { timeout: 30_000 }));
        submit(&db, Txn::create_ephemeral("/lock", b"owner".to_vec()));
        db.take_snapshot().unwrap();
        submit(&db, Txn::create_ephemeral("/lock2", Vec::new()));
    }

    let db = open(dir.path());
    db.with_tree(|tree| {
        assert_eq!(tree.sessions().get(&SESSION), Some(&30_000));
        assert_eq!(tree.ephemerals(SESSION), vec!["/lock".to_string(), "/lock2".to_string()]);
    });

    submit(&db, Txn::CloseSession);
    assert!(db.stat("/lock").is_none());
    assert!(db.with_tree(|tree| tree.sessions().is_empty()));
}

#[test]
fn test_datadir_autocreate() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");

    let err = KeeperDatabase::open_with_config(&data_dir, config().with_autocreate(false))
        .err()
        .unwrap();
    assert!(matches!(err, PersistenceError::MissingDirectory { .. }));
    assert!(!data_dir.exists());

    let db = KeeperDatabase::open_with_config(&data_dir, config()).unwrap();
    assert_eq!(db.last_processed_zxid(), 0);
    assert!(data_dir.join("version-2").is_dir());
}

#[test]
fn test_missing_log_dir_without_autocreate() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("log");
    let config = config()
        .with_autocreate(false)
        .with_data_log_dir(&log_dir);

    let err = KeeperDatabase::open_with_config(dir.path(), config).err().unwrap();
    assert!(matches!(err, PersistenceError::MissingDirectory { path } if path == log_dir));
}
