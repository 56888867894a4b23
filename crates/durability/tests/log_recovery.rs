//! Transaction log behavior across segments, restarts and damage.

use keeperlog_core::{CreateSessionTxn, OpCode, Txn, TxnHeader, Zxid};
use keeperlog_durability::format::{log_file_name, FILE_HEADER_SIZE, LOG_MAGIC};
use keeperlog_durability::{NeverRoll, RollEveryN, TxnLog, WalConfig, WalError, MAX_RECORD_SIZE};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

fn header(zxid: Zxid, op: OpCode) -> TxnHeader {
    TxnHeader::new(0x1234, zxid as i32, zxid, 1_000, op)
}

fn append(log: &mut TxnLog, zxid: Zxid, txn: Txn) {
    log.append(&header(zxid, txn.op_code()), &txn).unwrap();
    log.commit().unwrap();
}

fn collect(log: &TxnLog, since: Zxid) -> Vec<Zxid> {
    let mut iter = log.read(since).unwrap();
    let mut zxids = Vec::new();
    while let Some(h) = iter.header() {
        zxids.push(h.zxid);
        iter.advance().unwrap();
    }
    zxids
}

fn reopen(dir: &Path) -> TxnLog {
    TxnLog::open(dir, WalConfig::for_testing(), Box::new(NeverRoll)).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn replay_is_contiguous_and_exactly_once() {
    let dir = tempdir().unwrap();
    let mut log = TxnLog::open(dir.path(), WalConfig::for_testing(), Box::new(RollEveryN(37))).unwrap();

    append(&mut log, 1, Txn::CreateSession(CreateSessionTxn { timeout: 30_000 }));
    for i in 0..300u64 {
        append(&mut log, i + 2, Txn::create(format!("/node-{}", i), Vec::new(), -1));
    }
    append(&mut log, 302, Txn::CloseSession);
    log.close().unwrap();

    let zxids = collect(&reopen(dir.path()), 0);
    assert_eq!(zxids.len(), 302);
    assert_eq!(zxids, (1..=302).collect::<Vec<_>>());
}

#[test]
fn deleted_first_segment_resolves_to_second() {
    let dir = tempdir().unwrap();
    let mut log = TxnLog::open(dir.path(), WalConfig::for_testing(), Box::new(RollEveryN(10))).unwrap();
    for zxid in 1..=45 {
        append(&mut log, zxid, Txn::create(format!("/n{}", zxid), Vec::new(), -1));
    }
    log.close().unwrap();

    let files = log.log_files().unwrap();
    assert!(files.len() >= 4);
    std::fs::remove_file(&files[0].path).unwrap();
    let second = files[1].first_zxid;

    let log = reopen(dir.path());
    for since in [1, 5, second - 1, second] {
        let iter = log.read(since).unwrap();
        assert_eq!(iter.header().unwrap().zxid, second, "since {}", since);
    }
}

#[test]
fn unpositioned_reads_start_at_oldest_covering_segment() {
    let dir = tempdir().unwrap();
    let mut log = TxnLog::open(dir.path(), WalConfig::for_testing(), Box::new(RollEveryN(10))).unwrap();
    for zxid in 1..=45 {
        append(&mut log, zxid, Txn::create(format!("/n{}", zxid), Vec::new(), -1));
    }
    log.close().unwrap();

    let files = log.log_files().unwrap();
    assert!(files.len() > 4);
    std::fs::remove_file(&files[0].path).unwrap();
    let second = files[1].first_zxid;
    let third = files[2].first_zxid;

    let log = reopen(dir.path());
    let first_of = |since: Zxid| {
        let iter = log.read_from(since, false).unwrap();
        iter.header().unwrap().zxid
    };

    assert_eq!(first_of(1), second);

    let mut iter = log.read_from(second, false).unwrap();
    assert_eq!(iter.header().unwrap().zxid, second);
    assert!(iter.advance().unwrap());
    let next = iter.header().unwrap().zxid;
    assert_eq!(first_of(next), second);

    // Starting exactly at a segment boundary still covers the segment before.
    let mut iter = log.read_from(third, false).unwrap();
    assert_eq!(iter.header().unwrap().zxid, second);
    assert!(iter.advance().unwrap());
    let next = iter.header().unwrap().zxid;
    assert_eq!(first_of(next), second);
}

#[test]
fn oversized_record_is_refused_before_writing() {
    let dir = tempdir().unwrap();
    let mut log = reopen(dir.path());
    let huge = Txn::create("/big", vec![0u8; MAX_RECORD_SIZE + 1024], -1);

    // Refused as the very first append: no segment is created.
    let err = log.append(&header(1, OpCode::Create), &huge).unwrap_err();
    assert!(matches!(err, WalError::RecordTooLarge { zxid: 1, max: MAX_RECORD_SIZE, .. }));
    assert!(log.log_files().unwrap().is_empty());

    append(&mut log, 1, Txn::create("/small", Vec::new(), -1));
    assert!(matches!(
        log.append(&header(2, OpCode::Create), &huge),
        Err(WalError::RecordTooLarge { zxid: 2, .. })
    ));
    append(&mut log, 3, Txn::create("/after", Vec::new(), -1));
    log.close().unwrap();

    assert_eq!(log.counters().appends, 2);
    assert_eq!(collect(&reopen(dir.path()), 0), vec![1, 3]);
}

#[test]
fn header_is_readable_after_first_append() {
    let dir = tempdir().unwrap();
    // Preallocation block chosen so the first frame lands on the boundary.
    let mut log = TxnLog::open(
        dir.path(),
        WalConfig::for_testing().with_preallocate_size(4096),
        Box::new(NeverRoll),
    )
    .unwrap();
    log.append(&header(1, OpCode::Create), &Txn::create("/a", vec![0u8; 4000], -1))
        .unwrap();

    let bytes = std::fs::read(dir.path().join(log_file_name(1))).unwrap();
    assert!(bytes.len() >= FILE_HEADER_SIZE);
    assert_eq!(&bytes[0..4], &LOG_MAGIC);
}

#[test]
fn zero_padded_tail_ends_cleanly() {
    let dir = tempdir().unwrap();
    let mut log = reopen(dir.path());
    for zxid in 1..=5 {
        append(&mut log, zxid, Txn::delete(format!("/n{}", zxid)));
    }
    log.close().unwrap();

    let path = dir.path().join(log_file_name(1));
    let len = std::fs::metadata(&path).unwrap().len();
    assert!(len > 5 * 40, "segment should be preallocated");

    assert_eq!(collect(&reopen(dir.path()), 1), vec![1, 2, 3, 4, 5]);
}

#[test]
fn garbage_tail_is_clean_truncation() {
    let dir = tempdir().unwrap();
    let mut log = TxnLog::open(
        dir.path(),
        WalConfig::for_testing().with_preallocate_size(0),
        Box::new(NeverRoll),
    )
    .unwrap();
    for zxid in 1..=3 {
        append(&mut log, zxid, Txn::delete("/x"));
    }
    log.close().unwrap();

    let path = dir.path().join(log_file_name(1));
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x40, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
    drop(file);

    let log = reopen(dir.path());
    assert_eq!(collect(&log, 1), vec![1, 2, 3]);
    assert_eq!(log.last_logged_zxid().unwrap(), 3);
}

#[test]
fn segment_with_bad_header_is_skipped() {
    let dir = tempdir().unwrap();
    let mut log = TxnLog::open(dir.path(), WalConfig::for_testing(), Box::new(RollEveryN(3))).unwrap();
    for zxid in 1..=9 {
        append(&mut log, zxid, Txn::delete("/x"));
    }
    log.close().unwrap();

    let middle = dir.path().join(log_file_name(4));
    let mut bytes = std::fs::read(&middle).unwrap();
    bytes[0..4].copy_from_slice(b"XXXX");
    std::fs::write(&middle, bytes).unwrap();

    assert_eq!(collect(&reopen(dir.path()), 1), vec![1, 2, 3, 7, 8, 9]);
}

#[test]
fn restart_appends_to_new_segment() {
    let dir = tempdir().unwrap();
    let mut log = reopen(dir.path());
    for zxid in 1..=4 {
        append(&mut log, zxid, Txn::delete("/x"));
    }
    log.close().unwrap();
    drop(log);

    let mut log = reopen(dir.path());
    let next = log.last_logged_zxid().unwrap() + 1;
    for zxid in next..next + 3 {
        append(&mut log, zxid, Txn::delete("/x"));
    }
    log.close().unwrap();

    let firsts: Vec<Zxid> = log.log_files().unwrap().iter().map(|f| f.first_zxid).collect();
    assert_eq!(firsts, vec![1, 5]);
    assert_eq!(collect(&log, 0), (1..=7).collect::<Vec<_>>());
}
