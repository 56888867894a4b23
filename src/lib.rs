//! keeperlog - durable state for a hierarchical coordination store
//!
//! A write-ahead transaction log paired with periodic snapshots, and the
//! replay engine that rebuilds the in-memory tree from them after restart.
//!
//! # Quick Start
//!
//! ```ignore
//! use keeperlog::{KeeperDatabase, OpCode, Txn, TxnHeader};
//!
//! let db = KeeperDatabase::open("/var/lib/keeperlog")?;
//! let zxid = db.last_processed_zxid() + 1;
//! let header = TxnHeader::now(session, 1, zxid, OpCode::Create);
//! db.process(&header, &Txn::create("/config", b"v1".to_vec(), -1))?;
//! ```
//!
//! # Architecture
//!
//! - `keeperlog-core`: transaction types, outcomes, paths
//! - `keeperlog-storage`: the tree and how transactions apply to it
//! - `keeperlog-durability`: log segments, record framing, snapshot files
//! - `keeperlog-engine`: restore, processing and background snapshots

pub use keeperlog_core::{
    path, Acl, CreateSessionTxn, ErrorTxn, OpCode, Outcome, SessionId, Stat, Txn, TxnHeader, Zxid,
    DERIVE_PARENT_CVERSION,
};
pub use keeperlog_durability::{
    DurabilityMode, NeverRoll, RollAtSize, RollEveryN, RollPolicy, SegmentStats, SnapshotInfo,
    TxnIterator, TxnLog, WalConfig,
};
pub use keeperlog_engine::{
    KeeperDatabase, PersistenceConfig, PersistenceCoordinator, PersistenceError, RestoreStats,
    SnapLogPaths,
};
pub use keeperlog_storage::{DataNode, DataTree, TxnResult};

/// Crate-level modules for callers that need the full API of one layer
pub mod layers {
    pub use keeperlog_core as core;
    pub use keeperlog_durability as durability;
    pub use keeperlog_engine as engine;
    pub use keeperlog_storage as storage;
}
