//! Core types for keeperlog
//!
//! This crate defines the foundational types used throughout the system:
//! - Zxid: global transaction id
//! - TxnHeader / OpCode: header written ahead of every log record
//! - Txn: tagged union of transaction bodies
//! - Stat / Acl: node bookkeeping and access control
//! - Outcome: transaction-level result codes
//! - path: node path helpers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod outcome;
pub mod path;
pub mod txn;
pub mod types;

pub use error::{Error, Result};
pub use outcome::Outcome;
pub use txn::{
    CheckVersionTxn, CreateSessionTxn, CreateTxn, DeleteTxn, ErrorTxn, MultiTxn, SetAclTxn,
    SetDataTxn, Txn, DERIVE_PARENT_CVERSION,
};
pub use types::{now_millis, perms, Acl, OpCode, SessionId, Stat, TxnHeader, Zxid};
