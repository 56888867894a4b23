//! Core types shared by every layer
//!
//! - Zxid: global transaction sequence number
//! - OpCode: transaction type discriminator (stable wire values)
//! - TxnHeader: per-transaction header written ahead of every log record
//! - Stat: per-node bookkeeping fields
//! - Acl: access control entry attached to nodes

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global transaction id. Strictly increasing, never reused.
pub type Zxid = u64;

/// Session identifier of the client that issued a transaction.
pub type SessionId = i64;

/// Transaction type discriminator.
///
/// The numeric values are part of the on-disk format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum OpCode {
    /// Create a node
    Create = 1,
    /// Delete a node
    Delete = 2,
    /// Replace a node's data
    SetData = 5,
    /// Replace a node's ACL
    SetAcl = 7,
    /// Version check inside a multi
    Check = 13,
    /// Ordered list of sub-transactions sharing one zxid
    Multi = 14,
    /// Session opened
    CreateSession = -10,
    /// Session closed; its ephemeral nodes go away
    CloseSession = -11,
    /// Placeholder for a failed operation
    Error = -1,
}

impl OpCode {
    /// Wire value of this op code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable name, used in log lines
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Create => "create",
            OpCode::Delete => "delete",
            OpCode::SetData => "setData",
            OpCode::SetAcl => "setACL",
            OpCode::Check => "check",
            OpCode::Multi => "multi",
            OpCode::CreateSession => "createSession",
            OpCode::CloseSession => "closeSession",
            OpCode::Error => "error",
        }
    }
}

impl TryFrom<i32> for OpCode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(OpCode::Create),
            2 => Ok(OpCode::Delete),
            5 => Ok(OpCode::SetData),
            7 => Ok(OpCode::SetAcl),
            13 => Ok(OpCode::Check),
            14 => Ok(OpCode::Multi),
            -10 => Ok(OpCode::CreateSession),
            -11 => Ok(OpCode::CloseSession),
            -1 => Ok(OpCode::Error),
            other => Err(Error::UnknownOpCode(other)),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header carried by every logged transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnHeader {
    /// Session that issued the request
    pub client_id: SessionId,
    /// Client-assigned call id
    pub cxid: i32,
    /// Global transaction id
    pub zxid: Zxid,
    /// Wall-clock time of the proposal (milliseconds since epoch)
    pub time: i64,
    /// Transaction type
    pub op: OpCode,
}

impl TxnHeader {
    /// Create a header
    pub fn new(client_id: SessionId, cxid: i32, zxid: Zxid, time: i64, op: OpCode) -> Self {
        TxnHeader {
            client_id,
            cxid,
            zxid,
            time,
            op,
        }
    }

    /// Create a header stamped with the current wall-clock time
    pub fn now(client_id: SessionId, cxid: i32, zxid: Zxid, op: OpCode) -> Self {
        Self::new(client_id, cxid, zxid, now_millis(), op)
    }

    /// Same header with a different op code (used for multi sub-transactions)
    pub fn with_op(&self, op: OpCode) -> Self {
        TxnHeader { op, ..*self }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Per-node bookkeeping.
///
/// `cversion`/`pzxid` track child-structure changes and must be identical on
/// every replica after replaying the same zxid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stat {
    /// zxid that created the node
    pub czxid: Zxid,
    /// zxid that last modified the node's data
    pub mzxid: Zxid,
    /// zxid that last changed the node's children
    pub pzxid: Zxid,
    /// Creation time (ms)
    pub ctime: i64,
    /// Last data modification time (ms)
    pub mtime: i64,
    /// Number of data changes
    pub version: i32,
    /// Number of child-structure changes
    pub cversion: i32,
    /// Number of ACL changes
    pub aversion: i32,
    /// Owning session for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: SessionId,
}

/// Permission bits for [`Acl::perms`]
pub mod perms {
    /// Read data and list children
    pub const READ: i32 = 1;
    /// Set data
    pub const WRITE: i32 = 1 << 1;
    /// Create children
    pub const CREATE: i32 = 1 << 2;
    /// Delete children
    pub const DELETE: i32 = 1 << 3;
    /// Set ACL
    pub const ADMIN: i32 = 1 << 4;
    /// Everything
    pub const ALL: i32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// Access control entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Acl {
    /// Permission bits
    pub perms: i32,
    /// Authentication scheme ("world", "digest", ...)
    pub scheme: String,
    /// Identity within the scheme
    pub id: String,
}

impl Acl {
    /// Create an ACL entry
    pub fn new(perms: i32, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Acl {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// `world:anyone` with every permission
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::ALL, "world", "anyone")]
    }

    /// `world:anyone` with read permission only
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::READ, "world", "anyone")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_wire_values() {
        assert_eq!(OpCode::Create.code(), 1);
        assert_eq!(OpCode::Multi.code(), 14);
        assert_eq!(OpCode::CloseSession.code(), -11);
        assert_eq!(OpCode::try_from(-10).unwrap(), OpCode::CreateSession);
    }

    #[test]
    fn test_opcode_unknown() {
        assert!(matches!(
            OpCode::try_from(99),
            Err(Error::UnknownOpCode(99))
        ));
    }

    #[test]
    fn test_header_with_op_keeps_zxid() {
        let hdr = TxnHeader::new(0xabcd, 0x123, 42, 1000, OpCode::Multi);
        let sub = hdr.with_op(OpCode::Create);
        assert_eq!(sub.zxid, 42);
        assert_eq!(sub.client_id, 0xabcd);
        assert_eq!(sub.op, OpCode::Create);
    }

    #[test]
    fn test_open_unsafe_acl() {
        let acl = Acl::open_unsafe();
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].perms, perms::ALL);
        assert_eq!(acl[0].scheme, "world");
    }
}
