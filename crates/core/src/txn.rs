//! Transaction bodies
//!
//! A [`Txn`] is the payload that follows a [`TxnHeader`](crate::TxnHeader) in
//! the log. Every variant maps to exactly one [`OpCode`].

use crate::types::{Acl, OpCode};
use serde::{Deserialize, Serialize};

/// `parent_cversion` value meaning "parent's current cversion + 1"
pub const DERIVE_PARENT_CVERSION: i32 = -1;

/// Create a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTxn {
    /// Full path of the new node
    pub path: String,
    /// Initial data
    pub data: Vec<u8>,
    /// Initial ACL
    pub acl: Vec<Acl>,
    /// Owned by the issuing session
    pub ephemeral: bool,
    /// Parent cversion after the create, or [`DERIVE_PARENT_CVERSION`]
    pub parent_cversion: i32,
}

/// Delete a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTxn {
    /// Full path of the node
    pub path: String,
}

/// Replace a node's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDataTxn {
    /// Full path of the node
    pub path: String,
    /// New data
    pub data: Vec<u8>,
    /// Data version after the change
    pub version: i32,
}

/// Replace a node's ACL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAclTxn {
    /// Full path of the node
    pub path: String,
    /// New ACL
    pub acl: Vec<Acl>,
    /// ACL version after the change
    pub version: i32,
}

/// Version check (only meaningful inside a multi)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVersionTxn {
    /// Full path of the node
    pub path: String,
    /// Expected version
    pub version: i32,
}

/// Failed operation placeholder carrying its result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTxn {
    /// Result code of the failed operation
    pub err: i32,
}

/// Session opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionTxn {
    /// Negotiated session timeout (ms)
    pub timeout: i32,
}

/// Ordered list of sub-transactions applied under one zxid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTxn {
    /// Sub-transactions in application order
    pub txns: Vec<Txn>,
}

/// Transaction body, tagged by operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Txn {
    /// Create a node
    Create(CreateTxn),
    /// Delete a node
    Delete(DeleteTxn),
    /// Replace data
    SetData(SetDataTxn),
    /// Replace ACL
    SetAcl(SetAclTxn),
    /// Version check
    Check(CheckVersionTxn),
    /// Atomic group
    Multi(MultiTxn),
    /// Failed operation
    Error(ErrorTxn),
    /// Session opened
    CreateSession(CreateSessionTxn),
    /// Session closed
    CloseSession,
}

impl Txn {
    /// Op code that identifies this body on disk
    pub fn op_code(&self) -> OpCode {
        match self {
            Txn::Create(_) => OpCode::Create,
            Txn::Delete(_) => OpCode::Delete,
            Txn::SetData(_) => OpCode::SetData,
            Txn::SetAcl(_) => OpCode::SetAcl,
            Txn::Check(_) => OpCode::Check,
            Txn::Multi(_) => OpCode::Multi,
            Txn::Error(_) => OpCode::Error,
            Txn::CreateSession(_) => OpCode::CreateSession,
            Txn::CloseSession => OpCode::CloseSession,
        }
    }

    /// Path targeted by this transaction, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Txn::Create(t) => Some(&t.path),
            Txn::Delete(t) => Some(&t.path),
            Txn::SetData(t) => Some(&t.path),
            Txn::SetAcl(t) => Some(&t.path),
            Txn::Check(t) => Some(&t.path),
            Txn::Multi(_) | Txn::Error(_) | Txn::CreateSession(_) | Txn::CloseSession => None,
        }
    }

    /// Persistent create with an open ACL
    pub fn create(path: impl Into<String>, data: impl Into<Vec<u8>>, parent_cversion: i32) -> Self {
        Txn::Create(CreateTxn {
            path: path.into(),
            data: data.into(),
            acl: Acl::open_unsafe(),
            ephemeral: false,
            parent_cversion,
        })
    }

    /// Ephemeral create with an open ACL
    pub fn create_ephemeral(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Txn::Create(CreateTxn {
            path: path.into(),
            data: data.into(),
            acl: Acl::open_unsafe(),
            ephemeral: true,
            parent_cversion: DERIVE_PARENT_CVERSION,
        })
    }

    /// Delete
    pub fn delete(path: impl Into<String>) -> Self {
        Txn::Delete(DeleteTxn { path: path.into() })
    }

    /// Set data
    pub fn set_data(path: impl Into<String>, data: impl Into<Vec<u8>>, version: i32) -> Self {
        Txn::SetData(SetDataTxn {
            path: path.into(),
            data: data.into(),
            version,
        })
    }

    /// Multi
    pub fn multi(txns: Vec<Txn>) -> Self {
        Txn::Multi(MultiTxn { txns })
    }
}
