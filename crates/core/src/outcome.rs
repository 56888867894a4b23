//! Transaction-level outcomes
//!
//! These are not errors: replay keeps going whatever the outcome, and the
//! outcome only decides which bookkeeping branch runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of applying one transaction to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Applied
    Ok,
    /// Target (or its parent, for create) does not exist
    NoNode,
    /// Create target already exists
    NodeExists,
    /// Version check failed
    BadVersion,
    /// Delete target still has children
    NotEmpty,
    /// Parent is ephemeral and cannot have children
    NoChildrenForEphemerals,
    /// Sub-operation after a failure inside a rolled-back multi
    RuntimeInconsistency,
    /// Path is not a well-formed absolute node path
    BadArguments,
}

impl Outcome {
    /// Stable integer code, as carried by error transactions
    pub fn code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::RuntimeInconsistency => -2,
            Outcome::BadArguments => -8,
            Outcome::NoNode => -101,
            Outcome::BadVersion => -103,
            Outcome::NoChildrenForEphemerals => -108,
            Outcome::NodeExists => -110,
            Outcome::NotEmpty => -111,
        }
    }

    /// Map a code back to an outcome; unknown codes read as runtime inconsistency
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Outcome::Ok,
            -8 => Outcome::BadArguments,
            -101 => Outcome::NoNode,
            -103 => Outcome::BadVersion,
            -108 => Outcome::NoChildrenForEphemerals,
            -110 => Outcome::NodeExists,
            -111 => Outcome::NotEmpty,
            _ => Outcome::RuntimeInconsistency,
        }
    }

    /// True for [`Outcome::Ok`]
    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Ok => "ok",
            Outcome::NoNode => "no node",
            Outcome::NodeExists => "node exists",
            Outcome::BadVersion => "bad version",
            Outcome::NotEmpty => "not empty",
            Outcome::NoChildrenForEphemerals => "no children for ephemerals",
            Outcome::RuntimeInconsistency => "runtime inconsistency",
            Outcome::BadArguments => "bad arguments",
        };
        f.write_str(name)
    }
}
