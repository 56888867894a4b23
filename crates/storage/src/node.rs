//! Tree node

use keeperlog_core::Stat;
use std::collections::BTreeSet;

/// A node in the hierarchical tree.
///
/// Children are referenced by name; the node itself is owned by the tree's
/// path index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    /// Node payload
    pub data: Vec<u8>,
    /// Reference into the tree's [`AclCache`](crate::AclCache)
    pub acl: u64,
    /// Bookkeeping fields
    pub stat: Stat,
    pub(crate) children: BTreeSet<String>,
}

impl DataNode {
    pub(crate) fn new(data: Vec<u8>, acl: u64, stat: Stat) -> Self {
        DataNode {
            data,
            acl,
            stat,
            children: BTreeSet::new(),
        }
    }

    /// Child names in sorted order
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    /// Number of children
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// True if the node is owned by a session
    pub fn is_ephemeral(&self) -> bool {
        self.stat.ephemeral_owner != 0
    }
}
