//! In-memory hierarchical data tree
//!
//! The tree is the replicated state machine. Every mutation arrives through
//! [`DataTree::apply_transaction`](crate::DataTree::apply_transaction); the
//! node-level operations here are its building blocks and are also used to
//! seed trees directly in tests.
//!
//! Node-level operations are split in two steps:
//! - a data step (`insert_node`, `remove_node`) that touches node contents and
//!   the parent's child set, and
//! - a bookkeeping step (`bookkeep_create`, `bookkeep_delete`) that moves the
//!   parent's `cversion`/`pzxid` depending on the outcome.
//!
//! Keeping them apart makes the create/delete asymmetry explicit: a create
//! that hits `NodeExists` still advances the parent, a failed delete does not.

use crate::acl_cache::AclCache;
use crate::node::DataNode;
use keeperlog_core::{path, Acl, Outcome, SessionId, Stat, Zxid, DERIVE_PARENT_CVERSION};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// The replicated in-memory tree
#[derive(Debug, Clone)]
pub struct DataTree {
    pub(crate) nodes: FxHashMap<String, DataNode>,
    pub(crate) ephemerals: FxHashMap<SessionId, BTreeSet<String>>,
    pub(crate) sessions: BTreeMap<SessionId, i32>,
    pub(crate) acl_cache: AclCache,
    pub(crate) last_processed_zxid: Zxid,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    /// Create a tree containing only the root node
    pub fn new() -> Self {
        let mut acl_cache = AclCache::new();
        let root_acl = acl_cache.convert(&Acl::open_unsafe());
        let mut nodes = FxHashMap::default();
        nodes.insert(
            path::ROOT.to_string(),
            DataNode::new(Vec::new(), root_acl, Stat::default()),
        );
        DataTree {
            nodes,
            ephemerals: FxHashMap::default(),
            sessions: BTreeMap::new(),
            acl_cache,
            last_processed_zxid: 0,
        }
    }

    // ========================================================================
    // Watermark
    // ========================================================================

    /// Highest zxid applied to this tree
    pub fn last_processed_zxid(&self) -> Zxid {
        self.last_processed_zxid
    }

    /// Overwrite the watermark.
    ///
    /// Used when loading a snapshot (the tag becomes the watermark) and to
    /// emulate a snapshot whose tag lags its content.
    pub fn set_last_processed_zxid(&mut self, zxid: Zxid) {
        self.last_processed_zxid = zxid;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Look up a node
    pub fn node(&self, path: &str) -> Option<&DataNode> {
        self.nodes.get(path)
    }

    /// Node stat
    pub fn stat(&self, path: &str) -> Option<Stat> {
        self.nodes.get(path).map(|n| n.stat)
    }

    /// Node data
    pub fn get_data(&self, path: &str) -> Option<&[u8]> {
        self.nodes.get(path).map(|n| n.data.as_slice())
    }

    /// Sorted child names
    pub fn get_children(&self, path: &str) -> Option<Vec<String>> {
        self.nodes
            .get(path)
            .map(|n| n.children.iter().cloned().collect())
    }

    /// Resolved ACL of a node
    pub fn get_acl(&self, path: &str) -> Option<&[Acl]> {
        self.nodes
            .get(path)
            .and_then(|n| self.acl_cache.get(n.acl))
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Open sessions and their timeouts
    pub fn sessions(&self) -> &BTreeMap<SessionId, i32> {
        &self.sessions
    }

    /// Ephemeral paths owned by `session`, sorted
    pub fn ephemerals(&self, session: SessionId) -> Vec<String> {
        self.ephemerals
            .get(&session)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Interned ACL lists
    pub fn acl_cache(&self) -> &AclCache {
        &self.acl_cache
    }

    /// Path for the next sequential child of `prefix`'s parent.
    ///
    /// The counter is the parent's `cversion`, so it keeps counting after a
    /// restart as long as replay reproduced the parent's bookkeeping.
    pub fn next_sequential_path(&self, prefix: &str) -> Option<String> {
        let (parent, _) = path::split_parent(prefix)?;
        let parent = self.nodes.get(parent)?;
        Some(path::sequential_name(prefix, parent.stat.cversion))
    }

    /// Order-independent fingerprint of the tree content.
    ///
    /// Covers paths, data, stat fields, resolved ACLs and sessions, but not
    /// the watermark. Two replicas that replayed the same zxids must agree.
    pub fn digest(&self) -> u32 {
        let mut paths: Vec<&String> = self.nodes.keys().collect();
        paths.sort();

        let mut hasher = crc32fast::Hasher::new();
        for p in paths {
            let node = &self.nodes[p];
            hasher.update(p.as_bytes());
            hasher.update(&(node.data.len() as u64).to_le_bytes());
            hasher.update(&node.data);
            let s = &node.stat;
            for v in [s.czxid, s.mzxid, s.pzxid] {
                hasher.update(&v.to_le_bytes());
            }
            for v in [s.ctime, s.mtime, s.ephemeral_owner] {
                hasher.update(&v.to_le_bytes());
            }
            for v in [s.version, s.cversion, s.aversion] {
                hasher.update(&v.to_le_bytes());
            }
            if let Some(acl) = self.acl_cache.get(node.acl) {
                for entry in acl {
                    hasher.update(&entry.perms.to_le_bytes());
                    hasher.update(entry.scheme.as_bytes());
                    hasher.update(entry.id.as_bytes());
                }
            }
        }
        for (session, timeout) in &self.sessions {
            hasher.update(&session.to_le_bytes());
            hasher.update(&timeout.to_le_bytes());
        }
        hasher.finalize()
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Create a node and update the parent's bookkeeping.
    #[allow(clippy::too_many_arguments)]
    pub fn create_node(
        &mut self,
        path: &str,
        data: Vec<u8>,
        acl: &[Acl],
        ephemeral_owner: SessionId,
        parent_cversion: i32,
        zxid: Zxid,
        time: i64,
    ) -> Outcome {
        let outcome = self.insert_node(path, data, acl, ephemeral_owner, zxid, time);
        self.bookkeep_create(path, parent_cversion, zxid, outcome);
        outcome
    }

    /// Delete a node and update the parent's bookkeeping.
    pub fn delete_node(&mut self, path: &str, zxid: Zxid) -> Outcome {
        let outcome = self.remove_node(path);
        self.bookkeep_delete(path, zxid, outcome);
        outcome
    }

    /// Replace a node's data
    pub fn set_data(&mut self, path: &str, data: Vec<u8>, version: i32, zxid: Zxid, time: i64) -> Outcome {
        match self.nodes.get_mut(path) {
            Some(node) => {
                node.data = data;
                node.stat.version = version;
                node.stat.mzxid = zxid;
                node.stat.mtime = time;
                Outcome::Ok
            }
            None => Outcome::NoNode,
        }
    }

    /// Replace a node's ACL
    pub fn set_acl(&mut self, path: &str, acl: &[Acl], version: i32) -> Outcome {
        if !self.nodes.contains_key(path) {
            return Outcome::NoNode;
        }
        let acl_ref = self.acl_cache.convert(acl);
        if let Some(node) = self.nodes.get_mut(path) {
            node.acl = acl_ref;
            node.stat.aversion = version;
        }
        Outcome::Ok
    }

    /// Advance a node's `cversion`/`pzxid`, never moving them backwards.
    ///
    /// `new_cversion == -1` means "current + 1".
    pub fn set_cversion_pzxid(&mut self, path: &str, new_cversion: i32, zxid: Zxid) -> Outcome {
        let Some(node) = self.nodes.get_mut(path) else {
            return Outcome::NoNode;
        };
        let target = if new_cversion == DERIVE_PARENT_CVERSION {
            node.stat.cversion + 1
        } else {
            new_cversion
        };
        if target > node.stat.cversion {
            node.stat.cversion = target;
            node.stat.pzxid = zxid;
        }
        Outcome::Ok
    }

    /// Register a session
    pub fn add_session(&mut self, session: SessionId, timeout: i32) {
        self.sessions.insert(session, timeout);
    }

    /// Close a session, deleting its ephemeral nodes at `zxid`
    pub fn kill_session(&mut self, session: SessionId, zxid: Zxid) {
        self.sessions.remove(&session);
        let Some(paths) = self.ephemerals.remove(&session) else {
            return;
        };
        for p in paths {
            let outcome = self.delete_node(&p, zxid);
            if !outcome.is_ok() {
                warn!(
                    session = format!("{:#x}", session),
                    path = %p,
                    %outcome,
                    "Ephemeral node could not be removed on session close"
                );
            }
        }
    }

    // ========================================================================
    // Data step
    // ========================================================================

    fn insert_node(
        &mut self,
        path: &str,
        data: Vec<u8>,
        acl: &[Acl],
        ephemeral_owner: SessionId,
        zxid: Zxid,
        time: i64,
    ) -> Outcome {
        let Some((parent_path, child)) = path::split_parent(path) else {
            return Outcome::NodeExists;
        };
        match self.nodes.get(parent_path) {
            None => return Outcome::NoNode,
            Some(parent) if parent.is_ephemeral() => return Outcome::NoChildrenForEphemerals,
            Some(parent) if parent.children.contains(child) => return Outcome::NodeExists,
            Some(_) => {}
        }

        let acl_ref = self.acl_cache.convert(acl);
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: time,
            mtime: time,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner,
        };
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.insert(child.to_string());
        }
        self.nodes
            .insert(path.to_string(), DataNode::new(data, acl_ref, stat));
        if ephemeral_owner != 0 {
            self.ephemerals
                .entry(ephemeral_owner)
                .or_default()
                .insert(path.to_string());
        }
        Outcome::Ok
    }

    fn remove_node(&mut self, path: &str) -> Outcome {
        let Some((parent_path, child)) = path::split_parent(path) else {
            debug!("Refusing to delete the root node");
            return Outcome::RuntimeInconsistency;
        };
        match self.nodes.get(path) {
            None => return Outcome::NoNode,
            Some(node) if !node.children.is_empty() => return Outcome::NotEmpty,
            Some(_) => {}
        }

        let Some(node) = self.nodes.remove(path) else {
            return Outcome::NoNode;
        };
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.remove(child);
        }
        let owner = node.stat.ephemeral_owner;
        if owner != 0 {
            if let Some(set) = self.ephemerals.get_mut(&owner) {
                set.remove(path);
                if set.is_empty() {
                    self.ephemerals.remove(&owner);
                }
            }
        }
        Outcome::Ok
    }

    // ========================================================================
    // Bookkeeping step
    // ========================================================================

    /// Parent bookkeeping for a create.
    ///
    /// Success sets the parent's counters outright. `NodeExists` still advances
    /// them (never backwards): a snapshot can contain a child created after the
    /// parent was serialized, and replaying that create must leave the parent
    /// exactly where the live replica left it. `NoNode` has no parent to touch.
    pub(crate) fn bookkeep_create(&mut self, path: &str, parent_cversion: i32, zxid: Zxid, outcome: Outcome) {
        let Some((parent_path, _)) = path::split_parent(path) else {
            return;
        };
        match outcome {
            Outcome::Ok => {
                if let Some(parent) = self.nodes.get_mut(parent_path) {
                    parent.stat.cversion = if parent_cversion == DERIVE_PARENT_CVERSION {
                        parent.stat.cversion + 1
                    } else {
                        parent_cversion
                    };
                    parent.stat.pzxid = zxid;
                }
            }
            Outcome::NodeExists => {
                debug!(path, zxid, "Adjusting parent cversion after NodeExists");
                if self.set_cversion_pzxid(parent_path, parent_cversion, zxid) == Outcome::NoNode {
                    warn!(parent = parent_path, "Failed to set parent cversion: parent missing");
                }
            }
            _ => {}
        }
    }

    /// Parent bookkeeping for a delete: only a successful delete counts.
    pub(crate) fn bookkeep_delete(&mut self, path: &str, zxid: Zxid, outcome: Outcome) {
        if outcome != Outcome::Ok {
            return;
        }
        let Some((parent_path, _)) = path::split_parent(path) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.stat.cversion += 1;
            parent.stat.pzxid = zxid;
        }
    }
}
