//! Interned ACL lists
//!
//! Most nodes share a handful of ACL lists, so nodes store a `u64` reference
//! and the lists themselves live here. The cache is part of the snapshot
//! image; references are assigned in first-use order, which keeps them
//! identical across replicas replaying the same log.

use keeperlog_core::Acl;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Bidirectional map between ACL lists and their references
#[derive(Debug, Clone, Default)]
pub struct AclCache {
    by_ref: BTreeMap<u64, Vec<Acl>>,
    by_acl: FxHashMap<Vec<Acl>, u64>,
    next_ref: u64,
}

impl AclCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the reference for `acl`, interning it on first use
    pub fn convert(&mut self, acl: &[Acl]) -> u64 {
        if let Some(&r) = self.by_acl.get(acl) {
            return r;
        }
        let r = self.next_ref;
        self.next_ref += 1;
        self.by_ref.insert(r, acl.to_vec());
        self.by_acl.insert(acl.to_vec(), r);
        r
    }

    /// Resolve a reference
    pub fn get(&self, r: u64) -> Option<&[Acl]> {
        self.by_ref.get(&r).map(Vec::as_slice)
    }

    /// Number of distinct lists
    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    /// True if nothing has been interned
    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }

    /// Entries in reference order
    pub fn entries(&self) -> impl Iterator<Item = (u64, &[Acl])> {
        self.by_ref.iter().map(|(r, acl)| (*r, acl.as_slice()))
    }

    /// Rebuild from snapshot entries
    pub(crate) fn from_entries(entries: Vec<(u64, Vec<Acl>)>) -> Self {
        let mut cache = AclCache::new();
        for (r, acl) in entries {
            cache.next_ref = cache.next_ref.max(r + 1);
            cache.by_acl.insert(acl.clone(), r);
            cache.by_ref.insert(r, acl);
        }
        cache
    }
}
