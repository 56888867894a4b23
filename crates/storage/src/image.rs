//! Snapshot image of a [`DataTree`]
//!
//! The image holds everything needed to rebuild the tree except the
//! watermark, which the snapshot file records separately as its tag.
//! Child sets and the ephemeral index are derived data and are rebuilt on
//! load rather than stored.

use crate::acl_cache::AclCache;
use crate::error::{ImageError, Result};
use crate::node::DataNode;
use crate::tree::DataTree;
use keeperlog_core::{path, Acl, SessionId, Stat};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Deserialize)]
struct NodeImage {
    path: String,
    data: Vec<u8>,
    acl: u64,
    stat: Stat,
}

#[derive(Serialize, Deserialize)]
struct TreeImage {
    acls: Vec<(u64, Vec<Acl>)>,
    nodes: Vec<NodeImage>,
    sessions: Vec<(SessionId, i32)>,
}

impl DataTree {
    /// Serialize nodes, ACL cache and session table.
    ///
    /// Nodes are written in path order so equal trees produce equal bytes.
    pub fn serialize_image(&self) -> Result<Vec<u8>> {
        let mut paths: Vec<&String> = self.nodes.keys().collect();
        paths.sort();
        let nodes = paths
            .into_iter()
            .map(|p| {
                let node = &self.nodes[p];
                NodeImage {
                    path: p.clone(),
                    data: node.data.clone(),
                    acl: node.acl,
                    stat: node.stat,
                }
            })
            .collect();

        let image = TreeImage {
            acls: self
                .acl_cache
                .entries()
                .map(|(r, acl)| (r, acl.to_vec()))
                .collect(),
            nodes,
            sessions: self.sessions.iter().map(|(&s, &t)| (s, t)).collect(),
        };
        Ok(bincode::serialize(&image)?)
    }

    /// Rebuild a tree from [`serialize_image`](Self::serialize_image) output.
    ///
    /// The returned tree has a watermark of 0; the caller sets it from the
    /// snapshot tag.
    pub fn from_image(bytes: &[u8]) -> Result<DataTree> {
        let image: TreeImage = bincode::deserialize(bytes)?;
        let acl_cache = AclCache::from_entries(image.acls);

        let mut nodes: FxHashMap<String, DataNode> = FxHashMap::default();
        for n in image.nodes {
            if acl_cache.get(n.acl).is_none() {
                return Err(ImageError::Inconsistent(format!(
                    "node {} references unknown acl {}",
                    n.path, n.acl
                )));
            }
            nodes.insert(n.path, DataNode::new(n.data, n.acl, n.stat));
        }
        if !nodes.contains_key(path::ROOT) {
            return Err(ImageError::Inconsistent("root node missing".to_string()));
        }

        let mut links: Vec<(String, String)> = Vec::new();
        let mut ephemerals: FxHashMap<SessionId, BTreeSet<String>> = FxHashMap::default();
        for (p, node) in &nodes {
            if let Some((parent, child)) = path::split_parent(p) {
                if !nodes.contains_key(parent) {
                    return Err(ImageError::Inconsistent(format!(
                        "node {} has no parent {}",
                        p, parent
                    )));
                }
                links.push((parent.to_string(), child.to_string()));
            }
            if node.is_ephemeral() {
                ephemerals
                    .entry(node.stat.ephemeral_owner)
                    .or_default()
                    .insert(p.clone());
            }
        }
        for (parent, child) in links {
            if let Some(node) = nodes.get_mut(&parent) {
                node.children.insert(child);
            }
        }

        Ok(DataTree {
            nodes,
            ephemerals,
            sessions: image.sessions.into_iter().collect::<BTreeMap<_, _>>(),
            acl_cache,
            last_processed_zxid: 0,
        })
    }
}
