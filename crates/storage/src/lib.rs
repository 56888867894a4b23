//! In-memory data store for keeperlog
//!
//! This crate holds the replicated state machine:
//! - [`DataTree`]: path-indexed hierarchical tree with per-node [`Stat`] bookkeeping
//! - [`DataTree::apply_transaction`]: deterministic transition used by live
//!   processing and log replay alike
//! - [`AclCache`]: interned ACL lists referenced by nodes
//! - Session table with ephemeral ownership
//! - Snapshot image encoding ([`DataTree::serialize_image`], [`DataTree::from_image`])
//!
//! The tree has no notion of files. Durability lives in `keeperlog-durability`
//! and orchestration in `keeperlog-engine`.
//!
//! [`Stat`]: keeperlog_core::Stat

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acl_cache;
pub mod apply;
pub mod error;
pub mod image;
pub mod node;
pub mod tree;

pub use acl_cache::AclCache;
pub use apply::TxnResult;
pub use error::ImageError;
pub use node::DataNode;
pub use tree::DataTree;
