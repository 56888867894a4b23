//! Persistence engine for keeperlog
//!
//! Ties the transaction log and snapshots from `keeperlog-durability` to the
//! tree from `keeperlog-storage`:
//!
//! - [`PersistenceCoordinator`]: restore, process and snapshot
//! - [`KeeperDatabase`]: shared handle with one writer and concurrent readers
//! - [`PersistenceConfig`]: `keeperlog.toml`
//! - [`SnapLogPaths`]: directory layout and locking

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod paths;

pub use config::{PersistenceConfig, CONFIG_FILE_NAME};
pub use coordinator::{PersistenceCoordinator, RestoreStats};
pub use database::{KeeperDatabase, SnapshotHandle};
pub use error::{PersistenceError, Result};
pub use paths::SnapLogPaths;
