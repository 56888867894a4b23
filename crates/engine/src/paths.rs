//! Data directory layout
//!
//! ```text
//! <data_dir>/
//! ├── keeperlog.toml
//! ├── .lock
//! └── version-2/
//!     └── snapshot.<zxid>
//! <data_log_dir>/          (defaults to <data_dir>)
//! └── version-2/
//!     └── log.<zxid>
//! ```

use crate::error::{PersistenceError, Result};
use keeperlog_durability::format::VERSION_DIR;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// Lock file name inside the data directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Paths of the snapshot and log directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapLogPaths {
    data_dir: PathBuf,
    data_log_dir: PathBuf,
}

impl SnapLogPaths {
    /// Layout rooted at `data_dir`, with logs in `data_log_dir` when given
    pub fn new(data_dir: impl AsRef<Path>, data_log_dir: Option<&Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let data_log_dir = data_log_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.clone());
        SnapLogPaths {
            data_dir,
            data_log_dir,
        }
    }

    /// Base data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Base log directory
    pub fn data_log_dir(&self) -> &Path {
        &self.data_log_dir
    }

    /// Directory holding snapshot files
    pub fn snap_dir(&self) -> PathBuf {
        self.data_dir.join(VERSION_DIR)
    }

    /// Directory holding log segments
    pub fn log_dir(&self) -> PathBuf {
        self.data_log_dir.join(VERSION_DIR)
    }

    /// Lock file path
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE_NAME)
    }

    /// True if both base directories exist
    pub fn exists(&self) -> bool {
        self.data_dir.is_dir() && self.data_log_dir.is_dir()
    }

    /// Make sure the base directories exist and create the versioned
    /// subdirectories.
    ///
    /// With `autocreate` off a missing base directory is
    /// [`PersistenceError::MissingDirectory`].
    pub fn prepare(&self, autocreate: bool) -> Result<()> {
        for base in [&self.data_dir, &self.data_log_dir] {
            if base.is_dir() {
                continue;
            }
            if !autocreate {
                return Err(PersistenceError::MissingDirectory { path: base.clone() });
            }
            std::fs::create_dir_all(base)?;
            info!(dir = %base.display(), "Created data directory");
        }
        self.create_directories()?;
        Ok(())
    }

    /// Create the versioned subdirectories
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.snap_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    /// Take the exclusive directory lock.
    ///
    /// The lock is held for as long as the returned file stays open.
    pub fn lock(&self) -> Result<File> {
        let path = self.lock_file();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        fs2::FileExt::try_lock_exclusive(&file)
            .map_err(|_| PersistenceError::DirectoryLocked { path })?;
        Ok(file)
    }
}
