//! Persistence configuration via `keeperlog.toml`
//!
//! The file lives in the data directory. On first open a commented default is
//! written; edit it and restart to change settings.

use crate::error::{PersistenceError, Result};
use keeperlog_durability::{DurabilityMode, NeverRoll, RollAtSize, RollEveryN, RollPolicy, WalConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "keeperlog.toml";

/// Default segment preallocation (64 MiB)
pub const DEFAULT_PREALLOCATE_SIZE: u64 = 64 * 1024 * 1024;

/// Persistence settings loaded from `keeperlog.toml`.
///
/// # Example
///
/// ```toml
/// durability = "always"
/// autocreate = true
/// roll_every = 100000
/// snap_count = 100000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Separate directory for transaction logs; defaults to the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_log_dir: Option<PathBuf>,
    /// Create missing directories on open.
    #[serde(default = "default_autocreate")]
    pub autocreate: bool,
    /// Durability mode: `"always"`, `"standard"` or `"flush"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Bytes by which a log segment is extended at a time.
    #[serde(default = "default_preallocate_size")]
    pub preallocate_size: u64,
    /// Roll the log after this many records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_every: Option<u64>,
    /// Roll the log once a segment reaches this many bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_at_bytes: Option<u64>,
    /// Roll and snapshot in the background after this many transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap_count: Option<u64>,
    /// Database id stamped into every file header.
    #[serde(default)]
    pub dbid: u64,
}

fn default_autocreate() -> bool {
    true
}

fn default_durability_str() -> String {
    "always".to_string()
}

fn default_preallocate_size() -> u64 {
    DEFAULT_PREALLOCATE_SIZE
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_log_dir: None,
            autocreate: default_autocreate(),
            durability: default_durability_str(),
            preallocate_size: default_preallocate_size(),
            roll_every: None,
            roll_at_bytes: None,
            snap_count: None,
            dbid: 0,
        }
    }
}

impl PersistenceConfig {
    /// Small preallocation and no auto-snapshots, for tests
    pub fn for_testing() -> Self {
        Self {
            preallocate_size: 64 * 1024,
            ..Self::default()
        }
    }

    /// Put logs in `dir` instead of the data directory
    pub fn with_data_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_log_dir = Some(dir.into());
        self
    }

    /// Enable or disable directory autocreate
    pub fn with_autocreate(mut self, autocreate: bool) -> Self {
        self.autocreate = autocreate;
        self
    }

    /// Set the durability mode by name
    pub fn with_durability(mut self, name: impl Into<String>) -> Self {
        self.durability = name.into();
        self
    }

    /// Roll the log every `n` records
    pub fn with_roll_every(mut self, n: u64) -> Self {
        self.roll_every = Some(n);
        self
    }

    /// Roll and snapshot every `n` transactions
    pub fn with_snap_count(mut self, n: u64) -> Self {
        self.snap_count = Some(n);
        self
    }

    /// Parse the durability string into a [`DurabilityMode`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Config`] for an unknown name.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        DurabilityMode::from_name(&self.durability).ok_or_else(|| {
            PersistenceError::Config(format!(
                "invalid durability mode '{}' in {}. Expected \"always\", \"standard\" or \"flush\".",
                self.durability, CONFIG_FILE_NAME
            ))
        })
    }

    /// WAL settings derived from this config
    pub fn wal_config(&self) -> Result<WalConfig> {
        let config = WalConfig::new()
            .with_preallocate_size(self.preallocate_size)
            .with_durability(self.durability_mode()?)
            .with_dbid(self.dbid);
        config
            .validate()
            .map_err(|e| PersistenceError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Roll policy derived from this config; a record count wins over a size
    pub fn roll_policy(&self) -> Box<dyn RollPolicy> {
        match (self.roll_every, self.roll_at_bytes) {
            (Some(n), _) => Box::new(RollEveryN(n)),
            (None, Some(bytes)) => Box::new(RollAtSize(bytes)),
            (None, None) => Box::new(NeverRoll),
        }
    }

    /// Check every field without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.wal_config()?;
        if self.roll_every == Some(0) {
            return Err(PersistenceError::Config("roll_every must be at least 1".into()));
        }
        if self.roll_at_bytes == Some(0) {
            return Err(PersistenceError::Config("roll_at_bytes must be at least 1".into()));
        }
        if self.snap_count == Some(0) {
            return Err(PersistenceError::Config("snap_count must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# keeperlog persistence configuration
#
# Durability mode: "always" (default), "standard" or "flush"
#   "always"   = fsync every commit, zero data loss
#   "standard" = fsync every 100ms or 1000 commits
#   "flush"    = flush to the OS only, lost on machine crash
durability = "always"

# Create missing data and log directories on open (default: true)
autocreate = true

# Bytes by which a log segment grows at a time (default: 64 MiB)
preallocate_size = 67108864

# Keep logs on a separate device
# data_log_dir = "/var/lib/keeperlog/log"

# Roll the log after this many records, or once a segment reaches a size
# roll_every = 100000
# roll_at_bytes = 1073741824

# Roll the log and snapshot in the background after this many transactions
# snap_count = 100000
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PersistenceError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: PersistenceConfig = toml::from_str(&content).map_err(|e| {
            PersistenceError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                PersistenceError::Config(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PersistenceError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            PersistenceError::Config(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeperlog_core::{OpCode, TxnHeader};
    use keeperlog_durability::SegmentStats;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_always() {
        let config = PersistenceConfig::default();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Always);
        assert!(config.autocreate);
        assert_eq!(config.snap_count, None);
    }

    #[test]
    fn parse_standard() {
        let config: PersistenceConfig = toml::from_str("durability = \"standard\"").unwrap();
        assert!(matches!(
            config.durability_mode().unwrap(),
            DurabilityMode::Standard { .. }
        ));
    }

    #[test]
    fn parse_invalid_mode_returns_error() {
        let config: PersistenceConfig = toml::from_str("durability = \"turbo\"").unwrap();
        assert!(matches!(
            config.durability_mode(),
            Err(PersistenceError::Config(_))
        ));
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config: PersistenceConfig = toml::from_str(PersistenceConfig::default_toml()).unwrap();
        assert_eq!(config, PersistenceConfig::default());
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(PersistenceConfig::default().with_roll_every(0).validate().is_err());
        assert!(PersistenceConfig::default().with_snap_count(0).validate().is_err());
        let tiny = PersistenceConfig {
            preallocate_size: 16,
            ..PersistenceConfig::default()
        };
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn roll_policy_prefers_record_count() {
        let config = PersistenceConfig {
            roll_every: Some(2),
            roll_at_bytes: Some(u64::MAX),
            ..PersistenceConfig::default()
        };
        let policy = config.roll_policy();
        let next = TxnHeader::new(1, 1, 3, 0, OpCode::Create);
        let tail = SegmentStats {
            first_zxid: 1,
            records: 2,
            bytes: 100,
        };
        assert!(policy.should_roll(&tail, &next));
        assert!(!PersistenceConfig::default().roll_policy().should_roll(&tail, &next));
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "durability = \"flush\"\n").unwrap();
        PersistenceConfig::write_default_if_missing(&path).unwrap();

        let config = PersistenceConfig::from_file(&path).unwrap();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Flush);
    }

    #[test]
    fn write_to_file_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = PersistenceConfig::for_testing()
            .with_data_log_dir(dir.path().join("log"))
            .with_snap_count(50);

        config.write_to_file(&path).unwrap();
        assert_eq!(PersistenceConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = PersistenceConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, PersistenceError::Config(_)));
    }
}
