//! WAL configuration.

use super::DurabilityMode;

/// Smallest non-zero preallocation block
pub const MIN_PREALLOCATE_SIZE: u64 = 4 * 1024;

/// WAL configuration parameters.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Preallocation block size in bytes (default: 64MB).
    ///
    /// Segment files are extended in blocks of this size, zero-filled, so
    /// appends rarely change the file length. `0` disables preallocation.
    pub preallocate_size: u64,

    /// When `commit` fsyncs.
    pub durability: DurabilityMode,

    /// Database id written into every segment header.
    pub dbid: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            preallocate_size: 64 * 1024 * 1024,
            durability: DurabilityMode::default(),
            dbid: 0,
        }
    }
}

impl WalConfig {
    /// Create a new WAL configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set preallocation block size (builder pattern).
    pub fn with_preallocate_size(mut self, size: u64) -> Self {
        self.preallocate_size = size;
        self
    }

    /// Set durability mode (builder pattern).
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set database id (builder pattern).
    pub fn with_dbid(mut self, dbid: u64) -> Self {
        self.dbid = dbid;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.preallocate_size != 0 && self.preallocate_size < MIN_PREALLOCATE_SIZE {
            return Err(WalConfigError::PreallocateTooSmall);
        }
        if let DurabilityMode::Standard { batch_size, .. } = self.durability {
            if batch_size == 0 {
                return Err(WalConfigError::ZeroBatchSize);
            }
        }
        Ok(())
    }

    /// Create a configuration for testing (small preallocation blocks).
    pub fn for_testing() -> Self {
        WalConfig {
            preallocate_size: 64 * 1024,
            durability: DurabilityMode::Always,
            dbid: 0,
        }
    }
}

/// WAL configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Preallocation block is non-zero but below the minimum.
    #[error("Preallocation size must be 0 or at least 4KB")]
    PreallocateTooSmall,

    /// Standard durability with a zero batch size.
    #[error("Standard durability batch size must be positive")]
    ZeroBatchSize,
}
