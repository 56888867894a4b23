//! Durability mode configuration
//!
//! Controls when `commit` fsyncs the log tail.

use std::time::Duration;

/// When a committed batch is forced to stable storage
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every commit | Zero |
/// | Standard | Every N commits or T milliseconds | Up to interval/batch |
/// | Flush | Never (OS page cache only) | Anything not yet written back |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync on every commit (the default)
    ///
    /// A transaction acknowledged after `commit` survives power loss.
    Always,

    /// fsync every `batch_size` commits or after `interval_ms`
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum commits between fsyncs
        batch_size: usize,
    },

    /// Flush to the OS on commit, never fsync
    ///
    /// Survives a process crash, not a machine crash. Tests and benchmarks.
    Flush,
}

impl DurabilityMode {
    /// True if every commit must fsync
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Decide whether a commit fsyncs, given the work since the last fsync.
    pub fn should_sync(&self, commits_since_sync: usize, since_last_sync: Duration) -> bool {
        match *self {
            DurabilityMode::Always => true,
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                commits_since_sync >= batch_size
                    || since_last_sync.as_millis() as u64 >= interval_ms
            }
            DurabilityMode::Flush => false,
        }
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Standard { .. } => "Standard (balanced speed/safety)",
            DurabilityMode::Flush => "Flush only (lost on machine crash)",
        }
    }

    /// `Standard { interval_ms: 100, batch_size: 1000 }`
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }

    /// Parse the configuration-file spelling: `always`, `standard`, `flush`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "always" => Some(DurabilityMode::Always),
            "standard" => Some(Self::standard_default()),
            "flush" => Some(DurabilityMode::Flush),
            _ => None,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Always
    }
}
