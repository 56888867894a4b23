//! Error types for core types
//!
//! Transaction-level outcomes (`NoNode`, `NodeExists`, ...) are not errors;
//! see [`Outcome`](crate::Outcome).

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while interpreting core types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Op code not known to this version
    #[error("Unknown op code: {0}")]
    UnknownOpCode(i32),

    /// Malformed node path
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path
        path: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_opcode() {
        let msg = Error::UnknownOpCode(42).to_string();
        assert!(msg.contains("Unknown op code"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_error_display_path() {
        let err = Error::InvalidPath {
            path: "a/b".to_string(),
            reason: "path must start with /",
        };
        assert!(err.to_string().contains("a/b"));
    }
}
