//! Storage error types

use thiserror::Error;

/// Result alias for snapshot image operations
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors decoding or encoding a tree image
#[derive(Debug, Error)]
pub enum ImageError {
    /// bincode failed
    #[error("image codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Decoded image does not describe a valid tree
    #[error("inconsistent image: {0}")]
    Inconsistent(String),
}
