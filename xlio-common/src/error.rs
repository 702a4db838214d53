//! Common error types for xlio

use thiserror::Error;

/// Common result type for xlio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across xlio crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wire payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
