//! Error types for devtrack-core

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using devtrack-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in devtrack-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Document store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Artifact rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// Blob/object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation exceeded its configured deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}
