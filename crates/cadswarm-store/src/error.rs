//! Error types for the model persistence layer.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record under the given workspace/entity key
    #[error("record not found: {workspace}/{entity}")]
    NotFound { workspace: String, entity: String },

    /// Backend connection error
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Backend query error
    #[error("store query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
