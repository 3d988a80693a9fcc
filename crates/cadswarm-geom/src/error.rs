//! Error types for the geometry engine boundary.

use thiserror::Error;

/// Errors produced by geometry evaluation.
#[derive(Error, Debug)]
pub enum GeomError {
    /// Parameters describe a degenerate or impossible shape
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A required parameter is missing or has the wrong type
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    /// The engine does not implement the requested operation
    #[error("unsupported geometry operation: {0}")]
    Unsupported(String),

    /// Referenced entity does not exist in the request scope
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// The computation did not complete within the caller's deadline
    #[error("geometry engine timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Serialization of a payload or parameter object failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for geometry operations.
pub type GeomResult<T> = std::result::Result<T, GeomError>;
