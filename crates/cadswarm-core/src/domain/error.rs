//! Domain-level error taxonomy for cadswarm.
//!
//! Propagation policy: the Controller and Workspace Manager never
//! catch-and-ignore. Every failure path increments the relevant
//! counters and is returned with enough structure (code + message +
//! offending field) for an autonomous agent to retry intelligently.

use cadswarm_geom::GeomError;
use cadswarm_store::StorageError;

/// cadswarm coordination errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("unknown role: {0}")]
    InvalidRole(String),

    #[error("cannot branch from branch {0}: branches are one level deep")]
    InvalidBranch(String),

    #[error("constraint conflict: {description}")]
    ConstraintConflict { description: String },

    #[error("merge blocked for {workspace}: {reason}")]
    MergeBlocked { workspace: String, reason: String },

    #[error("role {role} does not permit {operation} for agent {agent}")]
    Permission {
        agent: String,
        role: String,
        operation: String,
    },

    #[error("role catalogue unavailable at {path}: {reason}")]
    CatalogUnavailable { path: String, reason: String },

    #[error("geometry engine error: {0}")]
    Engine(#[from] GeomError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short stable code string recorded in agent error logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation",
            CoreError::NotFound { .. } => "not_found",
            CoreError::DuplicateAgent(_) => "duplicate_agent",
            CoreError::InvalidRole(_) => "invalid_role",
            CoreError::InvalidBranch(_) => "invalid_branch",
            CoreError::ConstraintConflict { .. } => "constraint_conflict",
            CoreError::MergeBlocked { .. } => "merge_blocked",
            CoreError::Permission { .. } => "permission",
            CoreError::CatalogUnavailable { .. } => "catalog_unavailable",
            CoreError::Engine(GeomError::Timeout { .. }) => "engine_timeout",
            CoreError::Engine(_) => "engine",
            CoreError::Storage(_) => "storage",
            CoreError::Serialization(_) => "serialization",
        }
    }
}

/// Result type for cadswarm domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;
