//! Storage trait definitions for cadswarm
//!
//! `ModelStore` is the durable key-value contract the coordinator
//! persists workspace snapshots through. Keys are (workspace id,
//! entity id) pairs; values are opaque serialized records. The trait is
//! async and backend-agnostic; an in-memory fake is provided for
//! testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// Composite key addressing one stored entity record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub workspace: String,
    pub entity: String,
}

impl EntityKey {
    pub fn new(workspace: &str, entity: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            entity: entity.to_string(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workspace, self.entity)
    }
}

/// A stored record: opaque bytes plus write metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: EntityKey,
    pub bytes: Vec<u8>,
    pub written_at: DateTime<Utc>,
}

/// Durable model store.
///
/// Guarantees:
/// - `put` overwrites any previous value under the same key.
/// - `get` returns exactly the bytes last written, or `NotFound`.
/// - `list` returns every record in one workspace, in no defined order.
/// - `delete` is idempotent; deleting an absent key is a no-op.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Write bytes under a workspace/entity key.
    async fn put(&self, key: &EntityKey, bytes: &[u8]) -> StorageResult<()>;

    /// Read bytes by key. Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &EntityKey) -> StorageResult<Vec<u8>>;

    /// List every record stored under one workspace.
    async fn list(&self, workspace: &str) -> StorageResult<Vec<StoredRecord>>;

    /// Delete one record. No-op if absent.
    async fn delete(&self, key: &EntityKey) -> StorageResult<()>;

    /// Delete every record under one workspace, returning the count removed.
    async fn delete_workspace(&self, workspace: &str) -> StorageResult<usize>;
}
