//! In-memory fake for the model store trait (testing only)
//!
//! `MemoryModelStore` satisfies the `ModelStore` contract without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::{EntityKey, ModelStore, StoredRecord};

/// In-memory model store backed by a `HashMap<EntityKey, StoredRecord>`.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    records: Mutex<HashMap<EntityKey, StoredRecord>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for MemoryModelStore {
    async fn put(&self, key: &EntityKey, bytes: &[u8]) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(
            key.clone(),
            StoredRecord {
                key: key.clone(),
                bytes: bytes.to_vec(),
                written_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &EntityKey) -> StorageResult<Vec<u8>> {
        let records = self.records.lock().unwrap();
        records
            .get(key)
            .map(|r| r.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                workspace: key.workspace.clone(),
                entity: key.entity.clone(),
            })
    }

    async fn list(&self, workspace: &str) -> StorageResult<Vec<StoredRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.key.workspace == workspace)
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &EntityKey) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        records.remove(key);
        Ok(())
    }

    async fn delete_workspace(&self, workspace: &str) -> StorageResult<usize> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|k, _| k.workspace != workspace);
        Ok(before - records.len())
    }
}
