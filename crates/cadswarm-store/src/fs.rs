//! Filesystem-backed model store.
//!
//! Layout: `<root>/<workspace>/<entity file>` where the entity file name
//! is the entity id with the namespace separator `:` rewritten to `__`
//! (workspace and entity ids are validated upstream to exclude `_`-run
//! collisions). Writes are atomic: temp file in the target directory,
//! then rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::{EntityKey, ModelStore, StoredRecord};

/// Durable model store rooted at a workspace directory on disk.
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { root })
    }

    fn file_name(entity: &str) -> String {
        entity.replace(':', "__")
    }

    fn entity_name(file: &str) -> String {
        file.replacen("__", ":", 1)
    }

    fn record_path(&self, key: &EntityKey) -> PathBuf {
        self.root
            .join(&key.workspace)
            .join(Self::file_name(&key.entity))
    }
}

#[async_trait]
impl ModelStore for FsModelStore {
    async fn put(&self, key: &EntityKey, bytes: &[u8]) -> StorageResult<()> {
        let path = self.record_path(key);
        let dir = path.parent().expect("record path always has parent");
        fs::create_dir_all(dir).map_err(|e| StorageError::Query(e.to_string()))?;

        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| StorageError::Query(e.to_string()))?;
        tmp.write_all(bytes)
            .map_err(|e| StorageError::Query(e.to_string()))?;
        tmp.persist(&path)
            .map_err(|e| StorageError::Query(e.error.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &EntityKey) -> StorageResult<Vec<u8>> {
        let path = self.record_path(key);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    workspace: key.workspace.clone(),
                    entity: key.entity.clone(),
                }
            } else {
                StorageError::Query(e.to_string())
            }
        })
    }

    async fn list(&self, workspace: &str) -> StorageResult<Vec<StoredRecord>> {
        let dir = self.root.join(workspace);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| StorageError::Query(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Query(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let bytes =
                fs::read(entry.path()).map_err(|e| StorageError::Query(e.to_string()))?;
            let written_at: DateTime<Utc> = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            records.push(StoredRecord {
                key: EntityKey::new(workspace, &Self::entity_name(&name)),
                bytes,
                written_at,
            });
        }
        Ok(records)
    }

    async fn delete(&self, key: &EntityKey) -> StorageResult<()> {
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Query(e.to_string())),
        }
    }

    async fn delete_workspace(&self, workspace: &str) -> StorageResult<usize> {
        let dir = self.root.join(workspace);
        if !dir.exists() {
            return Ok(0);
        }
        let count = fs::read_dir(&dir)
            .map_err(|e| StorageError::Query(e.to_string()))?
            .count();
        fs::remove_dir_all(&dir).map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn record_round_trip() {
        let (_dir, store) = make_store();
        let key = EntityKey::new("branch-a", "main:point-1");
        store.put(&key, b"payload").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let (_dir, store) = make_store();
        let key = EntityKey::new("branch-a", "main:point-404");
        assert!(matches!(
            store.get(&key).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn list_recovers_namespaced_entity_ids() {
        let (_dir, store) = make_store();
        let key = EntityKey::new("branch-a", "main:circle-3");
        store.put(&key, b"c").await.unwrap();

        let records = store.list("branch-a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.entity, "main:circle-3");
    }

    #[tokio::test]
    async fn delete_workspace_reports_count() {
        let (_dir, store) = make_store();
        store
            .put(&EntityKey::new("branch-a", "main:point-1"), b"a")
            .await
            .unwrap();
        store
            .put(&EntityKey::new("branch-a", "main:point-2"), b"b")
            .await
            .unwrap();

        assert_eq!(store.delete_workspace("branch-a").await.unwrap(), 2);
        assert_eq!(store.delete_workspace("branch-a").await.unwrap(), 0);
    }
}
