//! Trait contract tests for ModelStore.
//!
//! These tests verify the behavioral contract of the storage trait
//! using the in-memory fake. Any conforming implementation must pass
//! these.

use cadswarm_store::fakes::MemoryModelStore;
use cadswarm_store::storage_traits::*;
use cadswarm_store::StorageError;

#[tokio::test]
async fn put_get_round_trip() {
    let store = MemoryModelStore::new();
    let key = EntityKey::new("main", "main:line-1");
    store.put(&key, b"line payload").await.unwrap();

    let bytes = store.get(&key).await.unwrap();
    assert_eq!(bytes, b"line payload");
}

#[tokio::test]
async fn get_not_found() {
    let store = MemoryModelStore::new();
    let key = EntityKey::new("main", "main:point-404");
    let err = store.get(&key).await.unwrap_err();

    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn put_overwrites_previous_value() {
    let store = MemoryModelStore::new();
    let key = EntityKey::new("main", "main:circle-1");
    store.put(&key, b"v1").await.unwrap();
    store.put(&key, b"v2").await.unwrap();

    assert_eq!(store.get(&key).await.unwrap(), b"v2");
}

#[tokio::test]
async fn list_is_scoped_to_one_workspace() {
    let store = MemoryModelStore::new();
    store
        .put(&EntityKey::new("main", "main:point-1"), b"a")
        .await
        .unwrap();
    store
        .put(&EntityKey::new("main", "main:point-2"), b"b")
        .await
        .unwrap();
    store
        .put(&EntityKey::new("branch-x", "main:point-1"), b"c")
        .await
        .unwrap();

    let records = store.list("main").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.key.workspace == "main"));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = MemoryModelStore::new();
    let key = EntityKey::new("main", "main:solid-1");
    store.put(&key, b"solid").await.unwrap();

    store.delete(&key).await.unwrap();
    // Second delete of an absent key must not error.
    store.delete(&key).await.unwrap();

    assert!(matches!(
        store.get(&key).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn delete_workspace_removes_only_that_workspace() {
    let store = MemoryModelStore::new();
    store
        .put(&EntityKey::new("branch-a", "main:point-1"), b"a")
        .await
        .unwrap();
    store
        .put(&EntityKey::new("branch-a", "main:point-2"), b"b")
        .await
        .unwrap();
    store
        .put(&EntityKey::new("branch-b", "main:point-1"), b"c")
        .await
        .unwrap();

    let removed = store.delete_workspace("branch-a").await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.list("branch-a").await.unwrap().is_empty());
    assert_eq!(store.list("branch-b").await.unwrap().len(), 1);
}

#[tokio::test]
async fn stored_record_carries_write_timestamp() {
    let store = MemoryModelStore::new();
    let key = EntityKey::new("main", "main:point-1");
    let before = chrono::Utc::now();
    store.put(&key, b"stamped").await.unwrap();

    let records = store.list("main").await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].written_at >= before);
}
