//! Workspace lifecycle: creation, switching, status, entity tables.
//!
//! The manager owns the workspace and entity records exclusively. Each
//! workspace lives in its own lock cell, so mutations serialize per
//! workspace id while reads proceed concurrently; the outer table lock
//! only guards membership. Merge (in [`merge`]) takes both cell locks
//! in lexicographic id order.

pub mod merge;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use cadswarm_geom::GeometryPayload;
use cadswarm_store::{EntityKey, ModelStore};

use crate::domain::conflict::{ConflictLedger, ConflictRecord, Resolution};
use crate::domain::entity::{EntityId, EntityRecord};
use crate::domain::error::{CoreError, Result};
use crate::domain::workspace::{
    WorkspaceId, WorkspaceKind, WorkspaceRecord, WorkspaceStatus, WorkspaceStatusReport,
};

pub use merge::{MergeOutcome, MergeReport};

pub(crate) struct WorkspaceState {
    pub(crate) record: WorkspaceRecord,
    pub(crate) entities: HashMap<EntityId, EntityRecord>,
    pub(crate) entity_seq: u64,
}

impl WorkspaceState {
    /// Clean workspaces turn dirty on mutation; Conflicted and Merged
    /// are governed by the merge/resolve paths, not here.
    fn mark_dirty(&mut self) {
        if self.record.status == WorkspaceStatus::Clean {
            self.record.status = WorkspaceStatus::Dirty;
        }
    }
}

pub(crate) struct WorkspaceCell {
    pub(crate) state: RwLock<WorkspaceState>,
}

/// Owner of the branch/merge lifecycle on top of entity tables.
pub struct WorkspaceManager {
    cells: RwLock<HashMap<WorkspaceId, Arc<WorkspaceCell>>>,
    /// Process-wide default scope for operations that omit a workspace.
    active: std::sync::RwLock<WorkspaceId>,
    conflicts: Arc<ConflictLedger>,
}

impl WorkspaceManager {
    /// Create the manager together with the one `main` workspace.
    pub fn new(conflicts: Arc<ConflictLedger>) -> Self {
        let main = WorkspaceState {
            record: WorkspaceRecord::main(),
            entities: HashMap::new(),
            entity_seq: 0,
        };
        let mut cells = HashMap::new();
        cells.insert(
            WorkspaceId::main(),
            Arc::new(WorkspaceCell {
                state: RwLock::new(main),
            }),
        );
        info!(workspace = %WorkspaceId::main(), "main workspace created");
        WorkspaceManager {
            cells: RwLock::new(cells),
            active: std::sync::RwLock::new(WorkspaceId::main()),
            conflicts,
        }
    }

    pub(crate) fn ledger(&self) -> &Arc<ConflictLedger> {
        &self.conflicts
    }

    pub(crate) async fn cell(&self, id: &WorkspaceId) -> Result<Arc<WorkspaceCell>> {
        let cells = self.cells.read().await;
        cells
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("workspace", id.as_str()))
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CoreError::validation("name", "workspace name is empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(CoreError::validation(
                "name",
                "workspace names are limited to ascii alphanumerics, '-' and '.'",
            ));
        }
        Ok(())
    }

    /// Create a branch workspace as a value-copy snapshot of `base`
    /// (default `main`).
    ///
    /// Fails with `NotFound` if the base does not exist and
    /// `InvalidBranch` if the base is itself a branch — the tree is
    /// fixed at two levels, so cycle handling does not exist here.
    pub async fn create_workspace(
        &self,
        name: &str,
        base: Option<&WorkspaceId>,
    ) -> Result<WorkspaceRecord> {
        Self::validate_name(name)?;
        let id = WorkspaceId::new(name);
        if id.is_main() {
            return Err(CoreError::validation("name", "'main' is reserved"));
        }

        let default_base = WorkspaceId::main();
        let base_id = base.unwrap_or(&default_base);
        let base_cell = self.cell(base_id).await?;

        // Snapshot the base's entities by value under its read lock.
        let snapshot: Vec<EntityRecord> = {
            let base_state = base_cell.state.read().await;
            if base_state.record.kind == WorkspaceKind::Branch {
                return Err(CoreError::InvalidBranch(base_id.as_str().to_string()));
            }
            base_state
                .entities
                .values()
                .map(|e| e.copied_into(&id))
                .collect()
        };

        let mut cells = self.cells.write().await;
        if cells.contains_key(&id) {
            return Err(CoreError::validation(
                "name",
                format!("workspace {id} already exists"),
            ));
        }

        let mut record = WorkspaceRecord::branch(id.clone(), name, base_id.clone());
        record.entity_count = snapshot.len();
        let state = WorkspaceState {
            record: record.clone(),
            entities: snapshot.into_iter().map(|e| (e.id.clone(), e)).collect(),
            entity_seq: 0,
        };
        cells.insert(
            id.clone(),
            Arc::new(WorkspaceCell {
                state: RwLock::new(state),
            }),
        );
        info!(workspace = %id, base = %base_id, entities = record.entity_count, "branch created");
        Ok(record)
    }

    /// Point the process-wide active workspace at `id`.
    pub async fn switch(&self, id: &WorkspaceId) -> Result<()> {
        // Existence check before moving the pointer.
        self.cell(id).await?;
        let mut active = self.active.write().unwrap();
        debug!(from = %*active, to = %id, "active workspace switched");
        *active = id.clone();
        Ok(())
    }

    pub fn active(&self) -> WorkspaceId {
        self.active.read().unwrap().clone()
    }

    pub async fn status(&self, id: &WorkspaceId) -> Result<WorkspaceStatusReport> {
        let cell = self.cell(id).await?;
        let state = cell.state.read().await;
        let open_conflicts = self.conflicts.open_naming(id);
        Ok(WorkspaceStatusReport {
            id: state.record.id.clone(),
            name: state.record.name.clone(),
            kind: state.record.kind,
            status: state.record.status,
            entity_count: state.record.entity_count,
            operation_count: state.record.operation_count,
            open_conflicts,
            can_merge: state.record.status_allows_merge() && open_conflicts == 0,
        })
    }

    pub async fn list_workspaces(&self) -> Vec<WorkspaceRecord> {
        let cells = self.cells.read().await;
        let mut records = Vec::with_capacity(cells.len());
        for cell in cells.values() {
            records.push(cell.state.read().await.record.clone());
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub async fn entity(&self, workspace: &WorkspaceId, id: &EntityId) -> Result<EntityRecord> {
        let cell = self.cell(workspace).await?;
        let state = cell.state.read().await;
        state
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("entity", id.as_str()))
    }

    pub async fn entities(&self, workspace: &WorkspaceId) -> Result<Vec<EntityRecord>> {
        let cell = self.cell(workspace).await?;
        let state = cell.state.read().await;
        let mut records: Vec<EntityRecord> = state.entities.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Insert a freshly produced payload as a new entity, minting its
    /// namespaced id in this workspace.
    pub async fn create_entity(
        &self,
        workspace: &WorkspaceId,
        payload: GeometryPayload,
    ) -> Result<EntityRecord> {
        let cell = self.cell(workspace).await?;
        let mut state = cell.state.write().await;
        state.record.operation_count += 1;

        state.entity_seq += 1;
        let id = EntityId::mint(workspace, payload.type_suffix(), state.entity_seq);
        let record = EntityRecord::new(id.clone(), payload, workspace.clone())?;
        state.entities.insert(id.clone(), record.clone());
        state.record.entity_count = state.entities.len();
        state.mark_dirty();
        debug!(workspace = %workspace, entity = %id, "entity created");
        Ok(record)
    }

    /// Replace an entity's payload, producing its next revision.
    pub async fn update_entity(
        &self,
        workspace: &WorkspaceId,
        id: &EntityId,
        payload: GeometryPayload,
    ) -> Result<EntityRecord> {
        let cell = self.cell(workspace).await?;
        let mut state = cell.state.write().await;
        // The attempt counts even when the entity turns out missing.
        state.record.operation_count += 1;

        let existing = state
            .entities
            .get(id)
            .ok_or_else(|| CoreError::not_found("entity", id.as_str()))?;
        let updated = existing.with_payload(payload)?;
        state.entities.insert(id.clone(), updated.clone());
        state.mark_dirty();
        debug!(workspace = %workspace, entity = %id, revision = updated.revision, "entity updated");
        Ok(updated)
    }

    /// Count a mutating attempt that failed before reaching the entity
    /// table (e.g. the engine rejected the geometry).
    pub async fn record_failed_attempt(&self, workspace: &WorkspaceId) -> Result<()> {
        let cell = self.cell(workspace).await?;
        let mut state = cell.state.write().await;
        state.record.operation_count += 1;
        Ok(())
    }

    /// Resolve the oldest open conflict referencing `entity_id`.
    ///
    /// `KeepSource` overwrites the target entity with the conflict's
    /// source snapshot; `KeepTarget` discards the source change;
    /// `Manual` records the outcome without mutating either side.
    pub async fn resolve_conflict(
        &self,
        entity_id: &EntityId,
        resolution: Resolution,
    ) -> Result<ConflictRecord> {
        let record = self.conflicts.resolve(entity_id, resolution)?;

        if resolution == Resolution::KeepSource {
            if let Some(payload) = record.source_payload.clone() {
                let cell = self.cell(&record.target).await?;
                let mut state = cell.state.write().await;
                state.record.operation_count += 1;
                let replacement = match state.entities.get(entity_id) {
                    Some(existing) => existing.with_payload(payload)?,
                    None => {
                        EntityRecord::new(entity_id.clone(), payload, record.target.clone())?
                    }
                };
                state.entities.insert(entity_id.clone(), replacement);
                state.record.entity_count = state.entities.len();
            }
        }

        // A workspace leaves Conflicted once its last open conflict
        // resolves.
        for workspace in [&record.source, &record.target] {
            if self.conflicts.open_naming(workspace) == 0 {
                let cell = self.cell(workspace).await?;
                let mut state = cell.state.write().await;
                if state.record.status == WorkspaceStatus::Conflicted {
                    state.record.status = WorkspaceStatus::Dirty;
                }
            }
        }

        info!(
            entity = %entity_id,
            resolution = ?resolution,
            severity = ?record.severity,
            "conflict resolved"
        );
        Ok(record)
    }

    /// Snapshot one workspace's entity records through a model store.
    pub async fn persist_workspace(
        &self,
        workspace: &WorkspaceId,
        store: &dyn ModelStore,
    ) -> Result<usize> {
        let records = self.entities(workspace).await?;
        for record in &records {
            let bytes = serde_json::to_vec(record)?;
            store
                .put(&EntityKey::new(workspace.as_str(), record.id.as_str()), &bytes)
                .await?;
        }
        debug!(workspace = %workspace, entities = records.len(), "workspace persisted");
        Ok(records.len())
    }

    /// Replace one workspace's entity table from a model store
    /// snapshot.
    pub async fn restore_workspace(
        &self,
        workspace: &WorkspaceId,
        store: &dyn ModelStore,
    ) -> Result<usize> {
        let cell = self.cell(workspace).await?;
        let stored = store.list(workspace.as_str()).await?;

        let mut entities = HashMap::with_capacity(stored.len());
        for item in stored {
            let record: EntityRecord = serde_json::from_slice(&item.bytes)?;
            entities.insert(record.id.clone(), record);
        }

        let mut state = cell.state.write().await;
        let count = entities.len();
        state.entities = entities;
        state.record.entity_count = count;
        info!(workspace = %workspace, entities = count, "workspace restored");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadswarm_geom::Vec3;

    fn manager() -> WorkspaceManager {
        WorkspaceManager::new(Arc::new(ConflictLedger::new()))
    }

    fn point(x: f64) -> GeometryPayload {
        GeometryPayload::Point {
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    #[tokio::test]
    async fn test_create_workspace_from_unknown_base_is_not_found() {
        let mgr = manager();
        let err = mgr
            .create_workspace("branch-a", Some(&WorkspaceId::new("ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "workspace", .. }));
    }

    #[tokio::test]
    async fn test_branch_of_branch_is_rejected() {
        let mgr = manager();
        mgr.create_workspace("branch-a", None).await.unwrap();
        let err = mgr
            .create_workspace("branch-b", Some(&WorkspaceId::new("branch-a")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidBranch(_)));
    }

    #[tokio::test]
    async fn test_branch_is_a_value_snapshot_of_its_base() {
        let mgr = manager();
        let main = WorkspaceId::main();
        let original = mgr.create_entity(&main, point(1.0)).await.unwrap();

        let branch = mgr.create_workspace("branch-a", None).await.unwrap();
        assert_eq!(branch.entity_count, 1);

        // Mutating the base after branching must not leak into the branch.
        mgr.update_entity(&main, &original.id, point(9.0))
            .await
            .unwrap();
        let in_branch = mgr
            .entity(&WorkspaceId::new("branch-a"), &original.id)
            .await
            .unwrap();
        assert_eq!(in_branch.payload, point(1.0));
    }

    #[tokio::test]
    async fn test_duplicate_workspace_name_is_rejected() {
        let mgr = manager();
        mgr.create_workspace("branch-a", None).await.unwrap();
        let err = mgr.create_workspace("branch-a", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_switch_moves_active_pointer_and_validates() {
        let mgr = manager();
        assert_eq!(mgr.active(), WorkspaceId::main());

        mgr.create_workspace("branch-a", None).await.unwrap();
        mgr.switch(&WorkspaceId::new("branch-a")).await.unwrap();
        assert_eq!(mgr.active(), WorkspaceId::new("branch-a"));

        let err = mgr.switch(&WorkspaceId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(mgr.active(), WorkspaceId::new("branch-a"));
    }

    #[tokio::test]
    async fn test_operation_count_includes_failed_update_attempts() {
        let mgr = manager();
        let main = WorkspaceId::main();
        mgr.create_entity(&main, point(1.0)).await.unwrap();
        let _ = mgr
            .update_entity(&main, &EntityId::new("main:point-99"), point(2.0))
            .await
            .unwrap_err();
        mgr.record_failed_attempt(&main).await.unwrap();

        let report = mgr.status(&main).await.unwrap();
        assert_eq!(report.operation_count, 3);
        assert_eq!(report.entity_count, 1);
    }

    #[tokio::test]
    async fn test_entity_mutation_dirties_a_clean_workspace() {
        let mgr = manager();
        let main = WorkspaceId::main();
        assert_eq!(
            mgr.status(&main).await.unwrap().status,
            WorkspaceStatus::Clean
        );
        mgr.create_entity(&main, point(1.0)).await.unwrap();
        assert_eq!(
            mgr.status(&main).await.unwrap().status,
            WorkspaceStatus::Dirty
        );
    }

    #[tokio::test]
    async fn test_persist_and_restore_round_trip() {
        use cadswarm_store::MemoryModelStore;

        let mgr = manager();
        let main = WorkspaceId::main();
        let a = mgr.create_entity(&main, point(1.0)).await.unwrap();
        mgr.create_entity(&main, point(2.0)).await.unwrap();

        let store = MemoryModelStore::new();
        assert_eq!(mgr.persist_workspace(&main, &store).await.unwrap(), 2);

        // Mutate in memory, then restore the persisted snapshot.
        mgr.update_entity(&main, &a.id, point(7.0)).await.unwrap();
        assert_eq!(mgr.restore_workspace(&main, &store).await.unwrap(), 2);
        let restored = mgr.entity(&main, &a.id).await.unwrap();
        assert_eq!(restored.payload, point(1.0));
    }
}
