//! Merge conflict records and the indexed conflict ledger.
//!
//! Conflicts are append-only until resolved; resolution moves a record
//! from the open set to the resolved history and stamps an outcome. It
//! never deletes history. The open set is indexed by disputed entity id
//! so resolution does not scan with history growth.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadswarm_geom::GeometryPayload;

use crate::domain::entity::EntityId;
use crate::domain::error::{CoreError, Result};
use crate::domain::workspace::WorkspaceId;

/// Conflict severity, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// Resolution outcome stamped onto a resolved conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepSource,
    KeepTarget,
    Manual,
}

impl Resolution {
    pub fn parse(s: &str) -> Option<Resolution> {
        match s {
            "keep_source" => Some(Resolution::KeepSource),
            "keep_target" => Some(Resolution::KeepTarget),
            "manual" => Some(Resolution::Manual),
            _ => None,
        }
    }
}

/// One detected incompatibility between two concurrent changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: Uuid,
    pub severity: ConflictSeverity,
    pub source: WorkspaceId,
    pub target: WorkspaceId,
    /// The disputed entity; the resolution lookup key.
    pub entity: EntityId,
    /// Source-side payload snapshot, present for entity conflicts so
    /// `keep_source` can apply it later.
    pub source_payload: Option<GeometryPayload>,
    pub description: String,
    pub status: ConflictStatus,
    pub resolution: Option<Resolution>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConflictRecord {
    pub fn entity_conflict(
        source: &WorkspaceId,
        target: &WorkspaceId,
        entity: &EntityId,
        source_payload: GeometryPayload,
    ) -> Self {
        ConflictRecord {
            id: Uuid::new_v4(),
            severity: ConflictSeverity::High,
            source: source.clone(),
            target: target.clone(),
            entity: entity.clone(),
            source_payload: Some(source_payload),
            description: format!("entity {entity} modified in both {source} and {target}"),
            status: ConflictStatus::Open,
            resolution: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn constraint_conflict(
        source: &WorkspaceId,
        target: &WorkspaceId,
        entity: &EntityId,
        description: String,
    ) -> Self {
        ConflictRecord {
            id: Uuid::new_v4(),
            severity: ConflictSeverity::Critical,
            source: source.clone(),
            target: target.clone(),
            entity: entity.clone(),
            source_payload: None,
            description,
            status: ConflictStatus::Open,
            resolution: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn names(&self, workspace: &WorkspaceId) -> bool {
        &self.source == workspace || &self.target == workspace
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Open conflicts indexed by disputed entity, oldest first per key.
    open: HashMap<EntityId, Vec<ConflictRecord>>,
    resolved: Vec<ConflictRecord>,
}

/// The session-wide conflict ledger.
///
/// Shared between the Workspace Manager (the merge path writes it) and
/// the Controller (aggregate status reads it).
#[derive(Debug, Default)]
pub struct ConflictLedger {
    state: Mutex<LedgerState>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly detected conflict as open.
    pub fn open(&self, conflict: ConflictRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .open
            .entry(conflict.entity.clone())
            .or_default()
            .push(conflict);
    }

    /// Open conflicts naming the given entity, oldest first.
    pub fn open_for_entity(&self, entity: &EntityId) -> Vec<ConflictRecord> {
        let state = self.state.lock().unwrap();
        state.open.get(entity).cloned().unwrap_or_default()
    }

    /// Number of open conflicts naming the given workspace.
    pub fn open_naming(&self, workspace: &WorkspaceId) -> usize {
        let state = self.state.lock().unwrap();
        state
            .open
            .values()
            .flatten()
            .filter(|c| c.names(workspace))
            .count()
    }

    pub fn open_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.open.values().map(Vec::len).sum()
    }

    pub fn all_open(&self) -> Vec<ConflictRecord> {
        let state = self.state.lock().unwrap();
        state.open.values().flatten().cloned().collect()
    }

    pub fn resolved_history(&self) -> Vec<ConflictRecord> {
        let state = self.state.lock().unwrap();
        state.resolved.clone()
    }

    /// Resolve the oldest open conflict referencing `entity`.
    ///
    /// Fails with `NotFound` when no open conflict references it — the
    /// deterministic contract for resolving a conflict that was never
    /// created. The stamped record is moved to the resolved history and
    /// returned so the caller can apply any entity mutation it implies.
    pub fn resolve(&self, entity: &EntityId, resolution: Resolution) -> Result<ConflictRecord> {
        let mut state = self.state.lock().unwrap();
        let queue = state
            .open
            .get_mut(entity)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CoreError::not_found("conflict", entity.as_str()))?;

        let mut record = queue.remove(0);
        if queue.is_empty() {
            state.open.remove(entity);
        }
        record.status = ConflictStatus::Resolved;
        record.resolution = Some(resolution);
        record.resolved_at = Some(Utc::now());
        state.resolved.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadswarm_geom::Vec3;

    fn payload() -> GeometryPayload {
        GeometryPayload::Point {
            position: Vec3::new(1.0, 0.0, 0.0),
        }
    }

    fn entity_conflict(entity: &str) -> ConflictRecord {
        ConflictRecord::entity_conflict(
            &WorkspaceId::new("branch-a"),
            &WorkspaceId::main(),
            &EntityId::new(entity),
            payload(),
        )
    }

    #[test]
    fn test_resolve_unknown_entity_is_not_found() {
        let ledger = ConflictLedger::new();
        let err = ledger
            .resolve(&EntityId::new("main:point-1"), Resolution::Manual)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "conflict", .. }));
    }

    #[test]
    fn test_resolution_moves_record_to_history() {
        let ledger = ConflictLedger::new();
        ledger.open(entity_conflict("main:point-1"));
        assert_eq!(ledger.open_count(), 1);

        let resolved = ledger
            .resolve(&EntityId::new("main:point-1"), Resolution::KeepTarget)
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution, Some(Resolution::KeepTarget));
        assert!(resolved.resolved_at.is_some());

        assert_eq!(ledger.open_count(), 0);
        assert_eq!(ledger.resolved_history().len(), 1);
    }

    #[test]
    fn test_open_naming_counts_both_sides() {
        let ledger = ConflictLedger::new();
        ledger.open(entity_conflict("main:point-1"));

        assert_eq!(ledger.open_naming(&WorkspaceId::new("branch-a")), 1);
        assert_eq!(ledger.open_naming(&WorkspaceId::main()), 1);
        assert_eq!(ledger.open_naming(&WorkspaceId::new("branch-b")), 0);
    }

    #[test]
    fn test_two_conflicts_on_one_entity_resolve_oldest_first() {
        let ledger = ConflictLedger::new();
        let first = entity_conflict("main:point-1");
        let first_id = first.id;
        ledger.open(first);
        ledger.open(ConflictRecord::constraint_conflict(
            &WorkspaceId::new("branch-a"),
            &WorkspaceId::main(),
            &EntityId::new("main:point-1"),
            "parallel vs perpendicular".to_string(),
        ));

        let resolved = ledger
            .resolve(&EntityId::new("main:point-1"), Resolution::Manual)
            .unwrap();
        assert_eq!(resolved.id, first_id);
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn test_severity_assignment_by_conflict_class() {
        assert_eq!(
            entity_conflict("main:point-1").severity,
            ConflictSeverity::High
        );
        let critical = ConflictRecord::constraint_conflict(
            &WorkspaceId::new("branch-a"),
            &WorkspaceId::main(),
            &EntityId::new("main:line-1"),
            "x".to_string(),
        );
        assert_eq!(critical.severity, ConflictSeverity::Critical);
    }
}
