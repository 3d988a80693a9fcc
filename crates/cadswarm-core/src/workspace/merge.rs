//! Two-workspace merge with semantic conflict detection.
//!
//! Entities unique to the source are copied into the target. An entity
//! that exists, modified, in both sides (same identity, divergent
//! payload digest) produces a High conflict and the change is not
//! applied. Constraint pairs across the two scopes that are
//! contradictory after the tentative merge produce Critical conflicts.
//! The merge never retries; callers resolve and re-invoke.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::conflict::ConflictRecord;
use crate::domain::entity::EntityRecord;
use crate::domain::error::{CoreError, Result};
use crate::domain::workspace::{WorkspaceId, WorkspaceKind, WorkspaceStatus};
use crate::solver::ConstraintSolver;
use crate::workspace::WorkspaceManager;

/// Overall merge verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Success,
    SuccessWithConflicts,
}

/// Result of one merge invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub source: WorkspaceId,
    pub target: WorkspaceId,
    /// Entities unique to source that were copied into target.
    pub entities_added: usize,
    /// Conflicts detected by this merge; also registered open.
    pub conflicts: Vec<ConflictRecord>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl WorkspaceManager {
    /// Merge `source` into `target`, consulting `solver` for constraint
    /// contradictions across the two scopes.
    ///
    /// Both workspace cells are locked for the duration; the locks are
    /// taken in lexicographic id order so two simultaneous merges
    /// referencing each other's workspaces in opposite directions
    /// cannot deadlock.
    #[instrument(skip(self, solver), fields(source = %source, target = %target))]
    pub async fn merge(
        &self,
        source: &WorkspaceId,
        target: &WorkspaceId,
        solver: &ConstraintSolver,
    ) -> Result<MergeReport> {
        if source == target {
            return Err(CoreError::validation(
                "target_id",
                "cannot merge a workspace into itself",
            ));
        }
        let src_cell = self.cell(source).await?;
        let tgt_cell = self.cell(target).await?;

        let (mut src_state, mut tgt_state);
        if source < target {
            src_state = src_cell.state.write().await;
            tgt_state = tgt_cell.state.write().await;
        } else {
            tgt_state = tgt_cell.state.write().await;
            src_state = src_cell.state.write().await;
        }

        // Mergeability is re-checked under the locks: status must allow
        // it and no open conflict may name either side.
        for (id, state) in [(source, &src_state), (target, &tgt_state)] {
            if !state.record.status_allows_merge() {
                return Err(CoreError::MergeBlocked {
                    workspace: id.as_str().to_string(),
                    reason: format!("workspace status is {:?}", state.record.status),
                });
            }
            let open = self.ledger().open_naming(id);
            if open > 0 {
                return Err(CoreError::MergeBlocked {
                    workspace: id.as_str().to_string(),
                    reason: format!("{open} open conflicts reference it"),
                });
            }
        }

        // Merge counts as one mutating attempt against each side.
        src_state.record.operation_count += 1;
        tgt_state.record.operation_count += 1;

        let mut source_entities: Vec<EntityRecord> =
            src_state.entities.values().cloned().collect();
        source_entities.sort_by(|a, b| a.id.cmp(&b.id));

        let mut entities_added = 0;
        let mut conflicts: Vec<ConflictRecord> = Vec::new();

        for entity in source_entities {
            match tgt_state.entities.get(&entity.id) {
                None => {
                    tgt_state
                        .entities
                        .insert(entity.id.clone(), entity.copied_into(target));
                    entities_added += 1;
                }
                Some(existing) if existing.digest != entity.digest => {
                    conflicts.push(ConflictRecord::entity_conflict(
                        source,
                        target,
                        &entity.id,
                        entity.payload.clone(),
                    ));
                }
                Some(_) => {}
            }
        }

        // Constraint pairs across the two scopes that contradict after
        // the tentative entity merge.
        for (ours, theirs) in solver.flag_merge_contradictions(source, target) {
            let shared = ours
                .entities
                .iter()
                .find(|e| theirs.entities.contains(*e))
                .cloned()
                .unwrap_or_else(|| ours.entities[0].clone());
            conflicts.push(ConflictRecord::constraint_conflict(
                source,
                target,
                &shared,
                format!(
                    "constraint {} ({}) contradicts constraint {} ({}) after merge",
                    ours.id, ours.kind, theirs.id, theirs.kind
                ),
            ));
        }

        tgt_state.record.entity_count = tgt_state.entities.len();

        let outcome = if conflicts.is_empty() {
            if entities_added > 0 && tgt_state.record.status == WorkspaceStatus::Clean {
                tgt_state.record.status = WorkspaceStatus::Dirty;
            }
            // A branch that merged cleanly is done; main never
            // transitions to Merged.
            if src_state.record.kind == WorkspaceKind::Branch {
                src_state.record.status = WorkspaceStatus::Merged;
            }
            MergeOutcome::Success
        } else {
            src_state.record.status = WorkspaceStatus::Conflicted;
            tgt_state.record.status = WorkspaceStatus::Conflicted;
            for conflict in &conflicts {
                self.ledger().open(conflict.clone());
            }
            warn!(
                conflicts = conflicts.len(),
                "merge completed with open conflicts"
            );
            MergeOutcome::SuccessWithConflicts
        };

        info!(
            outcome = ?outcome,
            entities_added,
            conflicts = conflicts.len(),
            "merge finished"
        );
        Ok(MergeReport {
            outcome,
            source: source.clone(),
            target: target.clone(),
            entities_added,
            conflicts,
        })
    }
}
