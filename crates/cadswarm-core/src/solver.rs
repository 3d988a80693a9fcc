//! Geometric constraint maintenance and conflict detection.
//!
//! The solver owns the constraint table exclusively and reads entity
//! geometry through the Workspace Manager. Satisfaction is pure and
//! recomputed on every status query; the only stored verdict that
//! survives a re-query is `Conflicting`, which is assigned by merge
//! contradiction flagging, not by geometry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use cadswarm_geom::{GeometryPayload, Vec3, ANGULAR_TOLERANCE};

use crate::domain::constraint::{
    ConstraintId, ConstraintKind, ConstraintRecord, ConstraintStatus,
};
use crate::domain::entity::EntityId;
use crate::domain::error::{CoreError, Result};
use crate::domain::workspace::WorkspaceId;
use crate::workspace::WorkspaceManager;

/// Owner of constraint records; evaluation delegates vector operations
/// to the geometry crate.
pub struct ConstraintSolver {
    workspaces: Arc<WorkspaceManager>,
    constraints: std::sync::RwLock<HashMap<ConstraintId, ConstraintRecord>>,
}

fn line_direction(payload: &GeometryPayload) -> Result<Vec3> {
    payload.direction().ok_or_else(|| {
        CoreError::validation(
            "entity_ids",
            format!(
                "constraint requires line entities, got {}",
                payload.type_suffix()
            ),
        )
    })
}

fn point_position(payload: &GeometryPayload) -> Result<Vec3> {
    payload.position().ok_or_else(|| {
        CoreError::validation(
            "entity_ids",
            format!(
                "coincident constraint requires point entities, got {}",
                payload.type_suffix()
            ),
        )
    })
}

/// Distance from a point to the infinite line through `start` with
/// direction `dir`.
fn point_line_distance(point: &Vec3, start: &Vec3, dir: &Vec3) -> f64 {
    let to_point = point.sub(start);
    to_point.cross(dir).norm() / dir.norm()
}

impl ConstraintSolver {
    pub fn new(workspaces: Arc<WorkspaceManager>) -> Self {
        ConstraintSolver {
            workspaces,
            constraints: std::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Apply a constraint over entities in one workspace.
    ///
    /// Validates arity and entity existence, computes a trial
    /// satisfaction from current geometry, and rejects with
    /// `ConstraintConflict` if an already-stored constraint in the same
    /// scope shares the entity pair with an incompatible kind. The new
    /// constraint is stored only on success.
    pub async fn apply(
        &self,
        kind: ConstraintKind,
        entities: Vec<EntityId>,
        workspace: &WorkspaceId,
    ) -> Result<ConstraintRecord> {
        if entities.len() < 2 {
            return Err(CoreError::validation(
                "entity_ids",
                "a constraint needs at least two entities",
            ));
        }
        if kind.is_pairwise() && entities.len() != 2 {
            return Err(CoreError::validation(
                "entity_ids",
                format!("{kind} is defined over exactly two entities"),
            ));
        }
        for (i, entity) in entities.iter().enumerate() {
            if entities[..i].contains(entity) {
                return Err(CoreError::validation(
                    "entity_ids",
                    format!("duplicate entity {entity}"),
                ));
            }
        }

        let status = self.evaluate(kind, &entities, workspace).await?;

        let mut table = self.constraints.write().unwrap();
        let candidate = ConstraintRecord::new(kind, entities, status, workspace.clone());
        if let Some(existing) = table.values().find(|stored| {
            stored.workspace == *workspace
                && stored.shares_pair_with(&candidate)
                && stored.kind.incompatible_with(kind)
        }) {
            return Err(CoreError::ConstraintConflict {
                description: format!(
                    "{kind} contradicts existing {} constraint {} on the same entities",
                    existing.kind, existing.id
                ),
            });
        }
        table.insert(candidate.id.clone(), candidate.clone());
        info!(
            constraint = %candidate.id,
            kind = %kind,
            workspace = %workspace,
            status = ?status,
            "constraint applied"
        );
        Ok(candidate)
    }

    /// Evaluate satisfaction from current entity geometry.
    async fn evaluate(
        &self,
        kind: ConstraintKind,
        entities: &[EntityId],
        workspace: &WorkspaceId,
    ) -> Result<ConstraintStatus> {
        let mut payloads = Vec::with_capacity(entities.len());
        for id in entities {
            payloads.push(self.workspaces.entity(workspace, id).await?.payload);
        }

        let satisfied = match kind {
            ConstraintKind::Parallel => {
                let a = line_direction(&payloads[0])?;
                let b = line_direction(&payloads[1])?;
                a.is_parallel_to(&b)
            }
            ConstraintKind::Perpendicular => {
                let a = line_direction(&payloads[0])?;
                let b = line_direction(&payloads[1])?;
                a.is_perpendicular_to(&b)
            }
            ConstraintKind::Coincident => {
                let first = point_position(&payloads[0])?;
                let mut all_close = true;
                for payload in &payloads[1..] {
                    let pos = point_position(payload)?;
                    if first.distance(&pos) >= ANGULAR_TOLERANCE {
                        all_close = false;
                    }
                }
                all_close
            }
            ConstraintKind::Tangent => {
                let (line, circle) = match (&payloads[0], &payloads[1]) {
                    (l @ GeometryPayload::Line { .. }, c @ GeometryPayload::Circle { .. }) => {
                        (l, c)
                    }
                    (c @ GeometryPayload::Circle { .. }, l @ GeometryPayload::Line { .. }) => {
                        (l, c)
                    }
                    _ => {
                        return Err(CoreError::validation(
                            "entity_ids",
                            "tangent constraint requires one line and one circle",
                        ))
                    }
                };
                let (start, dir) = match line {
                    GeometryPayload::Line { start, end } => (*start, end.sub(start)),
                    _ => unreachable!(),
                };
                let (center, radius) = match circle {
                    GeometryPayload::Circle { center, radius, .. } => (*center, *radius),
                    _ => unreachable!(),
                };
                (point_line_distance(&center, &start, &dir) - radius).abs() < ANGULAR_TOLERANCE
            }
        };

        Ok(if satisfied {
            ConstraintStatus::Satisfied
        } else {
            ConstraintStatus::Violated
        })
    }

    /// Current record for one constraint, with satisfaction recomputed
    /// from current geometry. `Conflicting` (assigned during merge) is
    /// preserved; it is not a geometric verdict.
    pub async fn status(&self, id: &ConstraintId) -> Result<ConstraintRecord> {
        let stored = {
            let table = self.constraints.read().unwrap();
            table
                .get(id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("constraint", id.to_string()))?
        };
        if stored.status == ConstraintStatus::Conflicting {
            return Ok(stored);
        }

        let status = self
            .evaluate(stored.kind, &stored.entities, &stored.workspace)
            .await?;
        let mut refreshed = stored;
        refreshed.status = status;

        let mut table = self.constraints.write().unwrap();
        if let Some(entry) = table.get_mut(id) {
            entry.status = status;
        }
        Ok(refreshed)
    }

    /// Every constraint touching `entity`, satisfaction recomputed
    /// where the referenced geometry still exists.
    pub async fn constraints_for_entity(&self, entity: &EntityId) -> Vec<ConstraintRecord> {
        let touching: Vec<ConstraintRecord> = {
            let table = self.constraints.read().unwrap();
            table
                .values()
                .filter(|c| c.touches(entity))
                .cloned()
                .collect()
        };

        let mut results = Vec::with_capacity(touching.len());
        for constraint in touching {
            match self.status(&constraint.id).await {
                Ok(fresh) => results.push(fresh),
                // Geometry vanished since apply; fall back to the
                // stored record rather than dropping it from the view.
                Err(_) => results.push(constraint),
            }
        }
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        results
    }

    pub fn list_for_workspace(&self, workspace: &WorkspaceId) -> Vec<ConstraintRecord> {
        let table = self.constraints.read().unwrap();
        let mut records: Vec<ConstraintRecord> = table
            .values()
            .filter(|c| &c.workspace == workspace)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Incompatible constraint pairs across two workspace scopes,
    /// flagged `Conflicting` in the table. The merge path consumes
    /// this to emit Critical conflicts.
    pub fn flag_merge_contradictions(
        &self,
        source: &WorkspaceId,
        target: &WorkspaceId,
    ) -> Vec<(ConstraintRecord, ConstraintRecord)> {
        let mut table = self.constraints.write().unwrap();

        let source_ids: Vec<ConstraintId> = table
            .values()
            .filter(|c| &c.workspace == source)
            .map(|c| c.id.clone())
            .collect();
        let target_ids: Vec<ConstraintId> = table
            .values()
            .filter(|c| &c.workspace == target)
            .map(|c| c.id.clone())
            .collect();

        let mut pairs = Vec::new();
        for sid in &source_ids {
            for tid in &target_ids {
                let (a, b) = (table[sid].clone(), table[tid].clone());
                if a.shares_pair_with(&b) && a.kind.incompatible_with(b.kind) {
                    table.get_mut(sid).unwrap().status = ConstraintStatus::Conflicting;
                    table.get_mut(tid).unwrap().status = ConstraintStatus::Conflicting;
                    let mut a = a;
                    let mut b = b;
                    a.status = ConstraintStatus::Conflicting;
                    b.status = ConstraintStatus::Conflicting;
                    debug!(
                        source_constraint = %a.id,
                        target_constraint = %b.id,
                        "merge contradiction flagged"
                    );
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conflict::ConflictLedger;

    fn line(start: (f64, f64, f64), end: (f64, f64, f64)) -> GeometryPayload {
        GeometryPayload::Line {
            start: Vec3::new(start.0, start.1, start.2),
            end: Vec3::new(end.0, end.1, end.2),
        }
    }

    async fn setup() -> (Arc<WorkspaceManager>, ConstraintSolver) {
        let mgr = Arc::new(WorkspaceManager::new(Arc::new(ConflictLedger::new())));
        let solver = ConstraintSolver::new(Arc::clone(&mgr));
        (mgr, solver)
    }

    #[tokio::test]
    async fn test_parallel_lines_evaluate_satisfied() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let l2 = mgr
            .create_entity(&main, line((0.0, 1.0, 0.0), (5.0, 1.0, 0.0)))
            .await
            .unwrap();

        let record = solver
            .apply(ConstraintKind::Parallel, vec![l1.id, l2.id], &main)
            .await
            .unwrap();
        assert_eq!(record.status, ConstraintStatus::Satisfied);
    }

    #[tokio::test]
    async fn test_parallel_then_perpendicular_conflicts_leaving_one_constraint() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let l2 = mgr
            .create_entity(&main, line((0.0, 1.0, 0.0), (1.0, 1.0, 0.0)))
            .await
            .unwrap();

        solver
            .apply(
                ConstraintKind::Parallel,
                vec![l1.id.clone(), l2.id.clone()],
                &main,
            )
            .await
            .unwrap();
        let err = solver
            .apply(ConstraintKind::Perpendicular, vec![l1.id, l2.id], &main)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ConstraintConflict { .. }));
        // Exactly the parallel constraint remains stored.
        assert_eq!(solver.constraint_count(), 1);
        let stored = solver.list_for_workspace(&main);
        assert_eq!(stored[0].kind, ConstraintKind::Parallel);
    }

    #[tokio::test]
    async fn test_status_recomputes_after_geometry_change() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let l2 = mgr
            .create_entity(&main, line((0.0, 1.0, 0.0), (1.0, 1.0, 0.0)))
            .await
            .unwrap();
        let record = solver
            .apply(ConstraintKind::Parallel, vec![l1.id, l2.id.clone()], &main)
            .await
            .unwrap();
        assert_eq!(record.status, ConstraintStatus::Satisfied);

        // Rotate the second line; the same query must now say Violated.
        mgr.update_entity(&main, &l2.id, line((0.0, 1.0, 0.0), (0.0, 5.0, 0.0)))
            .await
            .unwrap();
        let fresh = solver.status(&record.id).await.unwrap();
        assert_eq!(fresh.status, ConstraintStatus::Violated);
    }

    #[tokio::test]
    async fn test_single_entity_constraint_is_invalid() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let err = solver
            .apply(ConstraintKind::Parallel, vec![l1.id], &main)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(solver.constraint_count(), 0);
    }

    #[tokio::test]
    async fn test_constraint_on_missing_entity_is_not_found() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let err = solver
            .apply(
                ConstraintKind::Parallel,
                vec![l1.id, EntityId::new("main:line-99")],
                &main,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "entity", .. }));
    }

    #[tokio::test]
    async fn test_parallel_on_points_rejects_entity_type() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let p1 = mgr
            .create_entity(
                &main,
                GeometryPayload::Point {
                    position: Vec3::ZERO,
                },
            )
            .await
            .unwrap();
        let p2 = mgr
            .create_entity(
                &main,
                GeometryPayload::Point {
                    position: Vec3::new(1.0, 0.0, 0.0),
                },
            )
            .await
            .unwrap();
        let err = solver
            .apply(ConstraintKind::Parallel, vec![p1.id, p2.id], &main)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_cross_scope_contradiction_is_flagged_for_merge() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l1 = mgr
            .create_entity(&main, line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)))
            .await
            .unwrap();
        let l2 = mgr
            .create_entity(&main, line((0.0, 1.0, 0.0), (1.0, 1.0, 0.0)))
            .await
            .unwrap();
        mgr.create_workspace("branch-a", None).await.unwrap();
        let branch = WorkspaceId::new("branch-a");

        // Same entity identities, contradictory kinds in the two scopes.
        solver
            .apply(
                ConstraintKind::Parallel,
                vec![l1.id.clone(), l2.id.clone()],
                &main,
            )
            .await
            .unwrap();
        solver
            .apply(ConstraintKind::Perpendicular, vec![l1.id, l2.id], &branch)
            .await
            .unwrap();

        let pairs = solver.flag_merge_contradictions(&branch, &main);
        assert_eq!(pairs.len(), 1);
        assert!(pairs
            .iter()
            .all(|(a, b)| a.status == ConstraintStatus::Conflicting
                && b.status == ConstraintStatus::Conflicting));
    }

    #[tokio::test]
    async fn test_tangent_line_circle_satisfied() {
        let (mgr, solver) = setup().await;
        let main = WorkspaceId::main();
        let l = mgr
            .create_entity(&main, line((-5.0, 1.0, 0.0), (5.0, 1.0, 0.0)))
            .await
            .unwrap();
        let c = mgr
            .create_entity(
                &main,
                GeometryPayload::Circle {
                    center: Vec3::ZERO,
                    normal: Vec3::new(0.0, 0.0, 1.0),
                    radius: 1.0,
                },
            )
            .await
            .unwrap();
        let record = solver
            .apply(ConstraintKind::Tangent, vec![l.id, c.id], &main)
            .await
            .unwrap();
        assert_eq!(record.status, ConstraintStatus::Satisfied);
    }
}
