//! Constraint records and the incompatibility matrix.
//!
//! A constraint is stored only if it does not contradict an existing
//! constraint over the same entity pair; contradiction is a function of
//! constraint-type incompatibility, checked at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::EntityId;
use crate::domain::workspace::WorkspaceId;

/// Unique constraint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub Uuid);

impl ConstraintId {
    pub fn generate() -> Self {
        ConstraintId(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geometric relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Parallel,
    Perpendicular,
    Coincident,
    Tangent,
}

impl ConstraintKind {
    /// Two kinds that cannot both hold over the same entity pair.
    pub fn incompatible_with(self, other: ConstraintKind) -> bool {
        matches!(
            (self, other),
            (ConstraintKind::Parallel, ConstraintKind::Perpendicular)
                | (ConstraintKind::Perpendicular, ConstraintKind::Parallel)
        )
    }

    /// Kinds defined strictly over a pair; `Coincident` accepts more.
    pub fn is_pairwise(self) -> bool {
        !matches!(self, ConstraintKind::Coincident)
    }

    pub fn parse(s: &str) -> Option<ConstraintKind> {
        match s {
            "parallel" => Some(ConstraintKind::Parallel),
            "perpendicular" => Some(ConstraintKind::Perpendicular),
            "coincident" => Some(ConstraintKind::Coincident),
            "tangent" => Some(ConstraintKind::Tangent),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstraintKind::Parallel => "parallel",
            ConstraintKind::Perpendicular => "perpendicular",
            ConstraintKind::Coincident => "coincident",
            ConstraintKind::Tangent => "tangent",
        };
        write!(f, "{s}")
    }
}

/// Satisfaction verdict, recomputed from current geometry on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    Satisfied,
    Violated,
    Conflicting,
}

/// One stored constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    /// Ordered, minimum two, all in `workspace` at creation time.
    pub entities: Vec<EntityId>,
    pub status: ConstraintStatus,
    pub workspace: WorkspaceId,
    pub created_at: DateTime<Utc>,
}

impl ConstraintRecord {
    pub fn new(
        kind: ConstraintKind,
        entities: Vec<EntityId>,
        status: ConstraintStatus,
        workspace: WorkspaceId,
    ) -> Self {
        ConstraintRecord {
            id: ConstraintId::generate(),
            kind,
            entities,
            status,
            workspace,
            created_at: Utc::now(),
        }
    }

    /// `true` when the two constraints share at least two entities.
    pub fn shares_pair_with(&self, other: &ConstraintRecord) -> bool {
        self.entities
            .iter()
            .filter(|e| other.entities.contains(*e))
            .count()
            >= 2
    }

    pub fn touches(&self, entity: &EntityId) -> bool {
        self.entities.contains(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ConstraintKind, ids: &[&str]) -> ConstraintRecord {
        ConstraintRecord::new(
            kind,
            ids.iter().map(|s| EntityId::new(*s)).collect(),
            ConstraintStatus::Satisfied,
            WorkspaceId::main(),
        )
    }

    #[test]
    fn test_parallel_and_perpendicular_are_incompatible_both_ways() {
        assert!(ConstraintKind::Parallel.incompatible_with(ConstraintKind::Perpendicular));
        assert!(ConstraintKind::Perpendicular.incompatible_with(ConstraintKind::Parallel));
        assert!(!ConstraintKind::Parallel.incompatible_with(ConstraintKind::Parallel));
        assert!(!ConstraintKind::Tangent.incompatible_with(ConstraintKind::Coincident));
    }

    #[test]
    fn test_shares_pair_requires_two_common_entities() {
        let a = record(ConstraintKind::Parallel, &["main:line-1", "main:line-2"]);
        let b = record(
            ConstraintKind::Perpendicular,
            &["main:line-2", "main:line-3"],
        );
        let c = record(
            ConstraintKind::Perpendicular,
            &["main:line-1", "main:line-2"],
        );
        assert!(!a.shares_pair_with(&b));
        assert!(a.shares_pair_with(&c));
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [
            ConstraintKind::Parallel,
            ConstraintKind::Perpendicular,
            ConstraintKind::Coincident,
            ConstraintKind::Tangent,
        ] {
            assert_eq!(ConstraintKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(ConstraintKind::parse("symmetric"), None);
    }
}
