//! Entity records and namespaced identity.
//!
//! Entity ids are minted once, in the workspace that creates the
//! entity (`workspace_id:type_suffix-seq`), and survive branch
//! snapshots and merge copies unchanged — identity is creation-time,
//! ownership is the containing table. Divergence between two copies is
//! detected by SHA-256 digest over the canonical JSON payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadswarm_geom::GeometryPayload;

use crate::domain::error::Result;
use crate::domain::workspace::WorkspaceId;

/// Namespaced entity identifier (`workspace_id:type_suffix-seq`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    /// Mint a fresh id in the namespace of the creating workspace.
    pub fn mint(workspace: &WorkspaceId, type_suffix: &str, seq: u64) -> Self {
        EntityId(format!("{workspace}:{type_suffix}-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

/// SHA-256 hex digest of a payload's canonical JSON form.
pub fn payload_digest(payload: &GeometryPayload) -> Result<String> {
    use sha2::Digest as _;
    let bytes = serde_json::to_vec(payload)?;
    Ok(hex::encode(sha2::Sha256::digest(&bytes)))
}

/// One entity record inside a workspace table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub payload: GeometryPayload,
    /// The workspace whose table currently holds this copy.
    pub workspace: WorkspaceId,
    /// Bumped by every update operation; copies keep the revision of
    /// the state they snapshotted.
    pub revision: u32,
    /// Digest of `payload`; the merge divergence test.
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(id: EntityId, payload: GeometryPayload, workspace: WorkspaceId) -> Result<Self> {
        let digest = payload_digest(&payload)?;
        Ok(EntityRecord {
            id,
            payload,
            workspace,
            revision: 0,
            digest,
            created_at: Utc::now(),
        })
    }

    /// Produce the next revision with a replaced payload.
    pub fn with_payload(&self, payload: GeometryPayload) -> Result<Self> {
        let digest = payload_digest(&payload)?;
        Ok(EntityRecord {
            id: self.id.clone(),
            payload,
            workspace: self.workspace.clone(),
            revision: self.revision + 1,
            digest,
            created_at: self.created_at,
        })
    }

    /// Re-home a value copy into another workspace's table. Identity
    /// and revision are preserved.
    pub fn copied_into(&self, workspace: &WorkspaceId) -> Self {
        let mut copy = self.clone();
        copy.workspace = workspace.clone();
        copy
    }

    pub fn kind(&self) -> &'static str {
        self.payload.type_suffix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadswarm_geom::Vec3;

    fn point(x: f64) -> GeometryPayload {
        GeometryPayload::Point {
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    #[test]
    fn test_minted_id_is_namespaced_by_workspace() {
        let id = EntityId::mint(&WorkspaceId::main(), "point", 3);
        assert_eq!(id.as_str(), "main:point-3");
    }

    #[test]
    fn test_identical_payloads_share_a_digest() {
        let a = EntityRecord::new(EntityId::new("main:point-1"), point(1.0), WorkspaceId::main())
            .unwrap();
        let b = EntityRecord::new(EntityId::new("main:point-2"), point(1.0), WorkspaceId::main())
            .unwrap();
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn test_update_bumps_revision_and_changes_digest() {
        let original =
            EntityRecord::new(EntityId::new("main:point-1"), point(1.0), WorkspaceId::main())
                .unwrap();
        let updated = original.with_payload(point(2.0)).unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.revision, 1);
        assert_ne!(updated.digest, original.digest);
    }

    #[test]
    fn test_copy_preserves_identity_and_changes_home() {
        let original =
            EntityRecord::new(EntityId::new("main:point-1"), point(1.0), WorkspaceId::main())
                .unwrap();
        let copy = original.copied_into(&WorkspaceId::new("branch-a"));

        assert_eq!(copy.id, original.id);
        assert_eq!(copy.digest, original.digest);
        assert_eq!(copy.workspace, WorkspaceId::new("branch-a"));
    }
}
