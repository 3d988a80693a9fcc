//! Workspace records: the unit of agent isolation.
//!
//! Workspaces form a fixed two-level tree: one `main` root created at
//! session start, and value-copy branches snapshotted from it. A
//! branch's base reference is set at creation and never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved identifier of the root workspace.
pub const MAIN_WORKSPACE: &str = "main";

/// Unique workspace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        WorkspaceId(id.into())
    }

    pub fn main() -> Self {
        WorkspaceId(MAIN_WORKSPACE.to_string())
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_WORKSPACE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        WorkspaceId(s.to_string())
    }
}

/// Workspace position in the two-level tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceKind {
    Main,
    Branch,
}

/// Workspace lifecycle status.
///
/// `Clean → Dirty` on any entity mutation. A branch reaches `Merged`
/// (terminal) once merged with zero remaining open conflicts.
/// `Conflicted` holds while at least one open conflict names the
/// workspace, and falls back to `Dirty` when the last one resolves.
/// `main` never becomes `Merged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Clean,
    Dirty,
    Merged,
    Conflicted,
}

/// One workspace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: WorkspaceId,
    pub name: String,
    pub kind: WorkspaceKind,
    /// Base workspace, branches only. Immutable after creation.
    pub base: Option<WorkspaceId>,
    pub status: WorkspaceStatus,
    pub entity_count: usize,
    /// Mutating operations attempted against this workspace, success or
    /// failure, since creation.
    pub operation_count: u64,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceRecord {
    pub fn main() -> Self {
        WorkspaceRecord {
            id: WorkspaceId::main(),
            name: MAIN_WORKSPACE.to_string(),
            kind: WorkspaceKind::Main,
            base: None,
            status: WorkspaceStatus::Clean,
            entity_count: 0,
            operation_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn branch(id: WorkspaceId, name: &str, base: WorkspaceId) -> Self {
        WorkspaceRecord {
            id,
            name: name.to_string(),
            kind: WorkspaceKind::Branch,
            base: Some(base),
            status: WorkspaceStatus::Clean,
            entity_count: 0,
            operation_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Mergeability precondition on the record alone; the caller also
    /// checks the open conflict set.
    pub fn status_allows_merge(&self) -> bool {
        matches!(self.status, WorkspaceStatus::Clean | WorkspaceStatus::Dirty)
    }
}

/// Snapshot returned by the status operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatusReport {
    pub id: WorkspaceId,
    pub name: String,
    pub kind: WorkspaceKind,
    pub status: WorkspaceStatus,
    pub entity_count: usize,
    pub operation_count: u64,
    pub open_conflicts: usize,
    /// `true` iff status ∈ {clean, dirty} and no open conflicts
    /// reference this workspace.
    pub can_merge: bool,
}
