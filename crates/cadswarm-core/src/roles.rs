//! Role registry: named capability sets over a closed operation
//! vocabulary.
//!
//! The catalogue file spells operations as dot-namespaced method
//! strings; they are parsed into [`Operation`] at load time so the
//! permission check and dispatch sites are enum matches, not string
//! comparisons. Role objects are immutable once loaded and shared by
//! reference across every agent holding the role.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::error::{CoreError, Result};

/// Closed vocabulary of dispatchable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    WorkspaceCreate,
    WorkspaceSwitch,
    WorkspaceStatus,
    WorkspaceMerge,
    WorkspaceList,
    ConflictResolve,
    EntityCreatePoint,
    EntityCreateLine,
    EntityCreateCircle,
    EntityUpdate,
    SolidCreateBox,
    SolidCreateCylinder,
    SolidExtrude,
    SolidBoolean,
    SolidPattern,
    ConstraintApply,
    ConstraintStatus,
    QueryStatus,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[
        Operation::WorkspaceCreate,
        Operation::WorkspaceSwitch,
        Operation::WorkspaceStatus,
        Operation::WorkspaceMerge,
        Operation::WorkspaceList,
        Operation::ConflictResolve,
        Operation::EntityCreatePoint,
        Operation::EntityCreateLine,
        Operation::EntityCreateCircle,
        Operation::EntityUpdate,
        Operation::SolidCreateBox,
        Operation::SolidCreateCylinder,
        Operation::SolidExtrude,
        Operation::SolidBoolean,
        Operation::SolidPattern,
        Operation::ConstraintApply,
        Operation::ConstraintStatus,
        Operation::QueryStatus,
    ];

    /// The dot-namespaced wire method for this operation.
    pub fn method(&self) -> &'static str {
        match self {
            Operation::WorkspaceCreate => "workspace.create",
            Operation::WorkspaceSwitch => "workspace.switch",
            Operation::WorkspaceStatus => "workspace.status",
            Operation::WorkspaceMerge => "workspace.merge",
            Operation::WorkspaceList => "workspace.list",
            Operation::ConflictResolve => "conflict.resolve",
            Operation::EntityCreatePoint => "entity.create.point",
            Operation::EntityCreateLine => "entity.create.line",
            Operation::EntityCreateCircle => "entity.create.circle",
            Operation::EntityUpdate => "entity.update",
            Operation::SolidCreateBox => "solid.create.box",
            Operation::SolidCreateCylinder => "solid.create.cylinder",
            Operation::SolidExtrude => "solid.extrude",
            Operation::SolidBoolean => "solid.boolean",
            Operation::SolidPattern => "solid.pattern",
            Operation::ConstraintApply => "constraint.apply",
            Operation::ConstraintStatus => "constraint.status",
            Operation::QueryStatus => "query.status",
        }
    }

    /// Parse a wire method into the closed vocabulary.
    pub fn parse(method: &str) -> Option<Operation> {
        Operation::ALL.iter().copied().find(|op| op.method() == method)
    }

    /// Operations that mutate workspace state (and therefore count
    /// toward a workspace's operation tally even when they fail).
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::EntityCreatePoint
                | Operation::EntityCreateLine
                | Operation::EntityCreateCircle
                | Operation::EntityUpdate
                | Operation::SolidCreateBox
                | Operation::SolidCreateCylinder
                | Operation::SolidExtrude
                | Operation::SolidBoolean
                | Operation::SolidPattern
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method())
    }
}

/// One immutable role: a name plus its permitted operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    pub name: String,
    allowed: BTreeSet<Operation>,
}

impl RoleDefinition {
    pub fn new(name: &str, allowed: impl IntoIterator<Item = Operation>) -> Self {
        RoleDefinition {
            name: name.to_string(),
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn permits(&self, operation: Operation) -> bool {
        self.allowed.contains(&operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.allowed.iter().copied()
    }
}

/// Catalogue file entry: role name plus wire-method strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCatalogEntry {
    pub name: String,
    pub operations: Vec<String>,
}

/// The serializable role catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCatalog {
    pub roles: Vec<RoleCatalogEntry>,
}

impl RoleCatalog {
    /// The fixed predefined catalogue.
    ///
    /// - `designer` — sketch-level entity creation plus queries.
    /// - `modeler` — designer plus solids and entity updates.
    /// - `validator` — query/status operations only.
    /// - `coordinator` — everything, including merge and conflict
    ///   resolution.
    pub fn standard() -> Self {
        let queries = [
            Operation::WorkspaceStatus,
            Operation::WorkspaceList,
            Operation::ConstraintStatus,
            Operation::QueryStatus,
        ];
        let sketch = [
            Operation::EntityCreatePoint,
            Operation::EntityCreateLine,
            Operation::EntityCreateCircle,
            Operation::ConstraintApply,
        ];
        let solids = [
            Operation::EntityUpdate,
            Operation::SolidCreateBox,
            Operation::SolidCreateCylinder,
            Operation::SolidExtrude,
            Operation::SolidBoolean,
            Operation::SolidPattern,
        ];

        let entry = |name: &str, ops: Vec<Operation>| RoleCatalogEntry {
            name: name.to_string(),
            operations: ops.iter().map(|op| op.method().to_string()).collect(),
        };

        RoleCatalog {
            roles: vec![
                entry("designer", queries.iter().chain(&sketch).copied().collect()),
                entry(
                    "modeler",
                    queries
                        .iter()
                        .chain(&sketch)
                        .chain(&solids)
                        .copied()
                        .collect(),
                ),
                entry("validator", queries.to_vec()),
                entry("coordinator", Operation::ALL.to_vec()),
            ],
        }
    }
}

/// Immutable registry of loaded roles, shared by reference.
#[derive(Debug)]
pub struct RoleRegistry {
    roles: HashMap<String, Arc<RoleDefinition>>,
}

impl RoleRegistry {
    /// Load the predefined role catalogue from its configured location.
    ///
    /// An absent or malformed catalogue is fatal for the session:
    /// agent creation is impossible without roles, and the registry
    /// never silently degrades to empty.
    pub fn load_predefined(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::CatalogUnavailable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let catalog: RoleCatalog =
            serde_json::from_str(&text).map_err(|e| CoreError::CatalogUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let registry = Self::from_catalog(catalog)?;
        info!(path = %path.display(), roles = registry.roles.len(), "role catalogue loaded");
        Ok(registry)
    }

    /// Build a registry from an in-memory catalogue, rejecting method
    /// strings outside the closed vocabulary.
    pub fn from_catalog(catalog: RoleCatalog) -> Result<Self> {
        let mut roles = HashMap::new();
        for entry in catalog.roles {
            let mut allowed = BTreeSet::new();
            for method in &entry.operations {
                let op = Operation::parse(method).ok_or_else(|| {
                    CoreError::validation(
                        "operations",
                        format!("unknown operation '{method}' in role '{}'", entry.name),
                    )
                })?;
                allowed.insert(op);
            }
            roles.insert(
                entry.name.clone(),
                Arc::new(RoleDefinition {
                    name: entry.name,
                    allowed,
                }),
            );
        }
        Ok(RoleRegistry { roles })
    }

    pub fn role(&self, name: &str) -> Option<Arc<RoleDefinition>> {
        self.roles.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }
}
