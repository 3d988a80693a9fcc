//! cadswarm Core Library
//!
//! Multi-agent workspace coordination for a shared parametric CAD
//! model: workspace branching and isolation, merge with semantic
//! conflict detection and resolution, role-gated operation dispatch,
//! and the geometric constraint model that participates in merge
//! conflicts.
//!
//! Construct a [`Session`] to get a fully wired coordinator; nothing
//! in this crate relies on ambient process state.

pub mod config;
pub mod controller;
pub mod domain;
pub mod protocol;
pub mod roles;
pub mod session;
pub mod solver;
pub mod telemetry;
pub mod workspace;

pub use config::SessionConfig;
pub use controller::{Controller, SystemStatus};
pub use domain::{
    AgentMetrics, AgentRecord, AgentStatus, ConflictLedger, ConflictRecord, ConflictSeverity,
    ConflictStatus, ConstraintId, ConstraintKind, ConstraintRecord, ConstraintStatus, CoreError,
    EntityId, EntityRecord, ErrorEntry, Resolution, Result, WorkspaceId, WorkspaceKind,
    WorkspaceRecord, WorkspaceStatus, WorkspaceStatusReport, MAIN_WORKSPACE,
};
pub use protocol::{
    ErrorCode, RequestEnvelope, ResponseEnvelope, ResponseResult, ResponseStatus,
    PROTOCOL_VERSION,
};
pub use roles::{Operation, RoleCatalog, RoleDefinition, RoleRegistry};
pub use session::Session;
pub use solver::ConstraintSolver;
pub use workspace::{MergeOutcome, MergeReport, WorkspaceManager};

pub use cadswarm_geom::{
    GeometryEngine, GeometryPayload, GeometryRequest, GeometryResponse, InProcessEngine,
    Measurements, Vec3, ANGULAR_TOLERANCE,
};
pub use cadswarm_store::{
    EntityKey, FsModelStore, MemoryModelStore, ModelStore, StorageError, StoredRecord,
};
