//! Top-level coordinator: agent lifecycle and role-gated dispatch.
//!
//! Each agent's record sits behind its own mutex, so bookkeeping for
//! one agent never contends with another's — the ownership partition
//! that makes per-agent locking sound. Dispatch is at-least-once at
//! this layer: a downstream failure is recorded and surfaced, never
//! rolled back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use cadswarm_geom::{
    GeomError, GeometryEngine, GeometryPayload, GeometryRequest, GeometryResponse,
};

use crate::domain::agent::{AgentMetrics, AgentRecord, AgentStatus};
use crate::domain::conflict::Resolution;
use crate::domain::constraint::{ConstraintId, ConstraintKind};
use crate::domain::entity::EntityId;
use crate::domain::error::{CoreError, Result};
use crate::domain::workspace::{WorkspaceId, WorkspaceRecord};
use crate::roles::{Operation, RoleRegistry};
use crate::solver::ConstraintSolver;
use crate::workspace::WorkspaceManager;

/// Outcome of a dispatched operation.
struct OpOutcome {
    data: serde_json::Value,
    created_entity: Option<EntityId>,
}

impl OpOutcome {
    fn data(data: serde_json::Value) -> Self {
        OpOutcome {
            data,
            created_entity: None,
        }
    }
}

/// Aggregate session snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SystemStatus {
    pub agent_count: usize,
    pub idle_agents: usize,
    pub busy_agents: usize,
    pub workspaces: Vec<WorkspaceRecord>,
    pub open_conflicts: usize,
    pub constraint_count: usize,
}

/// The coordinator routing agent requests through role checks into the
/// Geometry Engine and Constraint Solver.
pub struct Controller {
    agents: std::sync::RwLock<HashMap<String, Arc<Mutex<AgentRecord>>>>,
    roles: Arc<RoleRegistry>,
    workspaces: Arc<WorkspaceManager>,
    solver: Arc<ConstraintSolver>,
    engine: Arc<dyn GeometryEngine>,
    engine_timeout: Duration,
}

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| CoreError::validation("params", e.to_string()))
}

#[derive(Deserialize)]
struct WorkspaceCreateParams {
    name: String,
    base: Option<String>,
}

#[derive(Deserialize)]
struct WorkspaceRefParams {
    workspace: Option<String>,
}

#[derive(Deserialize)]
struct MergeParams {
    source: String,
    target: String,
}

#[derive(Deserialize)]
struct ResolveParams {
    entity: String,
    resolution: String,
}

#[derive(Deserialize)]
struct UpdateParams {
    entity: String,
    payload: GeometryPayload,
}

#[derive(Deserialize)]
struct ExtrudeParams {
    profile: String,
    distance: f64,
}

#[derive(Deserialize)]
struct BooleanParams {
    op: String,
    a: String,
    b: String,
}

#[derive(Deserialize)]
struct PatternParams {
    source: String,
    count: u32,
    spacing: f64,
}

#[derive(Deserialize)]
struct ConstraintApplyParams {
    kind: String,
    entities: Vec<String>,
}

#[derive(Deserialize)]
struct ConstraintStatusParams {
    constraint: Option<String>,
    entity: Option<String>,
}

impl Controller {
    pub fn new(
        roles: Arc<RoleRegistry>,
        workspaces: Arc<WorkspaceManager>,
        solver: Arc<ConstraintSolver>,
        engine: Arc<dyn GeometryEngine>,
        engine_timeout: Duration,
    ) -> Self {
        Controller {
            agents: std::sync::RwLock::new(HashMap::new()),
            roles,
            workspaces,
            solver,
            engine,
            engine_timeout,
        }
    }

    /// Register an agent under a role, binding (and creating if absent)
    /// its dedicated workspace.
    pub async fn create_agent(
        &self,
        agent_id: &str,
        role_name: &str,
        workspace: Option<&WorkspaceId>,
    ) -> Result<AgentRecord> {
        if agent_id.is_empty() {
            return Err(CoreError::validation("agent_id", "agent id is empty"));
        }
        if self.agents.read().unwrap().contains_key(agent_id) {
            return Err(CoreError::DuplicateAgent(agent_id.to_string()));
        }
        if self.roles.role(role_name).is_none() {
            return Err(CoreError::InvalidRole(role_name.to_string()));
        }

        let default_ws = WorkspaceId::new(agent_id);
        let workspace_id = workspace.cloned().unwrap_or(default_ws);
        if self.workspaces.cell(&workspace_id).await.is_err() {
            self.workspaces
                .create_workspace(workspace_id.as_str(), None)
                .await?;
        }

        let record = AgentRecord::new(agent_id, role_name, workspace_id);
        let mut agents = self.agents.write().unwrap();
        if agents.contains_key(agent_id) {
            return Err(CoreError::DuplicateAgent(agent_id.to_string()));
        }
        agents.insert(agent_id.to_string(), Arc::new(Mutex::new(record.clone())));
        info!(agent = %agent_id, role = %role_name, workspace = %record.workspace, "agent registered");
        Ok(record)
    }

    fn agent_handle(&self, agent_id: &str) -> Result<Arc<Mutex<AgentRecord>>> {
        self.agents
            .read()
            .unwrap()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("agent", agent_id))
    }

    /// Execute one operation on behalf of an agent.
    ///
    /// A role denial is recorded as an agent error and surfaced as a
    /// permission failure without executing anything. Downstream
    /// results — success, failure or timeout — are recorded against
    /// the agent's metrics even if the agent was shut down while the
    /// call was in flight.
    #[instrument(skip(self, params), fields(agent = %agent_id, operation = %operation))]
    pub async fn execute_operation(
        &self,
        agent_id: &str,
        operation: Operation,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let handle = self.agent_handle(agent_id)?;

        let workspace = {
            let mut agent = handle.lock().await;
            agent.last_active = Utc::now();

            let role = self
                .roles
                .role(&agent.role)
                .ok_or_else(|| CoreError::InvalidRole(agent.role.clone()))?;
            if !role.permits(operation) {
                let err = CoreError::Permission {
                    agent: agent_id.to_string(),
                    role: agent.role.clone(),
                    operation: operation.method().to_string(),
                };
                agent.metrics.record_error();
                agent.log_error(operation.method(), err.code(), err.to_string());
                warn!(role = %agent.role, "operation denied by role");
                return Err(err);
            }
            agent.status = AgentStatus::Busy;
            agent.workspace.clone()
        };

        let result = self.dispatch(operation, &workspace, params).await;

        let mut agent = handle.lock().await;
        agent.last_active = Utc::now();
        // Terminated wins over a completion racing a shutdown.
        if agent.status == AgentStatus::Busy {
            agent.status = AgentStatus::Idle;
        }
        match result {
            Ok(outcome) => {
                agent.metrics.record_success();
                if let Some(entity) = outcome.created_entity {
                    agent.created_entities.insert(entity);
                }
                Ok(outcome.data)
            }
            Err(err) => {
                agent.metrics.record_error();
                agent.log_error(operation.method(), err.code(), err.to_string());
                Err(err)
            }
        }
    }

    /// Terminate an agent and remove it from the routable registry.
    ///
    /// The returned handle keeps the metrics object alive for callers
    /// still holding a reference; nothing is zeroed or destroyed.
    pub async fn shutdown_agent(&self, agent_id: &str) -> Result<Arc<Mutex<AgentRecord>>> {
        let handle = {
            let mut agents = self.agents.write().unwrap();
            agents
                .remove(agent_id)
                .ok_or_else(|| CoreError::not_found("agent", agent_id))?
        };
        let mut agent = handle.lock().await;
        agent.status = AgentStatus::Terminated;
        info!(agent = %agent_id, operations = agent.metrics.operation_count, "agent terminated");
        drop(agent);
        Ok(handle)
    }

    pub async fn agent_snapshot(&self, agent_id: &str) -> Result<AgentRecord> {
        let handle = self.agent_handle(agent_id)?;
        let agent = handle.lock().await;
        Ok(agent.clone())
    }

    pub async fn agent_metrics(&self, agent_id: &str) -> Result<AgentMetrics> {
        Ok(self.agent_snapshot(agent_id).await?.metrics)
    }

    pub async fn list_agents(&self) -> Vec<AgentRecord> {
        let handles: Vec<Arc<Mutex<AgentRecord>>> =
            self.agents.read().unwrap().values().cloned().collect();
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(handle.lock().await.clone());
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub async fn system_status(&self) -> SystemStatus {
        let agents = self.list_agents().await;
        let idle = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Idle)
            .count();
        let busy = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Busy)
            .count();
        SystemStatus {
            agent_count: agents.len(),
            idle_agents: idle,
            busy_agents: busy,
            workspaces: self.workspaces.list_workspaces().await,
            open_conflicts: self.workspaces.ledger().open_count(),
            constraint_count: self.solver.constraint_count(),
        }
    }

    /// Geometry Engine call bounded by the configured timeout. A
    /// timeout is an operation failure, never a silent hang; there is
    /// no cancellation of the computation once dispatched.
    async fn engine_call(
        &self,
        method: &str,
        params: serde_json::Value,
        workspace: &WorkspaceId,
    ) -> Result<GeometryResponse> {
        let request = GeometryRequest::new(method, params, workspace.as_str());
        match tokio::time::timeout(self.engine_timeout, self.engine.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(CoreError::Engine(err)),
            Err(_) => Err(CoreError::Engine(GeomError::Timeout {
                elapsed_ms: self.engine_timeout.as_millis() as u64,
            })),
        }
    }

    /// Count a mutating attempt that failed before any entity-table
    /// mutation; table-level failures are already counted there.
    async fn count_failed(&self, workspace: &WorkspaceId) {
        if let Err(err) = self.workspaces.record_failed_attempt(workspace).await {
            warn!(workspace = %workspace, error = %err, "failed-attempt accounting skipped");
        }
    }

    async fn dispatch(
        &self,
        operation: Operation,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        match operation {
            Operation::EntityCreatePoint
            | Operation::EntityCreateLine
            | Operation::EntityCreateCircle
            | Operation::SolidCreateBox
            | Operation::SolidCreateCylinder => {
                self.create_from_engine(operation, workspace, params).await
            }
            Operation::SolidExtrude => self.extrude(workspace, params).await,
            Operation::SolidBoolean => self.boolean(workspace, params).await,
            Operation::SolidPattern => self.pattern(workspace, params).await,
            Operation::EntityUpdate => self.update_entity(workspace, params).await,
            Operation::ConstraintApply => self.constraint_apply(workspace, params).await,
            Operation::ConstraintStatus => self.constraint_status(params).await,
            Operation::QueryStatus => {
                let report = self.workspaces.status(workspace).await?;
                Ok(OpOutcome::data(json!(report)))
            }
            Operation::WorkspaceStatus => {
                let p: WorkspaceRefParams = parse_params(params)?;
                let id = p
                    .workspace
                    .map(|w| WorkspaceId::new(w))
                    .unwrap_or_else(|| workspace.clone());
                let report = self.workspaces.status(&id).await?;
                Ok(OpOutcome::data(json!(report)))
            }
            Operation::WorkspaceList => {
                let records = self.workspaces.list_workspaces().await;
                Ok(OpOutcome::data(json!(records)))
            }
            Operation::WorkspaceCreate => {
                let p: WorkspaceCreateParams = parse_params(params)?;
                let base = p.base.map(|b| WorkspaceId::new(b));
                let record = self
                    .workspaces
                    .create_workspace(&p.name, base.as_ref())
                    .await?;
                Ok(OpOutcome::data(json!(record)))
            }
            Operation::WorkspaceSwitch => {
                let p: WorkspaceRefParams = parse_params(params)?;
                let id = p
                    .workspace
                    .map(|w| WorkspaceId::new(w))
                    .ok_or_else(|| CoreError::validation("workspace", "missing workspace id"))?;
                self.workspaces.switch(&id).await?;
                Ok(OpOutcome::data(json!({ "active": id })))
            }
            Operation::WorkspaceMerge => {
                let p: MergeParams = parse_params(params)?;
                let report = self
                    .workspaces
                    .merge(
                        &WorkspaceId::new(p.source),
                        &WorkspaceId::new(p.target),
                        &self.solver,
                    )
                    .await?;
                Ok(OpOutcome::data(json!(report)))
            }
            Operation::ConflictResolve => {
                let p: ResolveParams = parse_params(params)?;
                let resolution = Resolution::parse(&p.resolution).ok_or_else(|| {
                    CoreError::validation(
                        "resolution",
                        format!("unknown resolution '{}'", p.resolution),
                    )
                })?;
                let record = self
                    .workspaces
                    .resolve_conflict(&EntityId::new(p.entity), resolution)
                    .await?;
                Ok(OpOutcome::data(json!(record)))
            }
        }
    }

    /// Creation operations whose parameters go to the engine verbatim.
    async fn create_from_engine(
        &self,
        operation: Operation,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let response = match self.engine_call(operation.method(), params, workspace).await {
            Ok(r) => r,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        self.insert_payload(workspace, response).await
    }

    async fn insert_payload(
        &self,
        workspace: &WorkspaceId,
        response: GeometryResponse,
    ) -> Result<OpOutcome> {
        let payload = match response.payload {
            Some(p) => p,
            None => {
                self.count_failed(workspace).await;
                return Err(CoreError::validation(
                    "payload",
                    "engine returned no payload for a creating operation",
                ));
            }
        };
        let record = self.workspaces.create_entity(workspace, payload).await?;
        Ok(OpOutcome {
            data: json!({ "entity": record, "measurements": response.measurements }),
            created_entity: Some(record.id),
        })
    }

    async fn extrude(
        &self,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let p: ExtrudeParams = parse_params(params)?;
        let profile = match self
            .workspaces
            .entity(workspace, &EntityId::new(p.profile))
            .await
        {
            Ok(e) => e,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        let engine_params = json!({ "profile": profile.payload, "distance": p.distance });
        let response = match self
            .engine_call(Operation::SolidExtrude.method(), engine_params, workspace)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        self.insert_payload(workspace, response).await
    }

    async fn boolean(
        &self,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let p: BooleanParams = parse_params(params)?;
        let a = self
            .workspaces
            .entity(workspace, &EntityId::new(p.a))
            .await;
        let b = self
            .workspaces
            .entity(workspace, &EntityId::new(p.b))
            .await;
        let (a, b) = match (a, b) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        let engine_params = json!({ "op": p.op, "a": a.payload, "b": b.payload });
        let response = match self
            .engine_call(Operation::SolidBoolean.method(), engine_params, workspace)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        self.insert_payload(workspace, response).await
    }

    async fn pattern(
        &self,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let p: PatternParams = parse_params(params)?;
        let source = match self
            .workspaces
            .entity(workspace, &EntityId::new(p.source))
            .await
        {
            Ok(e) => e,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        let engine_params = json!({
            "source": source.payload,
            "count": p.count,
            "spacing": p.spacing,
        });
        let response = match self
            .engine_call(Operation::SolidPattern.method(), engine_params, workspace)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        self.insert_payload(workspace, response).await
    }

    async fn update_entity(
        &self,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let p: UpdateParams = parse_params(params)?;
        // The engine validates the replacement payload first; the
        // table-level update then counts the attempt itself.
        let engine_params = json!({ "payload": p.payload });
        let response = match self
            .engine_call(Operation::EntityUpdate.method(), engine_params, workspace)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.count_failed(workspace).await;
                return Err(e);
            }
        };
        let payload = response.payload.ok_or_else(|| {
            CoreError::validation("payload", "engine returned no payload for update")
        })?;
        let record = self
            .workspaces
            .update_entity(workspace, &EntityId::new(p.entity), payload)
            .await?;
        Ok(OpOutcome::data(json!({ "entity": record })))
    }

    async fn constraint_apply(
        &self,
        workspace: &WorkspaceId,
        params: serde_json::Value,
    ) -> Result<OpOutcome> {
        let p: ConstraintApplyParams = parse_params(params)?;
        let kind = ConstraintKind::parse(&p.kind).ok_or_else(|| {
            CoreError::validation("kind", format!("unknown constraint kind '{}'", p.kind))
        })?;
        let entities: Vec<EntityId> = p.entities.into_iter().map(EntityId).collect();
        let record = self.solver.apply(kind, entities, workspace).await?;
        Ok(OpOutcome::data(json!(record)))
    }

    async fn constraint_status(&self, params: serde_json::Value) -> Result<OpOutcome> {
        let p: ConstraintStatusParams = parse_params(params)?;
        if let Some(constraint) = p.constraint {
            let id = constraint
                .parse::<uuid::Uuid>()
                .map_err(|e| CoreError::validation("constraint", e.to_string()))?;
            let record = self.solver.status(&ConstraintId(id)).await?;
            return Ok(OpOutcome::data(json!(record)));
        }
        if let Some(entity) = p.entity {
            let records = self
                .solver
                .constraints_for_entity(&EntityId::new(entity))
                .await;
            return Ok(OpOutcome::data(json!(records)));
        }
        Err(CoreError::validation(
            "params",
            "constraint.status needs a constraint id or an entity id",
        ))
    }
}
