//! The session: explicit owner of every shared table.
//!
//! One session per coordinating process. It constructs the conflict
//! ledger, workspace manager, constraint solver, role registry and
//! controller, and wires the chosen geometry engine through them —
//! there is no ambient global state anywhere in the crate.

use std::sync::Arc;

use tracing::{error, info};

use cadswarm_geom::GeometryEngine;
use cadswarm_store::{FsModelStore, ModelStore};

use crate::config::SessionConfig;
use crate::controller::Controller;
use crate::domain::conflict::ConflictLedger;
use crate::domain::error::Result;
use crate::protocol::{ErrorCode, RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION};
use crate::roles::{Operation, RoleRegistry};
use crate::solver::ConstraintSolver;
use crate::workspace::WorkspaceManager;

/// A running coordination session.
pub struct Session {
    config: SessionConfig,
    conflicts: Arc<ConflictLedger>,
    workspaces: Arc<WorkspaceManager>,
    solver: Arc<ConstraintSolver>,
    roles: Arc<RoleRegistry>,
    controller: Controller,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session, loading the role catalogue from its configured
    /// location. Failure to load the catalogue aborts the session —
    /// agent creation is impossible without roles.
    pub fn new(config: SessionConfig, engine: Arc<dyn GeometryEngine>) -> Result<Self> {
        let roles = match RoleRegistry::load_predefined(&config.role_catalog) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                error!(error = %e, "session start aborted: role catalogue unavailable");
                return Err(e);
            }
        };
        Ok(Self::assemble(config, engine, roles))
    }

    /// Start a session with an already-built registry (tests,
    /// embedders that author roles in code).
    pub fn with_registry(
        config: SessionConfig,
        engine: Arc<dyn GeometryEngine>,
        roles: RoleRegistry,
    ) -> Self {
        Self::assemble(config, engine, Arc::new(roles))
    }

    fn assemble(
        config: SessionConfig,
        engine: Arc<dyn GeometryEngine>,
        roles: Arc<RoleRegistry>,
    ) -> Self {
        let conflicts = Arc::new(ConflictLedger::new());
        let workspaces = Arc::new(WorkspaceManager::new(Arc::clone(&conflicts)));
        let solver = Arc::new(ConstraintSolver::new(Arc::clone(&workspaces)));
        let controller = Controller::new(
            Arc::clone(&roles),
            Arc::clone(&workspaces),
            Arc::clone(&solver),
            engine,
            config.engine_timeout,
        );
        info!(
            workspace_root = %config.workspace_root.display(),
            "session started"
        );
        Session {
            config,
            conflicts,
            workspaces,
            solver,
            roles,
            controller,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    pub fn solver(&self) -> &Arc<ConstraintSolver> {
        &self.solver
    }

    pub fn roles(&self) -> &Arc<RoleRegistry> {
        &self.roles
    }

    pub fn conflicts(&self) -> &Arc<ConflictLedger> {
        &self.conflicts
    }

    /// Durable store rooted at the configured workspace root.
    pub fn file_store(&self) -> Result<FsModelStore> {
        Ok(FsModelStore::new(&self.config.workspace_root)?)
    }

    /// Persist every workspace's entities through a model store.
    /// Returns the total entity count written.
    pub async fn checkpoint(&self, store: &dyn ModelStore) -> Result<usize> {
        let mut total = 0;
        for record in self.workspaces.list_workspaces().await {
            total += self.workspaces.persist_workspace(&record.id, store).await?;
        }
        info!(entities = total, "session checkpoint written");
        Ok(total)
    }

    /// Handle one wire request, mapping every failure into the stable
    /// error bands. The caller's `params` object must carry the
    /// `agent_id` the operation is executed on behalf of.
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        if request.version != PROTOCOL_VERSION {
            return ResponseEnvelope::failure(
                &request.correlation_id,
                ErrorCode::UnsupportedFormat,
                format!("unsupported protocol version '{}'", request.version),
            );
        }
        let Some(operation) = Operation::parse(&request.method) else {
            return ResponseEnvelope::failure(
                &request.correlation_id,
                ErrorCode::OperationInvalid,
                format!("unknown method '{}'", request.method),
            );
        };
        let Some(agent_id) = request
            .params
            .get("agent_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            return ResponseEnvelope::failure(
                &request.correlation_id,
                ErrorCode::InvalidParameter,
                "params.agent_id is required".to_string(),
            );
        };

        match self
            .controller
            .execute_operation(&agent_id, operation, request.params)
            .await
        {
            Ok(data) => ResponseEnvelope::success(&request.correlation_id, data),
            Err(err) => ResponseEnvelope::failure(
                &request.correlation_id,
                ErrorCode::from(&err),
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadswarm_geom::InProcessEngine;

    use crate::roles::RoleCatalog;

    fn session() -> Session {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(&dir.path().join("data"), &dir.path().join("roles.json"));
        Session::with_registry(
            config,
            Arc::new(InProcessEngine::new()),
            RoleRegistry::from_catalog(RoleCatalog::standard()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_session_new_fails_without_catalogue_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(dir.path(), &dir.path().join("missing.json"));
        let err = Session::new(config, Arc::new(InProcessEngine::new())).unwrap_err();
        assert!(matches!(
            err,
            crate::domain::error::CoreError::CatalogUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_handle_rejects_wrong_protocol_version() {
        let session = session();
        let mut request = RequestEnvelope::new("workspace.list", serde_json::json!({}));
        request.version = "0".to_string();

        let response = session.handle(request).await;
        assert!(!response.is_success());
        assert_eq!(response.error.unwrap().code, 6000);
    }

    #[tokio::test]
    async fn test_handle_rejects_unknown_method() {
        let session = session();
        let request = RequestEnvelope::new(
            "workspace.teleport",
            serde_json::json!({"agent_id": "a1"}),
        );
        let response = session.handle(request).await;
        assert_eq!(response.error.unwrap().code, 5000);
    }

    #[tokio::test]
    async fn test_handle_requires_agent_id() {
        let session = session();
        let request = RequestEnvelope::new("workspace.list", serde_json::json!({}));
        let response = session.handle(request).await;
        assert_eq!(response.error.unwrap().code, 1000);
    }

    #[tokio::test]
    async fn test_handle_routes_point_creation_end_to_end() {
        let session = session();
        session
            .controller()
            .create_agent("a1", "designer", None)
            .await
            .unwrap();

        let request = RequestEnvelope::new(
            "entity.create.point",
            serde_json::json!({
                "agent_id": "a1",
                "position": {"x": 1.0, "y": 2.0, "z": 3.0}
            }),
        );
        let correlation = request.correlation_id.clone();
        let response = session.handle(request).await;

        assert!(response.is_success(), "{:?}", response.error);
        assert_eq!(response.correlation_id, correlation);
        let data = response.result.unwrap().data;
        assert_eq!(data["entity"]["workspace"], "a1");
    }

    #[tokio::test]
    async fn test_checkpoint_persists_all_workspaces() {
        use cadswarm_store::MemoryModelStore;

        let session = session();
        session
            .controller()
            .create_agent("a1", "designer", None)
            .await
            .unwrap();
        session
            .controller()
            .execute_operation(
                "a1",
                Operation::EntityCreatePoint,
                serde_json::json!({"position": {"x": 0.0, "y": 0.0, "z": 0.0}}),
            )
            .await
            .unwrap();

        let store = MemoryModelStore::new();
        let written = session.checkpoint(&store).await.unwrap();
        assert_eq!(written, 1);
    }
}
