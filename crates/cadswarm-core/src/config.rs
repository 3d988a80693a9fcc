//! Session configuration surface.
//!
//! The coordinator consumes two externally supplied locations (the
//! workspace root and the role catalogue) plus tuning knobs. All are
//! readable from the environment; tests construct explicit values.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the on-disk workspace root.
pub const ENV_WORKSPACE_ROOT: &str = "CADSWARM_WORKSPACE_ROOT";
/// Environment variable naming the role catalogue file.
pub const ENV_ROLE_CATALOG: &str = "CADSWARM_ROLE_CATALOG";
/// Environment variable overriding the engine timeout (milliseconds).
pub const ENV_ENGINE_TIMEOUT_MS: &str = "CADSWARM_ENGINE_TIMEOUT_MS";

const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 5_000;

/// Configuration owned by one [`crate::session::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory for durable workspace snapshots.
    pub workspace_root: PathBuf,
    /// Location of the role catalogue file.
    pub role_catalog: PathBuf,
    /// Upper bound on any single Geometry Engine call.
    pub engine_timeout: Duration,
}

impl SessionConfig {
    /// Read the configuration from the environment, falling back to
    /// working-directory defaults.
    pub fn from_env() -> Self {
        let workspace_root = std::env::var(ENV_WORKSPACE_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cadswarm-data"));
        let role_catalog = std::env::var(ENV_ROLE_CATALOG)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("roles.json"));
        let engine_timeout = std::env::var(ENV_ENGINE_TIMEOUT_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_ENGINE_TIMEOUT_MS));
        SessionConfig {
            workspace_root,
            role_catalog,
            engine_timeout,
        }
    }

    /// Explicit-value constructor for tests and embedders.
    pub fn new(workspace_root: &Path, role_catalog: &Path) -> Self {
        SessionConfig {
            workspace_root: workspace_root.to_path_buf(),
            role_catalog: role_catalog.to_path_buf(),
            engine_timeout: Duration::from_millis(DEFAULT_ENGINE_TIMEOUT_MS),
        }
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }
}
