//! Agent records, metrics, and the structured error log.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::EntityId;
use crate::domain::workspace::WorkspaceId;

/// Agent lifecycle status. `Terminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Terminated,
}

/// One structured entry in an agent's append-only error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub operation: String,
    pub code: String,
    pub message: String,
}

/// Per-agent operation counters.
///
/// Invariant: `operation_count == success_count + error_count`, always.
/// The only mutators are [`AgentMetrics::record_success`] and
/// [`AgentMetrics::record_error`], which update both sides together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub operation_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl AgentMetrics {
    pub fn record_success(&mut self) {
        self.operation_count += 1;
        self.success_count += 1;
    }

    pub fn record_error(&mut self) {
        self.operation_count += 1;
        self.error_count += 1;
    }

    pub fn is_consistent(&self) -> bool {
        self.operation_count == self.success_count + self.error_count
    }
}

/// One registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub role: String,
    pub workspace: WorkspaceId,
    pub status: AgentStatus,
    pub metrics: AgentMetrics,
    /// Entity ids attributed to this agent.
    pub created_entities: BTreeSet<EntityId>,
    /// Append-only; never truncated, survives shutdown.
    pub error_log: Vec<ErrorEntry>,
    /// Updated on every operation attempt, success or failure.
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(id: &str, role: &str, workspace: WorkspaceId) -> Self {
        let now = Utc::now();
        AgentRecord {
            id: id.to_string(),
            role: role.to_string(),
            workspace,
            status: AgentStatus::Idle,
            metrics: AgentMetrics::default(),
            created_entities: BTreeSet::new(),
            error_log: Vec::new(),
            last_active: now,
            created_at: now,
        }
    }

    pub fn log_error(&mut self, operation: &str, code: &str, message: String) {
        self.error_log.push(ErrorEntry {
            at: Utc::now(),
            operation: operation.to_string(),
            code: code.to_string(),
            message,
        });
    }
}
