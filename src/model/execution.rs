use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::node::NodeId;

/// Server-side lifecycle of one run: `pending -> running -> completed | failed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Request-shaping hint sent with an execution trigger.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

/// Body of `POST /workflows/{id}/execute`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteWorkflow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
}

/// One run attempt, as observed from the server. Never mutated locally.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub current_node_id: Option<NodeId>,
    #[serde(default)]
    pub result_data: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a view should render for an execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionOutcome<'a> {
    /// pending or running
    InProgress,
    /// `None` means the run finished without result data
    Completed(Option<&'a JsonValue>),
    Failed(Option<&'a str>),
}

impl WorkflowExecution {
    pub fn outcome(&self) -> ExecutionOutcome<'_> {
        match self.status {
            ExecutionStatus::Pending | ExecutionStatus::Running => ExecutionOutcome::InProgress,
            ExecutionStatus::Completed => ExecutionOutcome::Completed(self.result_data.as_ref().filter(|v| !v.is_null())),
            ExecutionStatus::Failed => ExecutionOutcome::Failed(self.error_message.as_deref()),
        }
    }
}
