//! Running/idle projection over a cached execution list.
//!
//! The list must already be ordered newest-first; nothing here sorts.

use crate::model::{ExecutionStatus, WorkflowExecution};

/// true iff any execution is `running`
pub fn is_running(executions: &[WorkflowExecution]) -> bool {
    executions.iter().any(|e| e.status == ExecutionStatus::Running)
}

/// the most recent execution, if any
pub fn latest(executions: &[WorkflowExecution]) -> Option<&WorkflowExecution> {
    executions.first()
}

/// Both projections of one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStatusView {
    pub is_running: bool,
    pub latest: Option<WorkflowExecution>,
}

impl ExecutionStatusView {
    pub fn project(executions: &[WorkflowExecution]) -> Self {
        Self {
            is_running: is_running(executions),
            latest: latest(executions).cloned(),
        }
    }
}
