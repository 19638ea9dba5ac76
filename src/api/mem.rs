use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    FlowsyncError, Result, ShareLock,
    api::WorkflowApi,
    model::{
        CanvasData, CreateWorkflow, ExecuteWorkflow, ExecutionStatus, InstantiateTemplate, UpdateWorkflow, ValidationReport, Workflow, WorkflowExecution,
        WorkflowFilter, WorkflowStatus, WorkflowTemplate,
    },
    utils,
};

#[derive(Debug, Clone)]
struct StoredWorkflow {
    workflow: Workflow,
    deleted: bool,
}

#[derive(Debug, Default)]
struct MemState {
    /// insertion order of workflow ids
    order: Vec<String>,
    workflows: HashMap<String, StoredWorkflow>,
    /// per workflow, newest first
    executions: HashMap<String, Vec<WorkflowExecution>>,
    templates: Vec<WorkflowTemplate>,
    calls: HashMap<&'static str, usize>,
    latency: HashMap<&'static str, Duration>,
    fail_next: Option<FlowsyncError>,
}

/// In-process backend with the same contract as the REST one.
///
/// Executions are created `pending` and only move when the owner calls
/// [`MemWorkflowApi::advance_execution`], the way a remote worker would move
/// them.
#[derive(Debug, Clone, Default)]
pub struct MemWorkflowApi {
    state: ShareLock<MemState>,
}

impl MemWorkflowApi {
    pub fn new() -> Self {
        Self {
            state: ShareLock::new(RwLock::new(MemState::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, wait out any configured latency and hand back an
    /// injected failure, if any.
    async fn enter(
        &self,
        op: &'static str,
    ) -> Result<RwLockWriteGuard<'_, MemState>> {
        trace!(op, "mem api call");
        let latency = {
            let mut state = self.write();
            *state.calls.entry(op).or_default() += 1;
            state.latency.get(op).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.write();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        Ok(state)
    }

    /// Number of times `op` (the trait method name) was called.
    pub fn calls(
        &self,
        op: &str,
    ) -> usize {
        self.read().calls.get(op).copied().unwrap_or_default()
    }

    /// Delay every call to `op` by `latency`, the way a slow server would.
    pub fn set_latency(
        &self,
        op: &'static str,
        latency: Duration,
    ) {
        self.write().latency.insert(op, latency);
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(
        &self,
        error: FlowsyncError,
    ) {
        self.write().fail_next = Some(error);
    }

    pub fn add_template(
        &self,
        template: WorkflowTemplate,
    ) {
        self.write().templates.push(template);
    }

    /// Move an execution to `status`, stamping timestamps as the server would.
    pub fn advance_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        result_data: Option<JsonValue>,
        error_message: Option<String>,
    ) -> Result<WorkflowExecution> {
        let mut state = self.write();
        let execution = state
            .executions
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|e| e.id == execution_id)
            .ok_or(FlowsyncError::NotFound(format!("execution {}", execution_id)))?;

        let now = utils::time::now();
        execution.status = status;
        match status {
            ExecutionStatus::Pending => {}
            ExecutionStatus::Running => {
                execution.started_at.get_or_insert(now);
            }
            ExecutionStatus::Completed => {
                execution.started_at.get_or_insert(now);
                execution.completed_at = Some(now);
                execution.current_node_id = None;
                execution.result_data = result_data;
            }
            ExecutionStatus::Failed => {
                execution.started_at.get_or_insert(now);
                execution.completed_at = Some(now);
                execution.error_message = error_message;
            }
        }
        Ok(execution.clone())
    }

    /// Record which node a running execution is on.
    pub fn set_current_node(
        &self,
        execution_id: &str,
        node_id: Option<String>,
    ) -> Result<()> {
        let mut state = self.write();
        let execution = state
            .executions
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|e| e.id == execution_id)
            .ok_or(FlowsyncError::NotFound(format!("execution {}", execution_id)))?;
        execution.current_node_id = node_id;
        Ok(())
    }
}

impl MemState {
    fn live(
        &self,
        id: &str,
    ) -> Result<&Workflow> {
        match self.workflows.get(id) {
            Some(stored) if !stored.deleted => Ok(&stored.workflow),
            _ => Err(FlowsyncError::NotFound(format!("workflow {}", id))),
        }
    }

    fn live_mut(
        &mut self,
        id: &str,
    ) -> Result<&mut Workflow> {
        match self.workflows.get_mut(id) {
            Some(stored) if !stored.deleted => Ok(&mut stored.workflow),
            _ => Err(FlowsyncError::NotFound(format!("workflow {}", id))),
        }
    }

    fn insert(
        &mut self,
        project_id: String,
        name: String,
        description: Option<String>,
        canvas_data: CanvasData,
    ) -> Workflow {
        let now = utils::time::now();
        let workflow = Workflow {
            id: utils::longid(),
            project_id,
            name,
            description,
            canvas_data,
            status: WorkflowStatus::Draft,
            is_template: false,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.order.push(workflow.id.clone());
        self.workflows.insert(
            workflow.id.clone(),
            StoredWorkflow {
                workflow: workflow.clone(),
                deleted: false,
            },
        );
        workflow
    }
}

fn touch(workflow: &mut Workflow) {
    workflow.version += 1;
    workflow.updated_at = utils::time::now();
}

#[async_trait]
impl WorkflowApi for MemWorkflowApi {
    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>> {
        let state = self.enter("list_workflows").await?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.workflows.get(id))
            .filter(|s| !s.deleted && filter.matches(&s.workflow))
            .map(|s| s.workflow.clone())
            .collect())
    }

    async fn get_workflow(
        &self,
        id: &str,
    ) -> Result<Workflow> {
        let state = self.enter("get_workflow").await?;
        state.live(id).cloned()
    }

    async fn create_workflow(
        &self,
        input: &CreateWorkflow,
    ) -> Result<Workflow> {
        let mut state = self.enter("create_workflow").await?;
        input.check()?;
        Ok(state.insert(input.project_id.clone(), input.name.clone(), input.description.clone(), input.canvas_data.clone().unwrap_or_default()))
    }

    async fn update_workflow(
        &self,
        id: &str,
        input: &UpdateWorkflow,
    ) -> Result<Workflow> {
        let mut state = self.enter("update_workflow").await?;
        input.check()?;
        let workflow = state.live_mut(id)?;
        input.apply(workflow);
        touch(workflow);
        Ok(workflow.clone())
    }

    async fn delete_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        let mut state = self.enter("delete_workflow").await?;
        state.live(id)?;
        if let Some(stored) = state.workflows.get_mut(id) {
            stored.deleted = true;
        }
        Ok(())
    }

    async fn save_canvas(
        &self,
        id: &str,
        canvas: &CanvasData,
    ) -> Result<Workflow> {
        let mut state = self.enter("save_canvas").await?;
        canvas.check_integrity().map_err(|e| FlowsyncError::Validation(e.to_string()))?;
        let workflow = state.live_mut(id)?;
        workflow.canvas_data = canvas.clone();
        touch(workflow);
        Ok(workflow.clone())
    }

    async fn execute_workflow(
        &self,
        id: &str,
        _input: &ExecuteWorkflow,
    ) -> Result<WorkflowExecution> {
        let mut state = self.enter("execute_workflow").await?;
        state.live(id)?;
        let execution = WorkflowExecution {
            id: utils::longid(),
            workflow_id: id.to_string(),
            status: ExecutionStatus::Pending,
            current_node_id: None,
            result_data: None,
            error_message: None,
            created_at: utils::time::now(),
            started_at: None,
            completed_at: None,
        };
        state.executions.entry(id.to_string()).or_default().insert(0, execution.clone());
        Ok(execution)
    }

    async fn list_executions(
        &self,
        id: &str,
    ) -> Result<Vec<WorkflowExecution>> {
        let state = self.enter("list_executions").await?;
        state.live(id)?;
        Ok(state.executions.get(id).cloned().unwrap_or_default())
    }

    async fn validate_workflow(
        &self,
        id: &str,
    ) -> Result<ValidationReport> {
        let state = self.enter("validate_workflow").await?;
        Ok(state.live(id)?.canvas_data.validate())
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        let state = self.enter("list_templates").await?;
        Ok(state.templates.clone())
    }

    async fn instantiate_template(
        &self,
        template_id: &str,
        input: &InstantiateTemplate,
    ) -> Result<Workflow> {
        let mut state = self.enter("instantiate_template").await?;
        if input.project_id.trim().is_empty() {
            return Err(FlowsyncError::Validation("project_id is required".to_string()));
        }
        let template = state
            .templates
            .iter_mut()
            .find(|t| t.id == template_id)
            .ok_or(FlowsyncError::NotFound(format!("template {}", template_id)))?;
        template.usage_count += 1;
        let name = input.workflow_name.clone().unwrap_or_else(|| template.name.clone());
        let description = template.description.clone();
        let canvas = template.canvas_data.clone();
        Ok(state.insert(input.project_id.clone(), name, description, canvas))
    }
}
