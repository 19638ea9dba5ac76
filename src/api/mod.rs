//! Transport layer for the workflow backend.
//!
//! Provides an abstraction over different backends:
//! - `HttpWorkflowApi`: the REST backend, over reqwest
//! - `MemWorkflowApi`: an in-process backend for tests and offline use

mod http;
mod mem;

use async_trait::async_trait;

use crate::{
    Result,
    model::{
        CanvasData, CreateWorkflow, ExecuteWorkflow, InstantiateTemplate, UpdateWorkflow, ValidationReport, Workflow, WorkflowExecution, WorkflowFilter,
        WorkflowTemplate,
    },
};

pub use http::HttpWorkflowApi;
pub use mem::MemWorkflowApi;

/// Every backend call the client makes. Errors are returned verbatim; no
/// implementation retries.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// `GET /workflows`
    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>>;

    /// `GET /workflows/{id}`
    async fn get_workflow(
        &self,
        id: &str,
    ) -> Result<Workflow>;

    /// `POST /workflows`
    async fn create_workflow(
        &self,
        input: &CreateWorkflow,
    ) -> Result<Workflow>;

    /// `PUT /workflows/{id}`
    async fn update_workflow(
        &self,
        id: &str,
        input: &UpdateWorkflow,
    ) -> Result<Workflow>;

    /// `DELETE /workflows/{id}`, a soft delete.
    async fn delete_workflow(
        &self,
        id: &str,
    ) -> Result<()>;

    /// `PUT /workflows/{id}/canvas`
    async fn save_canvas(
        &self,
        id: &str,
        canvas: &CanvasData,
    ) -> Result<Workflow>;

    /// `POST /workflows/{id}/execute`. May take minutes; never time it out.
    async fn execute_workflow(
        &self,
        id: &str,
        input: &ExecuteWorkflow,
    ) -> Result<WorkflowExecution>;

    /// `GET /workflows/{id}/executions`, newest first.
    async fn list_executions(
        &self,
        id: &str,
    ) -> Result<Vec<WorkflowExecution>>;

    /// `POST /workflows/{id}/validate`
    async fn validate_workflow(
        &self,
        id: &str,
    ) -> Result<ValidationReport>;

    /// `GET /workflow-templates`
    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>>;

    /// `POST /workflow-templates/{id}/instantiate`
    async fn instantiate_template(
        &self,
        template_id: &str,
        input: &InstantiateTemplate,
    ) -> Result<Workflow>;
}
