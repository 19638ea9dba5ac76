use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FlowsyncError, Result, model::canvas::CanvasData};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

/// A named, versioned workflow graph owned by a project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub canvas_data: CanvasData,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<Workflow>(s).map_err(|e| FlowsyncError::Convert(format!("{}", e)))
    }
}

/// Listing filter for `GET /workflows`.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub include_templates: bool,
}

impl WorkflowFilter {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            include_templates: false,
        }
    }

    pub fn matches(
        &self,
        workflow: &Workflow,
    ) -> bool {
        self.project_id.as_ref().is_none_or(|p| p == &workflow.project_id) && (self.include_templates || !workflow.is_template)
    }
}

/// Body of `POST /workflows`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CreateWorkflow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_data: Option<CanvasData>,
}

impl CreateWorkflow {
    /// Checks required fields and canvas integrity before the request is sent.
    pub fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FlowsyncError::Validation("workflow name is required".to_string()));
        }
        if self.project_id.trim().is_empty() {
            return Err(FlowsyncError::Validation("project_id is required".to_string()));
        }
        if let Some(canvas) = &self.canvas_data {
            canvas.check_integrity()?;
        }
        Ok(())
    }
}

/// Body of `PUT /workflows/{id}`; absent fields are left unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UpdateWorkflow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_data: Option<CanvasData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl UpdateWorkflow {
    pub fn check(&self) -> Result<()> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(FlowsyncError::Validation("workflow name cannot be empty".to_string()));
        }
        if let Some(canvas) = &self.canvas_data {
            canvas.check_integrity()?;
        }
        Ok(())
    }

    /// Applies the partial update to a workflow record.
    pub fn apply(
        &self,
        workflow: &mut Workflow,
    ) {
        if let Some(name) = &self.name {
            workflow.name = name.clone();
        }
        if let Some(description) = &self.description {
            workflow.description = Some(description.clone());
        }
        if let Some(canvas) = &self.canvas_data {
            workflow.canvas_data = canvas.clone();
        }
        if let Some(status) = self.status {
            workflow.status = status;
        }
    }
}
