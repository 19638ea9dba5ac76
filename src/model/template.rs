use serde::{Deserialize, Serialize};

use crate::model::canvas::CanvasData;

/// A reusable workflow blueprint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub canvas_data: CanvasData,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub usage_count: u64,
}

/// Body of `POST /workflow-templates/{id}/instantiate`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiateTemplate {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
}
