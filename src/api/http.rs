use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder, Response,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::{
    FlowsyncError, HttpConfig, Result,
    api::WorkflowApi,
    model::{
        CanvasData, CreateWorkflow, ExecuteWorkflow, InstantiateTemplate, UpdateWorkflow, ValidationReport, Workflow, WorkflowExecution, WorkflowFilter,
        WorkflowTemplate,
    },
};

/// REST transport for the workflow backend.
#[derive(Clone)]
pub struct HttpWorkflowApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpWorkflowApi {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // no client-wide timeout: execution triggers must be allowed to run for minutes
        let client = reqwest::Client::builder().default_headers(headers).build().map_err(|e| FlowsyncError::Client(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a transport reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        config: &HttpConfig,
    ) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    fn url(
        &self,
        path: &str,
    ) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
    ) -> RequestBuilder {
        self.untimed_request(method, path).timeout(self.request_timeout)
    }

    fn untimed_request(
        &self,
        method: Method,
        path: &str,
    ) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "api request");
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FlowsyncError::from_status(status.as_u16(), error_message(&body, status.canonical_reason())))
    }
}

/// Pulls a readable message out of an error body. The backend answers with
/// `{"detail": "..."}`, or a list of field errors for rejected payloads.
fn error_message(
    body: &str,
    reason: Option<&str>,
) -> String {
    let fallback = || reason.unwrap_or("request failed").to_string();

    match serde_json::from_str::<JsonValue>(body) {
        Ok(JsonValue::Object(map)) => match map.get("detail") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| match item.get("msg").and_then(JsonValue::as_str) {
                    Some(msg) => msg.to_string(),
                    None => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        },
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => fallback(),
    }
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>> {
        let response = self.request(Method::GET, "/workflows").query(filter).send().await?;
        Self::parse(response).await
    }

    async fn get_workflow(
        &self,
        id: &str,
    ) -> Result<Workflow> {
        let response = self.request(Method::GET, &format!("/workflows/{}", id)).send().await?;
        Self::parse(response).await
    }

    async fn create_workflow(
        &self,
        input: &CreateWorkflow,
    ) -> Result<Workflow> {
        let response = self.request(Method::POST, "/workflows").json(input).send().await?;
        Self::parse(response).await
    }

    async fn update_workflow(
        &self,
        id: &str,
        input: &UpdateWorkflow,
    ) -> Result<Workflow> {
        let response = self.request(Method::PUT, &format!("/workflows/{}", id)).json(input).send().await?;
        Self::parse(response).await
    }

    async fn delete_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        let response = self.request(Method::DELETE, &format!("/workflows/{}", id)).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn save_canvas(
        &self,
        id: &str,
        canvas: &CanvasData,
    ) -> Result<Workflow> {
        let response = self.request(Method::PUT, &format!("/workflows/{}/canvas", id)).json(&json!({ "canvas_data": canvas })).send().await?;
        Self::parse(response).await
    }

    async fn execute_workflow(
        &self,
        id: &str,
        input: &ExecuteWorkflow,
    ) -> Result<WorkflowExecution> {
        let response = self.untimed_request(Method::POST, &format!("/workflows/{}/execute", id)).json(input).send().await?;
        Self::parse(response).await
    }

    async fn list_executions(
        &self,
        id: &str,
    ) -> Result<Vec<WorkflowExecution>> {
        let response = self.request(Method::GET, &format!("/workflows/{}/executions", id)).send().await?;
        Self::parse(response).await
    }

    async fn validate_workflow(
        &self,
        id: &str,
    ) -> Result<ValidationReport> {
        let response = self.request(Method::POST, &format!("/workflows/{}/validate", id)).send().await?;
        Self::parse(response).await
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        let response = self.request(Method::GET, "/workflow-templates").send().await?;
        Self::parse(response).await
    }

    async fn instantiate_template(
        &self,
        template_id: &str,
        input: &InstantiateTemplate,
    ) -> Result<Workflow> {
        let response = self.request(Method::POST, &format!("/workflow-templates/{}/instantiate", template_id)).json(input).send().await?;
        Self::parse(response).await
    }
}
