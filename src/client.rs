//! The workflow client: cached queries plus mutations that keep the cache
//! consistent.
//!
//! Every mutation maps to a fixed set of [`CacheEffect`]s through
//! [`Mutation::effects`], so the whole invalidation policy lives in one table.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::{
    Config, Result,
    api::WorkflowApi,
    autosave::AutoSaver,
    common::{CacheData, CacheEffect, Cached, QueryCache},
    keys::{QueryKey, WorkflowKeys},
    model::{
        CanvasData, CreateWorkflow, ExecuteWorkflow, ExecutionMode, InstantiateTemplate, UpdateWorkflow, ValidationReport, Workflow, WorkflowExecution,
        WorkflowFilter, WorkflowTemplate,
    },
    poller::{ExecutionPoller, PollCadence, PollHandle},
    status::ExecutionStatusView,
};

/// A completed backend mutation, carrying what the cache needs to react.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Created,
    Updated(Workflow),
    Deleted(String),
    /// canvas-only save, the autosave path
    CanvasSaved(Workflow),
    Executed(String),
    Instantiated,
}

impl Mutation {
    pub fn effects(&self) -> Vec<CacheEffect> {
        match self {
            Mutation::Created | Mutation::Instantiated => vec![CacheEffect::Invalidate(WorkflowKeys::lists())],
            Mutation::Updated(workflow) => vec![
                CacheEffect::Overwrite(WorkflowKeys::detail(&workflow.id), workflow.clone().into_data()),
                CacheEffect::Invalidate(WorkflowKeys::lists()),
            ],
            Mutation::Deleted(id) => vec![CacheEffect::Remove(WorkflowKeys::detail(id)), CacheEffect::Invalidate(WorkflowKeys::lists())],
            // lists are left alone so an autosave never triggers list refetches
            Mutation::CanvasSaved(workflow) => vec![CacheEffect::Overwrite(WorkflowKeys::detail(&workflow.id), workflow.clone().into_data())],
            Mutation::Executed(id) => vec![CacheEffect::Invalidate(WorkflowKeys::executions(id))],
        }
    }
}

/// Entry point for every workflow operation.
///
/// Cheap to clone; clones share the transport and the cache.
#[derive(Clone)]
pub struct WorkflowClient {
    api: Arc<dyn WorkflowApi>,
    cache: QueryCache,
    config: Arc<Config>,
    runtime: Handle,
}

impl WorkflowClient {
    pub(crate) fn new(
        api: Arc<dyn WorkflowApi>,
        config: Config,
        runtime: Handle,
    ) -> Self {
        Self {
            cache: QueryCache::new(&config.cache),
            api,
            config: Arc::new(config),
            runtime,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn api(&self) -> &Arc<dyn WorkflowApi> {
        &self.api
    }

    /// Fresh cached value, or a de-duplicated fetch.
    async fn query<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
    ) -> Result<T>
    where
        T: Cached + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(value) = self.cache.get_fresh(&key) {
            return Ok(value);
        }
        self.cache.fetch(key, fetcher).await
    }

    fn commit(
        &self,
        mutation: Mutation,
    ) {
        for effect in mutation.effects() {
            self.cache.apply(effect);
        }
    }

    pub async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>> {
        let key = WorkflowKeys::list(filter.project_id.as_deref(), filter.include_templates);
        let api = self.api.clone();
        let filter = filter.clone();
        self.query(key, move || async move { api.list_workflows(&filter).await }).await
    }

    pub async fn get_workflow(
        &self,
        id: &str,
    ) -> Result<Workflow> {
        let api = self.api.clone();
        let id = id.to_string();
        self.query(WorkflowKeys::detail(&id), move || async move { api.get_workflow(&id).await }).await
    }

    /// Execution list, from cache while fresh.
    pub async fn executions(
        &self,
        id: &str,
    ) -> Result<Vec<WorkflowExecution>> {
        let api = self.api.clone();
        let id = id.to_string();
        self.query(WorkflowKeys::executions(&id), move || async move { api.list_executions(&id).await }).await
    }

    /// Execution list straight from the backend, bypassing freshness.
    pub async fn refresh_executions(
        &self,
        id: &str,
    ) -> Result<Vec<WorkflowExecution>> {
        let api = self.api.clone();
        let id = id.to_string();
        self.cache.fetch(WorkflowKeys::executions(&id), move || async move { api.list_executions(&id).await }).await
    }

    pub async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        let api = self.api.clone();
        self.query(WorkflowKeys::templates(), move || async move { api.list_templates().await }).await
    }

    pub async fn create_workflow(
        &self,
        input: &CreateWorkflow,
    ) -> Result<Workflow> {
        input.check()?;
        let workflow = self.api.create_workflow(input).await?;
        info!(workflow_id = %workflow.id, project_id = %workflow.project_id, "workflow created");
        self.commit(Mutation::Created);
        Ok(workflow)
    }

    pub async fn update_workflow(
        &self,
        id: &str,
        input: &UpdateWorkflow,
    ) -> Result<Workflow> {
        input.check()?;
        let workflow = self.api.update_workflow(id, input).await?;
        self.commit(Mutation::Updated(workflow.clone()));
        Ok(workflow)
    }

    pub async fn delete_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        self.api.delete_workflow(id).await?;
        info!(workflow_id = id, "workflow deleted");
        self.commit(Mutation::Deleted(id.to_string()));
        Ok(())
    }

    /// Persist a canvas. Only the detail entry is touched.
    pub async fn save_canvas(
        &self,
        id: &str,
        canvas: &CanvasData,
    ) -> Result<Workflow> {
        canvas.check_integrity()?;
        let workflow = self.api.save_canvas(id, canvas).await?;
        self.commit(Mutation::CanvasSaved(workflow.clone()));
        Ok(workflow)
    }

    /// Trigger a run. The call is never timed out.
    pub async fn execute_workflow(
        &self,
        id: &str,
        mode: Option<ExecutionMode>,
    ) -> Result<WorkflowExecution> {
        let input = ExecuteWorkflow {
            execution_mode: mode,
        };
        let execution = self.api.execute_workflow(id, &input).await?;
        info!(workflow_id = id, execution_id = %execution.id, status = execution.status.as_ref(), "workflow execution triggered");
        self.commit(Mutation::Executed(id.to_string()));
        Ok(execution)
    }

    /// Server-side validation; not cached.
    pub async fn validate_workflow(
        &self,
        id: &str,
    ) -> Result<ValidationReport> {
        self.api.validate_workflow(id).await
    }

    pub async fn instantiate_template(
        &self,
        template_id: &str,
        input: &InstantiateTemplate,
    ) -> Result<Workflow> {
        let workflow = self.api.instantiate_template(template_id, input).await?;
        info!(template_id, workflow_id = %workflow.id, "template instantiated");
        self.commit(Mutation::Instantiated);
        Ok(workflow)
    }

    /// Running/latest projection of whatever execution list is cached.
    pub fn execution_status(
        &self,
        id: &str,
    ) -> ExecutionStatusView {
        let executions: Vec<WorkflowExecution> = self.cache.get(&WorkflowKeys::executions(id)).unwrap_or_default();
        ExecutionStatusView::project(&executions)
    }

    /// Start an execution poller for `id`. Polling stops when the handle drops.
    pub fn watch_executions(
        &self,
        id: &str,
        cadence: PollCadence,
    ) -> PollHandle {
        ExecutionPoller::spawn(self.clone(), id, cadence)
    }

    /// Debounced canvas saver for `id`.
    pub fn autosaver(
        &self,
        id: &str,
    ) -> AutoSaver {
        AutoSaver::spawn(self.clone(), id)
    }

    /// Seed the cache, e.g. with data the caller already holds.
    pub fn prime(
        &self,
        key: QueryKey,
        data: CacheData,
    ) {
        self.cache.set(key, data);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::Mutation;
    use crate::{
        ClientBuilder, FlowsyncError, WorkflowClient,
        api::MemWorkflowApi,
        common::{CacheEffect, CacheEvent},
        keys::WorkflowKeys,
        model::{CanvasData, CreateWorkflow, InstantiateTemplate, NodeType, Position, UpdateWorkflow, Workflow, WorkflowFilter, WorkflowTemplate},
    };

    fn setup() -> (Arc<MemWorkflowApi>, WorkflowClient) {
        let api = Arc::new(MemWorkflowApi::new());
        let client = ClientBuilder::new().api(api.clone()).build().unwrap();
        (api, client)
    }

    fn create(
        name: &str,
        project_id: &str,
    ) -> CreateWorkflow {
        CreateWorkflow {
            name: name.to_string(),
            project_id: project_id.to_string(),
            ..Default::default()
        }
    }

    async fn seed(client: &WorkflowClient) -> Workflow {
        client.create_workflow(&create("Churn interviews", "p1")).await.unwrap()
    }

    #[tokio::test]
    async fn test_effects_table() {
        let (_, client) = setup();
        let w = seed(&client).await;

        assert_eq!(Mutation::Created.effects(), vec![CacheEffect::Invalidate(WorkflowKeys::lists())]);
        assert_eq!(Mutation::Instantiated.effects(), vec![CacheEffect::Invalidate(WorkflowKeys::lists())]);
        assert_eq!(Mutation::Executed(w.id.clone()).effects(), vec![CacheEffect::Invalidate(WorkflowKeys::executions(&w.id))]);
        assert_eq!(
            Mutation::Deleted(w.id.clone()).effects(),
            vec![CacheEffect::Remove(WorkflowKeys::detail(&w.id)), CacheEffect::Invalidate(WorkflowKeys::lists())]
        );

        let saved = Mutation::CanvasSaved(w.clone()).effects();
        assert_eq!(saved.len(), 1);
        assert!(matches!(&saved[0], CacheEffect::Overwrite(key, _) if *key == WorkflowKeys::detail(&w.id)));

        let updated = Mutation::Updated(w.clone()).effects();
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[1], CacheEffect::Invalidate(WorkflowKeys::lists()));
    }

    #[tokio::test]
    async fn test_list_is_served_from_cache() {
        let (api, client) = setup();
        seed(&client).await;
        let filter = WorkflowFilter::project("p1");

        assert_eq!(client.list_workflows(&filter).await.unwrap().len(), 1);
        assert_eq!(client.list_workflows(&filter).await.unwrap().len(), 1);
        assert_eq!(api.calls("list_workflows"), 1);

        // another filter is another key
        client.list_workflows(&WorkflowFilter::default()).await.unwrap();
        assert_eq!(api.calls("list_workflows"), 2);
    }

    #[tokio::test]
    async fn test_create_invalidates_lists() {
        let (api, client) = setup();
        let filter = WorkflowFilter::project("p1");
        assert!(client.list_workflows(&filter).await.unwrap().is_empty());

        seed(&client).await;
        assert!(!client.cache().is_fresh(&WorkflowKeys::list(Some("p1"), false)));
        assert_eq!(client.list_workflows(&filter).await.unwrap().len(), 1);
        assert_eq!(api.calls("list_workflows"), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_locally() {
        let (api, client) = setup();
        let err = client.create_workflow(&create("", "p1")).await.unwrap_err();
        assert!(matches!(err, FlowsyncError::Validation(_)));
        assert_eq!(api.calls("create_workflow"), 0);
    }

    #[tokio::test]
    async fn test_update_overwrites_detail() {
        let (api, client) = setup();
        let w = seed(&client).await;
        client.get_workflow(&w.id).await.unwrap();

        let updated = client
            .update_workflow(
                &w.id,
                &UpdateWorkflow {
                    name: Some("Churn interviews v2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let detail = client.get_workflow(&w.id).await.unwrap();
        assert_eq!(detail.name, "Churn interviews v2");
        assert_eq!(api.calls("get_workflow"), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_detail() {
        let (_, client) = setup();
        let w = seed(&client).await;
        client.get_workflow(&w.id).await.unwrap();
        assert!(client.cache().contains(&WorkflowKeys::detail(&w.id)));

        client.delete_workflow(&w.id).await.unwrap();
        assert!(!client.cache().contains(&WorkflowKeys::detail(&w.id)));
        assert!(matches!(client.get_workflow(&w.id).await, Err(FlowsyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_canvas_leaves_lists_alone() {
        let (api, client) = setup();
        let w = seed(&client).await;
        let filter = WorkflowFilter::project("p1");
        client.list_workflows(&filter).await.unwrap();
        let list_key = WorkflowKeys::list(Some("p1"), false);
        assert!(client.cache().is_fresh(&list_key));

        let mut events = client.cache().subscribe();
        let mut canvas = CanvasData::new();
        canvas.add_node(NodeType::Start, Position::new(0.0, 0.0)).unwrap();
        let saved = client.save_canvas(&w.id, &canvas).await.unwrap();

        assert_eq!(saved.canvas_data.nodes.len(), 1);
        assert!(client.cache().is_fresh(&list_key));
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Updated(WorkflowKeys::detail(&w.id)));
        assert!(events.try_recv().is_err());

        let detail = client.get_workflow(&w.id).await.unwrap();
        assert_eq!(detail.canvas_data, canvas);
        assert_eq!(api.calls("get_workflow"), 0);
        client.list_workflows(&filter).await.unwrap();
        assert_eq!(api.calls("list_workflows"), 1);
    }

    #[tokio::test]
    async fn test_execute_invalidates_executions() {
        let (api, client) = setup();
        let w = seed(&client).await;
        assert!(client.executions(&w.id).await.unwrap().is_empty());
        assert!(!client.execution_status(&w.id).is_running);

        let mut events = client.cache().subscribe();
        let execution = client.execute_workflow(&w.id, None).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Invalidated(WorkflowKeys::executions(&w.id)));

        let list = client.executions(&w.id).await.unwrap();
        assert_eq!(list[0].id, execution.id);
        assert_eq!(api.calls("list_executions"), 2);
        assert_eq!(client.execution_status(&w.id).latest.map(|e| e.id), Some(execution.id));
    }

    #[tokio::test]
    async fn test_templates() {
        let (api, client) = setup();
        api.add_template(WorkflowTemplate {
            id: "t1".to_string(),
            name: "Message testing".to_string(),
            description: None,
            category: None,
            canvas_data: CanvasData::new(),
            tags: vec!["messaging".to_string()],
            usage_count: 0,
        });
        assert_eq!(client.list_templates().await.unwrap().len(), 1);
        client.list_templates().await.unwrap();
        assert_eq!(api.calls("list_templates"), 1);

        let filter = WorkflowFilter::project("p2");
        client.list_workflows(&filter).await.unwrap();
        let w = client
            .instantiate_template(
                "t1",
                &InstantiateTemplate {
                    project_id: "p2".to_string(),
                    workflow_name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(w.name, "Message testing");
        assert_eq!(client.list_workflows(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let (api, client) = setup();
        api.fail_next(FlowsyncError::Api {
            status: 503,
            message: "maintenance".to_string(),
        });
        let err = client.list_templates().await.unwrap_err();
        assert_eq!(
            err,
            FlowsyncError::Api {
                status: 503,
                message: "maintenance".to_string()
            }
        );
        assert!(!client.cache().contains(&WorkflowKeys::templates()));
    }

    #[tokio::test]
    async fn test_validate_workflow() {
        let (_, client) = setup();
        let w = seed(&client).await;
        let report = client.validate_workflow(&w.id).await.unwrap();
        assert!(report.is_valid);
        assert!(!report.warnings.is_empty());
    }
}
