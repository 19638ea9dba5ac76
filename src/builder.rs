use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    ApiType, Config, FlowsyncError, Result, WorkflowClient,
    api::{HttpWorkflowApi, MemWorkflowApi, WorkflowApi},
};

/// Assembles a [`WorkflowClient`].
///
/// Without an explicit transport the one named by `config.api.api_type` is
/// built. Background tasks run on the given runtime handle, or on the
/// current one.
#[derive(Default)]
pub struct ClientBuilder {
    config: Config,
    api: Option<Arc<dyn WorkflowApi>>,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn api(
        mut self,
        api: Arc<dyn WorkflowApi>,
    ) -> Self {
        self.api = Some(api);
        self
    }

    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(&self) -> Result<WorkflowClient> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|e| FlowsyncError::Runtime(e.to_string()))?,
        };

        let api: Arc<dyn WorkflowApi> = match &self.api {
            Some(api) => api.clone(),
            None => match self.config.api.api_type {
                ApiType::Mem => Arc::new(MemWorkflowApi::new()),
                ApiType::Http => {
                    let http = self.config.api.http.as_ref().ok_or(FlowsyncError::Config("[api.http] is required when api_type is http".to_string()))?;
                    Arc::new(HttpWorkflowApi::new(http)?)
                }
            },
        };

        Ok(WorkflowClient::new(api, self.config.clone(), runtime))
    }
}
