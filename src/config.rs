use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{FlowsyncError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// api transport config
    #[serde(default)]
    pub api: ApiConfig,
    /// query cache config
    #[serde(default)]
    pub cache: CacheConfig,
    /// execution polling config
    #[serde(default)]
    pub poll: PollConfig,
    /// canvas autosave config
    #[serde(default)]
    pub autosave: AutosaveConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// transport type
    #[serde(default)]
    pub api_type: ApiType,
    /// http config, required when `api_type` is `http`
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    #[default]
    Http,
    Mem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// backend base url, eg. `http://localhost:8000/api/v1`
    pub base_url: String,
    /// bearer token sent with every request
    pub token: Option<String>,
    /// per-request timeout in milliseconds, never applied to execution triggers
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// max number of cached entries
    pub capacity: u64,
    /// how long a fetched entry counts as fresh, in milliseconds
    pub stale_time_ms: u64,
    /// unused entries are evicted after this idle period, in milliseconds
    pub gc_time_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// interval used by canvas execution views, in milliseconds
    pub canvas_interval_ms: u64,
    /// interval used by dashboard views, in milliseconds
    pub dashboard_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// quiet period before a canvas snapshot is saved, in milliseconds
    pub debounce_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            stale_time_ms: 30_000,
            gc_time_ms: 300_000,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            canvas_interval_ms: 2_000,
            dashboard_interval_ms: 5_000,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| FlowsyncError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.api.api_type == ApiType::Http && self.api.http.is_none() {
            return Err(FlowsyncError::Config("[api.http] is required when api_type is http".to_string()));
        }
        if self.poll.canvas_interval_ms == 0 || self.poll.dashboard_interval_ms == 0 {
            return Err(FlowsyncError::Config("poll intervals must be greater than zero".to_string()));
        }
        Ok(())
    }
}
