//! # Flowsync
//!
//! Flowsync is an async client for visual research workflows: canvases of
//! typed nodes that a remote backend runs.
//!
//! ## Core Features
//!
//! - **Scoped Query Cache**: Hierarchical keys, prefix invalidation and request de-duplication
//! - **Adaptive Polling**: Execution lists are polled only while something is running
//! - **Debounced Autosave**: Canvas edits are saved after a quiet period without refetching lists
//! - **Pluggable Transport**: A REST backend over `reqwest`, or an in-memory one for tests
//! - **Canvas Model**: Typed node configs checked against JSON schemas, graph validation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowsync::{ClientBuilder, Config, PollCadence, PollState, WorkflowFilter};
//!
//! let config = Config::create("flowsync.toml")?;
//! let client = ClientBuilder::new().config(config).build()?;
//!
//! let workflows = client.list_workflows(&WorkflowFilter::project("p1")).await?;
//! let execution = client.execute_workflow(&workflows[0].id, None).await?;
//!
//! // polls every 2s while the run is in progress, then goes idle
//! let mut poller = client.watch_executions(&workflows[0].id, PollCadence::Canvas);
//! poller.wait_for(PollState::Idle).await?;
//! let status = client.execution_status(&workflows[0].id);
//! ```

mod autosave;
mod builder;
mod client;
mod config;
mod error;
mod status;
mod utils;

pub mod api;
pub mod common;
pub mod keys;
pub mod model;
pub mod poller;

use std::sync::{Arc, RwLock};

pub use autosave::{AutoSaver, AutosaveEvent};
pub use builder::ClientBuilder;
pub use client::{Mutation, WorkflowClient};
pub use config::{ApiConfig, ApiType, AutosaveConfig, CacheConfig, Config, HttpConfig, PollConfig};
pub use error::FlowsyncError;
pub use keys::{QueryKey, WorkflowKeys};
pub use model::*;
pub use poller::{PollCadence, PollHandle, PollState};
pub use status::{ExecutionStatusView, is_running, latest};

/// Result type alias for Flowsync operations.
pub type Result<T> = std::result::Result<T, FlowsyncError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
