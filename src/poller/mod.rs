//! Adaptive execution polling.
//!
//! A poller watches one workflow's execution list. While any execution is
//! running it re-fetches on a fixed cadence; once nothing is running it stops
//! scheduling and waits for a wake-up:
//! - a manual [`PollHandle::refresh`]
//! - an invalidation of the workflow's executions key, e.g. after a trigger
//!
//! Dropping the [`PollHandle`] cancels the loop and any pending timer.

mod state;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, trace, warn};

use crate::{
    FlowsyncError, Result, WorkflowClient,
    common::{CacheEvent, Queue, Shutdown},
    keys::{QueryKey, WorkflowKeys},
};

pub use state::{PollCadence, PollDecision, PollState, transition};

const COMMAND_QUEUE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollCommand {
    Refresh,
}

/// Spawns poll loops on the client's runtime.
pub struct ExecutionPoller;

impl ExecutionPoller {
    /// Start polling `workflow_id`. The first fetch runs immediately.
    pub fn spawn(
        client: WorkflowClient,
        workflow_id: &str,
        cadence: PollCadence,
    ) -> PollHandle {
        let interval = cadence.interval(&client.config().poll);
        let key = WorkflowKeys::executions(workflow_id);
        let (state_tx, state_rx) = watch::channel(PollState::Idle);
        let commands = Queue::new(COMMAND_QUEUE_SIZE);
        let shutdown = Arc::new(Shutdown::new());

        let poll_loop = PollLoop {
            client: client.clone(),
            workflow_id: workflow_id.to_string(),
            key,
            interval,
            state: state_tx,
            commands: commands.clone(),
            shutdown: shutdown.clone(),
        };
        // subscribe before spawning so no invalidation is missed in between
        let events = client.cache().subscribe();
        debug!(workflow_id, cadence = cadence.as_ref(), ?interval, "poller::spawn");
        let join = client.runtime().spawn(poll_loop.run(events));

        PollHandle {
            workflow_id: workflow_id.to_string(),
            state: state_rx,
            commands,
            shutdown,
            join: Some(join),
        }
    }
}

struct PollLoop {
    client: WorkflowClient,
    workflow_id: String,
    key: QueryKey,
    interval: Duration,
    state: watch::Sender<PollState>,
    commands: Arc<Queue<PollCommand>>,
    shutdown: Arc<Shutdown>,
}

impl PollLoop {
    async fn run(
        self,
        mut events: tokio::sync::broadcast::Receiver<CacheEvent>,
    ) {
        let mut deadline: Option<Instant> = None;
        let mut fetch_now = true;

        loop {
            if fetch_now {
                fetch_now = false;
                let result = tokio::select! {
                    _ = self.shutdown.wait() => break,
                    result = self.client.refresh_executions(&self.workflow_id) => result,
                };
                match result {
                    Ok(executions) => {
                        let decision = transition(&executions, self.interval);
                        deadline = decision.next_fetch.map(|delay| Instant::now() + delay);
                        trace!(workflow_id = %self.workflow_id, state = decision.state.as_ref(), "poller::fetched");
                        self.state.send_if_modified(|state| {
                            let changed = *state != decision.state;
                            *state = decision.state;
                            changed
                        });
                    }
                    Err(FlowsyncError::NotFound(message)) => {
                        // the workflow is gone; nothing left to watch until a wake-up
                        warn!(workflow_id = %self.workflow_id, %message, "poller::workflow not found");
                        deadline = None;
                        self.state.send_if_modified(|state| {
                            let changed = *state != PollState::Idle;
                            *state = PollState::Idle;
                            changed
                        });
                    }
                    Err(err) => {
                        // keep the previous decision; an active poller retries on its cadence
                        warn!(workflow_id = %self.workflow_id, error = %err, "poller::fetch failed");
                        if deadline.is_some() {
                            deadline = Some(Instant::now() + self.interval);
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    fetch_now = true;
                }
                Some(command) = self.commands.next_async() => match command {
                    PollCommand::Refresh => fetch_now = true,
                },
                event = events.recv() => match event {
                    Ok(CacheEvent::Invalidated(scope)) if scope.is_prefix_of(&self.key) => {
                        trace!(workflow_id = %self.workflow_id, %scope, "poller::woken by invalidation");
                        fetch_now = true;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => fetch_now = true,
                    Err(RecvError::Closed) => break,
                },
            }
        }

        debug!(workflow_id = %self.workflow_id, "poller::stopped");
    }
}

/// Owner of a running poll loop. Dropping it stops the loop.
pub struct PollHandle {
    workflow_id: String,
    state: watch::Receiver<PollState>,
    commands: Arc<Queue<PollCommand>>,
    shutdown: Arc<Shutdown>,
    join: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// state after the most recent successful fetch
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Fetch now, whatever the current state.
    pub fn refresh(&self) -> Result<()> {
        self.commands.send(PollCommand::Refresh)
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Result<PollState> {
        self.state.changed().await.map_err(|_| FlowsyncError::Poller("poller stopped".to_string()))?;
        Ok(*self.state.borrow_and_update())
    }

    /// Wait until the poller reaches `state`.
    pub async fn wait_for(
        &mut self,
        state: PollState,
    ) -> Result<()> {
        self.state.wait_for(|s| *s == state).await.map_err(|_| FlowsyncError::Poller("poller stopped".to_string()))?;
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.shutdown.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}
