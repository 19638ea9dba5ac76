//! Debounced canvas autosave.
//!
//! Editors hand every canvas change to [`AutoSaver::schedule`]. Snapshots go
//! into a single latest-wins slot, so intake never blocks or fills up, even
//! while a slow save is in flight. A save runs once no new snapshot has
//! arrived for the configured quiet period, and only the latest snapshot is
//! sent. Saves go through [`WorkflowClient::save_canvas`], which writes the
//! detail entry and leaves workflow lists alone.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use crate::{
    FlowsyncError, Result, WorkflowClient,
    common::{BroadcastQueue, Queue, Shutdown},
    model::CanvasData,
};

const COMMAND_QUEUE_SIZE: usize = 16;
const EVENT_QUEUE_SIZE: usize = 32;

type SnapshotSlot = watch::Sender<Option<CanvasData>>;

/// Outcome of one save.
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveEvent {
    Saved {
        workflow_id: String,
        version: u32,
    },
    Failed {
        workflow_id: String,
        error: FlowsyncError,
    },
}

enum AutosaveCommand {
    Flush(oneshot::Sender<Result<()>>),
}

/// Per-workflow debounced saver. Dropping it stops the timer; a snapshot
/// still waiting is saved before the task exits.
pub struct AutoSaver {
    workflow_id: String,
    snapshots: Arc<SnapshotSlot>,
    commands: Arc<Queue<AutosaveCommand>>,
    events: Arc<BroadcastQueue<AutosaveEvent>>,
    shutdown: Arc<Shutdown>,
    join: Option<JoinHandle<()>>,
}

impl AutoSaver {
    pub(crate) fn spawn(
        client: WorkflowClient,
        workflow_id: &str,
    ) -> Self {
        let (snapshots, receiver) = watch::channel(None);
        let snapshots = Arc::new(snapshots);
        let commands = Queue::new(COMMAND_QUEUE_SIZE);
        let events = BroadcastQueue::new(EVENT_QUEUE_SIZE);
        let shutdown = Arc::new(Shutdown::new());

        let task = SaveLoop {
            quiet: client.config().autosave.debounce(),
            client: client.clone(),
            workflow_id: workflow_id.to_string(),
            _slot: snapshots.clone(),
            snapshots: receiver,
            commands: commands.clone(),
            events: events.clone(),
            shutdown: shutdown.clone(),
        };
        let join = client.runtime().spawn(task.run());

        Self {
            workflow_id: workflow_id.to_string(),
            snapshots,
            commands,
            events,
            shutdown,
            join: Some(join),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Replace the pending snapshot, restarting the quiet period.
    pub fn schedule(
        &self,
        canvas: CanvasData,
    ) {
        self.snapshots.send_replace(Some(canvas));
    }

    /// Save the pending snapshot now, if there is one.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(AutosaveCommand::Flush(tx))?;
        rx.await.map_err(|_| FlowsyncError::Runtime("autosave task stopped".to_string()))?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.events.subscribe()
    }

    /// Stop the task after saving any pending snapshot.
    pub async fn close(mut self) {
        self.shutdown.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

struct SaveLoop {
    client: WorkflowClient,
    workflow_id: String,
    quiet: Duration,
    /// keeps the slot open after the saver is dropped
    _slot: Arc<SnapshotSlot>,
    snapshots: watch::Receiver<Option<CanvasData>>,
    commands: Arc<Queue<AutosaveCommand>>,
    events: Arc<BroadcastQueue<AutosaveEvent>>,
    shutdown: Arc<Shutdown>,
}

impl SaveLoop {
    async fn run(mut self) {
        let mut pending: Option<CanvasData> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    pending = self.snapshots.borrow_and_update().clone();
                    deadline = Some(Instant::now() + self.quiet);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(canvas) = self.unseen_snapshot() {
                        // an edit landed together with the timer; wait another quiet period
                        pending = Some(canvas);
                        deadline = Some(Instant::now() + self.quiet);
                        continue;
                    }
                    deadline = None;
                    if let Some(canvas) = pending.take() {
                        let _ = self.save(canvas).await;
                    }
                }
                Some(command) = self.commands.next_async() => match command {
                    AutosaveCommand::Flush(reply) => {
                        deadline = None;
                        if let Some(canvas) = self.unseen_snapshot() {
                            pending = Some(canvas);
                        }
                        let result = match pending.take() {
                            Some(canvas) => self.save(canvas).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                },
            }
        }

        if let Some(canvas) = self.unseen_snapshot() {
            pending = Some(canvas);
        }
        if let Some(canvas) = pending.take() {
            let _ = self.save(canvas).await;
        }
        debug!(workflow_id = %self.workflow_id, "autosave::stopped");
    }

    /// The latest snapshot, if one arrived since the last look.
    fn unseen_snapshot(&mut self) -> Option<CanvasData> {
        if self.snapshots.has_changed().unwrap_or(false) { self.snapshots.borrow_and_update().clone() } else { None }
    }

    async fn save(
        &self,
        canvas: CanvasData,
    ) -> Result<()> {
        match self.client.save_canvas(&self.workflow_id, &canvas).await {
            Ok(workflow) => {
                debug!(workflow_id = %self.workflow_id, version = workflow.version, "autosave::saved");
                let _ = self.events.send(AutosaveEvent::Saved {
                    workflow_id: self.workflow_id.clone(),
                    version: workflow.version,
                });
                Ok(())
            }
            Err(err) => {
                warn!(workflow_id = %self.workflow_id, error = %err, "autosave::failed");
                let _ = self.events.send(AutosaveEvent::Failed {
                    workflow_id: self.workflow_id.clone(),
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::AutosaveEvent;
    use crate::{
        ClientBuilder, FlowsyncError, WorkflowClient,
        api::{MemWorkflowApi, WorkflowApi},
        keys::WorkflowKeys,
        model::{CanvasData, CreateWorkflow, NodeType, Position, Workflow, WorkflowFilter},
    };

    async fn setup() -> (Arc<MemWorkflowApi>, WorkflowClient, Workflow) {
        let api = Arc::new(MemWorkflowApi::new());
        let client = ClientBuilder::new().api(api.clone()).build().unwrap();
        let workflow = client
            .create_workflow(&CreateWorkflow {
                name: "Feature prioritisation".to_string(),
                project_id: "p1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (api, client, workflow)
    }

    fn canvas(nodes: usize) -> CanvasData {
        let mut canvas = CanvasData::new();
        for i in 0..nodes {
            canvas.add_node(NodeType::Delay, Position::new(i as f64 * 120.0, 0.0)).unwrap();
        }
        canvas
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_saves_last_snapshot() {
        let (api, client, workflow) = setup().await;
        let saver = client.autosaver(&workflow.id);
        let mut events = saver.subscribe();

        for n in 1..=3 {
            saver.schedule(canvas(n));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        // last snapshot at 600ms, quiet period 1000ms
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(api.calls("save_canvas"), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(api.calls("save_canvas"), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            AutosaveEvent::Saved {
                workflow_id: workflow.id.clone(),
                version: 2,
            }
        );
        assert_eq!(client.get_workflow(&workflow.id).await.unwrap().canvas_data.nodes.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_save_keeps_latest_snapshot() {
        let (api, client, workflow) = setup().await;
        api.set_latency("save_canvas", Duration::from_secs(5));
        let saver = client.autosaver(&workflow.id);

        saver.schedule(canvas(1));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        // first save is in flight until 6s
        assert_eq!(api.calls("save_canvas"), 1);

        for n in 2..=80 {
            saver.schedule(canvas(n));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.calls("save_canvas"), 2);
        let saved = api.get_workflow(&workflow.id).await.unwrap();
        assert_eq!(saved.canvas_data.nodes.len(), 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_picks_up_unseen_snapshot() {
        let (api, client, workflow) = setup().await;
        let saver = client.autosaver(&workflow.id);
        saver.schedule(canvas(1));
        saver.schedule(canvas(4));
        saver.flush().await.unwrap();
        assert_eq!(api.calls("save_canvas"), 1);
        assert_eq!(api.get_workflow(&workflow.id).await.unwrap().canvas_data.nodes.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_does_not_touch_lists() {
        let (api, client, workflow) = setup().await;
        let filter = WorkflowFilter::project("p1");
        client.list_workflows(&filter).await.unwrap();

        let saver = client.autosaver(&workflow.id);
        saver.schedule(canvas(1));
        saver.flush().await.unwrap();

        assert!(client.cache().contains(&WorkflowKeys::detail(&workflow.id)));
        client.list_workflows(&filter).await.unwrap();
        assert_eq!(api.calls("list_workflows"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush() {
        let (api, client, workflow) = setup().await;
        let saver = client.autosaver(&workflow.id);
        saver.flush().await.unwrap();
        assert_eq!(api.calls("save_canvas"), 0);

        saver.schedule(canvas(2));
        saver.flush().await.unwrap();
        assert_eq!(api.calls("save_canvas"), 1);

        // the timer was cancelled by the flush
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.calls("save_canvas"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_reported() {
        let (api, client, workflow) = setup().await;
        let saver = client.autosaver(&workflow.id);
        let mut events = saver.subscribe();

        api.fail_next(FlowsyncError::Network("offline".to_string()));
        saver.schedule(canvas(1));
        assert_eq!(saver.flush().await.unwrap_err(), FlowsyncError::Network("offline".to_string()));
        assert!(matches!(events.recv().await.unwrap(), AutosaveEvent::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_saves_pending_snapshot() {
        let (api, client, workflow) = setup().await;
        let saver = client.autosaver(&workflow.id);
        saver.schedule(canvas(1));
        saver.close().await;
        assert_eq!(api.calls("save_canvas"), 1);
    }
}
