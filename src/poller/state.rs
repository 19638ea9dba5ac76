//! The polling state machine, kept free of timers.

use std::time::Duration;

use crate::{PollConfig, model::WorkflowExecution, status};

/// Whether a workflow's execution list is being polled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PollState {
    /// nothing running, no fetch scheduled
    #[default]
    Idle,
    /// something running, next fetch scheduled
    Active,
}

/// Which view a poll loop serves; each has its own interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PollCadence {
    Canvas,
    Dashboard,
}

impl PollCadence {
    pub fn interval(
        self,
        config: &PollConfig,
    ) -> Duration {
        match self {
            PollCadence::Canvas => Duration::from_millis(config.canvas_interval_ms),
            PollCadence::Dashboard => Duration::from_millis(config.dashboard_interval_ms),
        }
    }
}

/// Outcome of evaluating one fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDecision {
    pub state: PollState,
    /// delay before the next fetch, `None` when idle
    pub next_fetch: Option<Duration>,
}

impl PollDecision {
    pub fn should_schedule(&self) -> bool {
        self.next_fetch.is_some()
    }
}

/// Evaluated after every fetch, scheduled or manual.
pub fn transition(
    executions: &[WorkflowExecution],
    interval: Duration,
) -> PollDecision {
    if status::is_running(executions) {
        PollDecision {
            state: PollState::Active,
            next_fetch: Some(interval),
        }
    } else {
        PollDecision {
            state: PollState::Idle,
            next_fetch: None,
        }
    }
}
