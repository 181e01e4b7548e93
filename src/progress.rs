//! Progress reporting: step tracking and the engine event bus
//!
//! The extractor and crawler publish [`EngineEvent`]s through an [`EventBus`]
//! backed by a `tokio::sync::broadcast` channel. Any number of subscribers (a UI,
//! a logger, a test harness) can listen; with no subscriber, events are dropped.
//!
//! Reporting never influences control flow. A [`StepTracker`] only records and
//! publishes what the calling extraction or crawl logic decided.

use crate::crawler::{CrawlPageResult, CrawlRunResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Status of one logical phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One logical phase of an extraction or crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Events emitted to collaborators
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A step changed status
    Step {
        step_id: String,
        status: StepStatus,
        detail: Option<String>,
    },
    /// Crawl progress after a page was visited
    Progress {
        percent: f64,
        message: String,
        partial_result: Option<Box<CrawlPageResult>>,
    },
    /// A crawl run reached a terminal state
    Completed { run: Box<CrawlRunResult> },
    /// A non-fatal error worth surfacing
    Error { message: String },
}

/// Broadcast channel carrying [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; silently dropped when nobody listens
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(EngineEvent::Error {
            message: message.into(),
        });
    }
}

/// Ordered, forward-only step state machine for one logical operation
///
/// Steps are declared up front and start `Pending`. Transitions only move
/// forward (`Pending -> InProgress -> Completed | Failed`); a backwards or
/// repeated terminal transition is ignored. Completing a step moves the next
/// declared `Pending` step to `InProgress`. Failing a step affects that step only.
#[derive(Debug)]
pub struct StepTracker {
    steps: Vec<ProgressStep>,
    bus: EventBus,
}

impl StepTracker {
    /// Declares the steps `(id, label)` in order, all `Pending`
    pub fn new(bus: EventBus, steps: &[(&str, &str)]) -> Self {
        let steps = steps
            .iter()
            .map(|(id, label)| ProgressStep {
                id: id.to_string(),
                label: label.to_string(),
                status: StepStatus::Pending,
                detail: None,
                started_at: None,
                ended_at: None,
            })
            .collect();
        Self { steps, bus }
    }

    pub fn steps(&self) -> &[ProgressStep] {
        &self.steps
    }

    pub fn status(&self, id: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.id == id).map(|s| s.status)
    }

    /// Moves a step to `InProgress`, or refreshes its detail if already running
    pub fn start(&mut self, id: &str, detail: Option<String>) -> bool {
        self.transition(id, StepStatus::InProgress, detail)
    }

    /// Completes a step and starts the next pending one
    pub fn complete(&mut self, id: &str, detail: Option<String>) -> bool {
        if !self.transition(id, StepStatus::Completed, detail) {
            return false;
        }
        let next = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .and_then(|i| self.steps.get(i + 1))
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.id.clone());
        if let Some(next) = next {
            self.transition(&next, StepStatus::InProgress, None);
        }
        true
    }

    pub fn fail(&mut self, id: &str, detail: Option<String>) -> bool {
        self.transition(id, StepStatus::Failed, detail)
    }

    /// Closes every open step before `id` as skipped, then runs `id` to completion
    ///
    /// Steps after `id` are left untouched. Leaves no earlier step `InProgress`.
    pub fn finish_at(&mut self, id: &str, detail: Option<String>) -> bool {
        let Some(end) = self.steps.iter().position(|s| s.id == id) else {
            tracing::debug!("Unknown step '{}'", id);
            return false;
        };
        let open: Vec<String> = self.steps[..end]
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.id.clone())
            .collect();
        for step in open {
            self.transition(&step, StepStatus::Completed, Some("skipped".to_string()));
        }
        self.transition(id, StepStatus::InProgress, None);
        self.transition(id, StepStatus::Completed, detail)
    }

    /// Fails every step currently `InProgress`
    pub fn fail_in_progress(&mut self, detail: &str) {
        let running: Vec<String> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .map(|s| s.id.clone())
            .collect();
        for id in running {
            self.fail(&id, Some(detail.to_string()));
        }
    }

    fn transition(&mut self, id: &str, to: StepStatus, detail: Option<String>) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            tracing::debug!("Unknown step '{}'", id);
            return false;
        };

        let same_running = step.status == StepStatus::InProgress && to == StepStatus::InProgress;
        if !same_running && to.rank() <= step.status.rank() {
            tracing::trace!(
                "Ignoring step transition {} {:?} -> {:?}",
                id,
                step.status,
                to
            );
            return false;
        }

        let now = Utc::now();
        if step.started_at.is_none() {
            step.started_at = Some(now);
        }
        if to.is_terminal() {
            step.ended_at = Some(now);
        }
        step.status = to;
        if detail.is_some() {
            step.detail = detail.clone();
        }

        self.bus.publish(EngineEvent::Step {
            step_id: id.to_string(),
            status: to,
            detail,
        });
        true
    }
}
