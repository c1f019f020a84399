//! Job lifecycle events and the publish-subscribe bus they travel on.
//!
//! Consumers (a logging layer, an HTTP layer pushing to WebSocket/SSE)
//! subscribe to the bus; the queue knows nothing about any transport.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use workbench_entity::job::model::Job;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A job lifecycle event, carrying the job snapshot at the time it fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "job", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was enqueued.
    Added(Job),
    /// A worker claimed the job and began executing it.
    Started(Job),
    /// The running handler reported progress.
    Progress(Job),
    /// The handler returned successfully.
    Completed(Job),
    /// The handler failed (terminally, on this backend).
    Failed(Job),
    /// The job was cancelled.
    Cancelled(Job),
    /// The job exhausted its retry budget and moved to the dead-letter list.
    DeadLettered(Job),
    /// A dead-letter job was re-enqueued.
    Requeued(Job),
}

impl JobEvent {
    /// The job snapshot this event carries.
    pub fn job(&self) -> &Job {
        match self {
            Self::Added(job)
            | Self::Started(job)
            | Self::Progress(job)
            | Self::Completed(job)
            | Self::Failed(job)
            | Self::Cancelled(job)
            | Self::DeadLettered(job)
            | Self::Requeued(job) => job,
        }
    }

    /// The event name as a lowercase string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Started(_) => "started",
            Self::Progress(_) => "progress",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
            Self::DeadLettered(_) => "dead_lettered",
            Self::Requeued(_) => "requeued",
        }
    }
}

/// Broadcast bus for job lifecycle events.
#[derive(Debug, Clone)]
pub struct JobEventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new()
    }
}
