//! The common queue contract implemented by both backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use workbench_core::AppResult;
use workbench_core::error::AppError;
use workbench_entity::job::filter::JobFilter;
use workbench_entity::job::model::{Job, JobCreateParams};

use crate::events::JobEvent;
use crate::handler::JobHandler;

/// Which backend a queue instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    /// In-process, non-persistent backend.
    Memory,
    /// Redis-backed durable backend.
    Redis,
}

impl QueueBackendKind {
    /// Return the backend kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for QueueBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue statistics, computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Which backend produced these stats.
    pub backend: QueueBackendKind,
    /// Jobs waiting to be claimed (including delayed retries).
    pub pending: i64,
    /// Jobs currently executing.
    pub running: i64,
    /// Successfully completed jobs.
    pub completed: i64,
    /// Failed jobs (dead-lettered jobs included).
    pub failed: i64,
    /// Cancelled jobs.
    pub cancelled: i64,
    /// Jobs parked in the dead-letter list.
    pub dead_letter: i64,
}

/// The job queue contract shared by the memory and Redis backends.
///
/// Producers enqueue through [`add_job`](JobQueue::add_job), executors are
/// attached through [`register_handler`](JobQueue::register_handler), and
/// observers follow lifecycle events through [`subscribe`](JobQueue::subscribe).
#[async_trait]
pub trait JobQueue: Send + Sync + std::fmt::Debug + 'static {
    /// Enqueue a new job. The returned job is in `Pending` state; on the
    /// durable backend this resolves only after the job record has been
    /// persisted.
    async fn add_job(&self, params: JobCreateParams) -> AppResult<Job>;

    /// Fetch a job snapshot by id.
    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// List jobs newest-first, filtered and capped.
    async fn get_jobs(&self, filter: &JobFilter) -> AppResult<Vec<Job>>;

    /// Cancel a job. Pending jobs are removed from eligibility and marked
    /// cancelled; running jobs get an advisory cancellation flag their
    /// handler may poll. Returns `false` for jobs already in a terminal
    /// state (and for unknown ids).
    async fn cancel_job(&self, id: Uuid) -> AppResult<bool>;

    /// Aggregate queue statistics.
    async fn stats(&self) -> AppResult<QueueStats>;

    /// Register a handler for its job type. Last write wins. Handlers never
    /// carry over between queue instances; re-register after a factory
    /// reset.
    fn register_handler(&self, handler: Arc<dyn JobHandler>);

    /// Subscribe to job lifecycle events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;

    /// Start the scheduler loop (and the durable backend's housekeeping
    /// loops). Idempotent.
    async fn start(&self) -> AppResult<()>;

    /// Stop claiming new jobs and wait for in-flight jobs to finish
    /// (bounded graceful drain). Jobs already enqueued stay put.
    async fn stop(&self) -> AppResult<()>;

    /// Which backend this instance is.
    fn backend_kind(&self) -> QueueBackendKind;

    /// Check that the backing store is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Remove terminal jobs older than the cutoff. Returns the number of
    /// jobs removed.
    async fn cleanup_jobs(&self, older_than: Duration) -> AppResult<u64>;

    /// List jobs parked in the dead-letter list, newest first.
    ///
    /// Only the durable backend keeps a dead-letter list.
    async fn dead_letter_jobs(&self, limit: usize) -> AppResult<Vec<Job>> {
        let _ = limit;
        Err(AppError::not_implemented(
            "dead-letter jobs are only available on the redis backend",
        ))
    }

    /// Move a dead-letter job back to pending with a fresh attempt budget.
    /// Returns `false` if the id is not in the dead-letter list.
    async fn requeue_dead_letter(&self, id: Uuid) -> AppResult<bool> {
        let _ = id;
        Err(AppError::not_implemented(
            "dead-letter requeue is only available on the redis backend",
        ))
    }

    /// Wait until the job reaches a terminal state or the timeout elapses.
    ///
    /// Bounds only the waiter's patience: on timeout the job itself keeps
    /// running and the error has kind `Timeout`. Subscribes before checking
    /// the current state so a completion between the two cannot be missed.
    async fn wait_for_job(&self, id: Uuid, timeout: Duration) -> AppResult<Job> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut events = self.subscribe();

        match self.get_job(id).await? {
            Some(job) if job.status.is_terminal() => return Ok(job),
            Some(_) => {}
            None => return Err(AppError::not_found(format!("Job {id} not found"))),
        }

        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) => {
                    let job = event.job();
                    if job.id == id && job.status.is_terminal() {
                        return Ok(job.clone());
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Event subscriber lagged while waiting for job");
                    if let Some(job) = self.get_job(id).await? {
                        if job.status.is_terminal() {
                            return Ok(job);
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(AppError::queue(format!(
                        "Event channel closed while waiting for job {id}"
                    )));
                }
                Err(_) => {
                    return Err(AppError::timeout(format!(
                        "Timed out after {}ms waiting for job {id}",
                        timeout.as_millis()
                    )));
                }
            }
        }
    }
}
