//! Job handler contract and the execution context passed to handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use workbench_core::AppResult;
use workbench_core::error::AppError;
use workbench_entity::job::kind::JobType;
use workbench_entity::job::model::Job;

/// Trait for job handler implementations.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// Get the job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    ///
    /// Report progress and poll for cancellation through `ctx`. Return a
    /// result value on success, or an error classifying the failure.
    async fn execute(
        &self,
        job: &Job,
        ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure — do not retry.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure — may retry.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// The handler observed the cancellation flag and stopped early.
    #[error("Job cancelled by request")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Backend-side receiver for progress updates made by a running handler.
///
/// Each backend persists the new percentage to its store and publishes a
/// progress event.
#[async_trait]
pub trait ProgressSink: Send + Sync + std::fmt::Debug {
    /// Record a new progress percentage for the given job.
    async fn update(&self, job_id: Uuid, percent: u8) -> AppResult<()>;
}

/// Execution context handed to a running handler.
///
/// Carries the progress callback and the advisory cancellation flag.
/// Cancellation is cooperative: the queue never interrupts a handler, it
/// only sets the flag for the handler to poll.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: Uuid,
    cancelled: Arc<AtomicBool>,
    sink: Arc<dyn ProgressSink>,
}

impl JobContext {
    /// Create a context for one job execution.
    pub fn new(job_id: Uuid, cancelled: Arc<AtomicBool>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            cancelled,
            sink,
        }
    }

    /// The id of the job being executed.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Report progress as a percentage. Values above 100 are clamped.
    pub async fn update_progress(&self, percent: u8) -> AppResult<()> {
        self.sink.update(self.job_id, percent.min(100)).await
    }

    /// Check whether cancellation has been requested for this job.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return `Err(JobExecutionError::Cancelled)` if cancellation has been
    /// requested, for use as a `?` checkpoint inside handlers.
    pub fn checkpoint(&self) -> Result<(), JobExecutionError> {
        if self.is_cancelled() {
            Err(JobExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}
