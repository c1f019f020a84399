//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use workbench_core::AppResult;
use workbench_core::error::AppError;

use super::kind::JobType;
use super::status::{JobPriority, JobStatus};

/// A background job.
///
/// Constructed exclusively by the queue's `add_job` operation; handlers own
/// only the `payload` and `result` contents, never the control fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier. Never changes and is never reused.
    pub id: Uuid,
    /// Job type, dispatched to the matching registered handler.
    pub job_type: JobType,
    /// Job priority.
    pub priority: JobPriority,
    /// Job-specific payload (JSON). Opaque to the queue.
    pub payload: serde_json::Value,
    /// Result data on completion (JSON).
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error_message: Option<String>,
    /// Current job status.
    pub status: JobStatus,
    /// Completion percentage, 0-100. Written only through the running
    /// handler's progress callback.
    pub progress: u8,
    /// Number of execution attempts (incremented at claim time).
    pub attempts: i32,
    /// Maximum allowed attempts.
    pub max_attempts: i32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Check if the job has retry attempts remaining.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Parameters for creating a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreateParams {
    /// Job type.
    pub job_type: JobType,
    /// Priority level.
    pub priority: JobPriority,
    /// Job payload as JSON. Must be an object.
    pub payload: serde_json::Value,
    /// Maximum retry attempts; `None` uses the queue's configured default.
    pub max_attempts: Option<i32>,
}

impl JobCreateParams {
    /// Create params with medium priority and the default attempt budget.
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            job_type,
            priority: JobPriority::Medium,
            payload,
            max_attempts: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the maximum attempts.
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Validate the payload shape. Job type validity is guaranteed by the
    /// closed [`JobType`] enum; only the payload needs a runtime check.
    pub fn validate(&self) -> AppResult<()> {
        if !self.payload.is_object() {
            return Err(AppError::validation("Job payload must be a JSON object"));
        }
        if let Some(max) = self.max_attempts {
            if max < 1 {
                return Err(AppError::validation("max_attempts must be at least 1"));
            }
        }
        Ok(())
    }
}
