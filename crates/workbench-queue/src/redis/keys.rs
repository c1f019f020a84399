//! Redis key builders and scoring for the queue's data structures.
//!
//! Centralising key construction prevents typos and makes it easy to find
//! every key the queue uses. Layout:
//!
//! - `{prefix}job:{id}` — JSON job record
//! - `{prefix}pending` — sorted set of claimable job ids, scored so that
//!   `ZPOPMIN` yields the highest-priority, oldest job
//! - `{prefix}processing` — sorted set of claimed job ids scored by lease
//!   expiry (epoch milliseconds)
//! - `{prefix}delayed` — sorted set of retry-scheduled job ids scored by
//!   the time they become claimable again
//! - `{prefix}dead` — sorted set of dead-lettered job ids scored by when
//!   they were parked
//! - `{prefix}index` — list of all job ids, newest first
//! - `{prefix}status:{status}` — set of job ids per terminal status

use chrono::{DateTime, Utc};
use uuid::Uuid;

use workbench_entity::job::status::{JobPriority, JobStatus};

/// Width of one priority band in the pending-set score space.
///
/// Scores are `created_at_ms + (4 - priority) * band`, so each band holds
/// roughly 31 years of millisecond timestamps without overlapping the next.
const PRIORITY_BAND_MS: i64 = 1_000_000_000_000;

/// Key builder carrying the configured prefix.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    /// Create a key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key for a job record.
    pub fn job(&self, id: Uuid) -> String {
        format!("{}job:{id}", self.prefix)
    }

    /// The pending sorted set.
    pub fn pending(&self) -> String {
        format!("{}pending", self.prefix)
    }

    /// The processing (leased) sorted set.
    pub fn processing(&self) -> String {
        format!("{}processing", self.prefix)
    }

    /// The delayed-retry sorted set.
    pub fn delayed(&self) -> String {
        format!("{}delayed", self.prefix)
    }

    /// The dead-letter sorted set.
    pub fn dead_letter(&self) -> String {
        format!("{}dead", self.prefix)
    }

    /// The newest-first list of all job ids.
    pub fn index(&self) -> String {
        format!("{}index", self.prefix)
    }

    /// The id set for one status.
    pub fn status_set(&self, status: JobStatus) -> String {
        format!("{}status:{status}", self.prefix)
    }
}

/// Score for the pending sorted set: priority band first, FIFO by creation
/// time within a band. Lower score pops first.
pub fn pending_score(priority: JobPriority, created_at: DateTime<Utc>) -> f64 {
    let band = (4 - priority.numeric_priority() as i64) * PRIORITY_BAND_MS;
    (created_at.timestamp_millis() + band) as f64
}
