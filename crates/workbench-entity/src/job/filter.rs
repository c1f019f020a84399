//! Query filter for job listings.

use serde::{Deserialize, Serialize};

use super::kind::JobType;
use super::model::Job;
use super::status::JobStatus;

/// Default cap on the number of jobs a listing returns.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Filter for `get_jobs` snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    /// Only include jobs with this status.
    pub status: Option<JobStatus>,
    /// Only include jobs of this type.
    pub job_type: Option<JobType>,
    /// Cap the number of returned jobs.
    pub limit: Option<usize>,
}

impl JobFilter {
    /// Check whether a job matches this filter.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(job_type) = self.job_type {
            if job.job_type != job_type {
                return false;
            }
        }
        true
    }

    /// The effective listing cap.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}
