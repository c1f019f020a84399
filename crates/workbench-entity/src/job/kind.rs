//! The closed set of job types the workbench schedules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a background job. Determines which registered handler executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run sentiment analysis over a batch of dataset rows.
    SentimentAnalysisBatch,
    /// Parse and profile an uploaded dataset file.
    FileProcessing,
    /// Scan a dataset for PII findings.
    SecurityScan,
    /// Export analysis results to a downloadable artifact.
    DataExport,
}

impl JobType {
    /// All known job types.
    pub const ALL: [JobType; 4] = [
        JobType::SentimentAnalysisBatch,
        JobType::FileProcessing,
        JobType::SecurityScan,
        JobType::DataExport,
    ];

    /// Return the job type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentimentAnalysisBatch => "sentiment_analysis_batch",
            Self::FileProcessing => "file_processing",
            Self::SecurityScan => "security_scan",
            Self::DataExport => "data_export",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
