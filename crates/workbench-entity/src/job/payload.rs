//! Typed job payload definitions.
//!
//! Producers build payloads through this enum; the queue itself only ever
//! sees the serialized JSON value.

use serde::{Deserialize, Serialize};

/// Typed payloads for known job types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Run sentiment analysis over a dataset batch.
    SentimentAnalysisBatch {
        /// Dataset to analyze.
        dataset_id: String,
        /// Column holding the text to score.
        text_field: String,
        /// Model identifier to score with.
        model: String,
    },
    /// Parse and profile an uploaded file.
    FileProcessing {
        /// Path of the uploaded file.
        file_path: String,
        /// Dataset the file belongs to.
        dataset_id: String,
    },
    /// Scan a dataset for PII findings.
    SecurityScan {
        /// Path of the file to scan.
        file_path: String,
        /// Dataset the file belongs to.
        dataset_id: String,
    },
    /// Export analysis results.
    DataExport {
        /// Dataset to export.
        dataset_id: String,
        /// Output format (e.g., `"csv"`, `"xlsx"`).
        format: String,
    },
}
