//! Core types for the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veritag_common::types::{ErrorCode, JobProgress, JobStatus, JobSummary, RowError};

use super::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_ERRORS};

/// Upload job record (maps to the upload_jobs table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    /// Externally shareable job id
    pub id: Uuid,
    /// Owning user
    pub owner_id: Uuid,
    /// Target brand
    pub brand_id: Uuid,
    /// Original filename as uploaded
    pub file_name: String,
    /// Declared file kind ("delimited" or "spreadsheet")
    pub file_kind: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// Capped list of row-level errors
    pub errors: Vec<RowError>,
    pub summary: JobSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    /// Create a fresh pending job, as the upload-acceptance layer does when
    /// it materializes a file and hands off the path.
    pub fn new(
        owner_id: Uuid,
        brand_id: Uuid,
        file_name: impl Into<String>,
        file_kind: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            brand_id,
            file_name: file_name.into(),
            file_kind: file_kind.into(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            errors: Vec::new(),
            summary: JobSummary::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Counter deltas from one batch flush, applied atomically to the persisted
/// job record (add-deltas, never load-mutate-save).
#[derive(Debug, Clone, Default)]
pub struct ProgressDelta {
    pub total: i64,
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub duplicates: i64,
    /// Row errors to append; already truncated to respect the job's cap
    pub errors: Vec<RowError>,
}

impl ProgressDelta {
    /// Delta carrying only a single job-level system error (row 0).
    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![RowError::new(0, ErrorCode::SystemError, message)],
            ..Default::default()
        }
    }
}

/// Per-run configuration for the pipeline
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Extracted identifiers accumulated per batch before a flush
    pub batch_size: usize,
    /// Cap on retained row errors
    pub max_errors: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }
}
