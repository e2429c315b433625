//! Common types used across Veritag
//!
//! Shared domain types for upload jobs: status machine, progress counters,
//! row-level error entries, and summary statistics. These are the shapes
//! persisted in the job record and pushed over the notification channel, so
//! they live here rather than in the server crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses permit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Transitions only move forward: pending -> processing ->
    /// {completed | failed | cancelled}; cancelled is also reachable
    /// straight from pending.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared kind of an uploaded tabular file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

impl FileKind {
    pub fn as_str(&self) -> &str {
        match self {
            FileKind::Delimited => "delimited",
            FileKind::Spreadsheet => "spreadsheet",
        }
    }

    /// Map a declared kind (or file extension) onto a supported format.
    ///
    /// Returns `None` for anything unrecognized; the caller decides how to
    /// report that.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "delimited" | "csv" | "tsv" | "text" => Some(FileKind::Delimited),
            "spreadsheet" | "xlsx" | "xls" | "ods" | "excel" => Some(FileKind::Spreadsheet),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification for a row-level error entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmptyCode,
    InvalidLength,
    DuplicateCode,
    WriteFailed,
    ParseError,
    SystemError,
}

/// One entry in a job's capped error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Source row number as visible in the file (0 for job-level errors)
    pub row: u64,
    pub code: ErrorCode,
    pub message: String,
}

impl RowError {
    pub fn new(row: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            row,
            code,
            message: message.into(),
        }
    }
}

/// Progress counters for an upload job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: i64,
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub duplicates: i64,
    pub percentage: i32,
}

impl JobProgress {
    /// Completion percentage: round(processed / total * 100), or 0 when the
    /// total is not yet known.
    pub fn percentage_of(processed: i64, total: i64) -> i32 {
        if total > 0 {
            ((processed as f64 / total as f64) * 100.0).round() as i32
        } else {
            0
        }
    }

    /// Counter consistency: processed must equal the sum of its outcomes.
    pub fn is_consistent(&self) -> bool {
        self.processed == self.successful + self.failed + self.duplicates
    }
}

/// Timing statistics for a finished job
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Rows processed per second of wall time, rounded
    pub avg_throughput: Option<i64>,
}

impl JobSummary {
    /// Build a summary for a run that started at `started_at` and just ended.
    pub fn finish(started_at: DateTime<Utc>, processed: i64) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0);
        let secs = duration_ms as f64 / 1000.0;
        let avg_throughput = if secs > 0.0 {
            (processed as f64 / secs).round() as i64
        } else {
            processed
        };

        Self {
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            duration_ms: Some(duration_ms),
            avg_throughput: Some(avg_throughput),
        }
    }
}
