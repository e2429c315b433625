//! Store seams for the ingestion pipeline
//!
//! The durable stores and the brand aggregate live outside this pipeline;
//! these traits are the boundary. Production implementations are in
//! `storage` (PostgreSQL); tests drive the pipeline through in-memory
//! implementations of the same traits.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use veritag_common::types::{JobStatus, JobSummary};

use super::types::{ProgressDelta, UploadJob};
use super::Result;

/// One identifier queued for insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentifier {
    pub code: String,
    pub brand_id: Uuid,
    pub product_id: Option<Uuid>,
}

/// Per-entry write failure that is not a uniqueness rejection
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub code: String,
    pub message: String,
}

/// Outcome of one unordered bulk insert.
///
/// Entries absent from `inserted` and from `failures` were rejected for
/// uniqueness — an expected, non-fatal outcome the caller reclassifies as
/// duplicates.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteReport {
    /// Codes that were actually written (each appears once)
    pub inserted: HashSet<String>,
    /// Entries rejected for reasons other than uniqueness
    pub failures: Vec<WriteFailure>,
}

/// Durable store of identifier records, shared across jobs.
///
/// Code uniqueness is enforced globally by the store itself; the writer
/// must treat violations as expected outcomes, never as aborting a batch.
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    /// Which of the given codes already exist.
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>>;

    /// Unordered bulk insert tolerant of per-entry uniqueness rejection.
    async fn insert_many(&self, entries: &[NewIdentifier]) -> Result<BulkWriteReport>;
}

/// Persistent upload-job records.
#[async_trait]
pub trait UploadJobStore: Send + Sync {
    /// Create a fresh pending job (done by the upload-acceptance layer).
    async fn create(&self, job: &UploadJob) -> Result<()>;

    async fn find(&self, job_id: Uuid) -> Result<Option<UploadJob>>;

    /// Move a pending job to processing and record its start time.
    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<()>;

    /// Set the expected total row count, when known before the first flush.
    async fn set_total(&self, job_id: Uuid, total: i64) -> Result<()>;

    /// Atomically add the batch's deltas to the persisted counters,
    /// recompute the percentage, and append the delta's (pre-capped) errors.
    /// Returns the fresh job record.
    async fn apply_progress(&self, job_id: Uuid, delta: &ProgressDelta) -> Result<UploadJob>;

    /// Record the terminal status and summary. The status write is a no-op
    /// when the job already carries the same terminal status (a cancelled
    /// run finalizing its summary).
    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        summary: &JobSummary,
    ) -> Result<UploadJob>;

    /// Request cooperative cancellation. Fails with
    /// [`IngestError::InvalidStateTransition`](super::IngestError) when the
    /// job is already terminal.
    async fn request_cancel(&self, job_id: Uuid) -> Result<()>;

    /// Current persisted status, polled between batches.
    async fn status(&self, job_id: Uuid) -> Result<JobStatus>;
}

/// Brand aggregate operations consumed from brand management.
#[async_trait]
pub trait BrandStore: Send + Sync {
    async fn exists(&self, brand_id: Uuid) -> Result<bool>;

    /// Add the number of newly inserted identifiers to the brand's
    /// aggregate code count.
    async fn add_to_code_count(&self, brand_id: Uuid, count: i64) -> Result<()>;
}
