//! In-memory implementations of the ingest store seams.
//!
//! These mirror the PostgreSQL semantics the pipeline relies on: add-delta
//! progress updates, forward-only status transitions, and uniqueness
//! rejection on insert (first occurrence of a code wins, later ones are
//! absent from the report).

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use veritag_common::types::{JobProgress, JobStatus, JobSummary};
use veritag_server::ingest::{
    BrandStore, BulkWriteReport, IdentifierStore, IngestError, NewIdentifier, ProgressDelta,
    ProgressEvent, ProgressNotifier, UploadJob, UploadJobStore,
};

type Result<T> = std::result::Result<T, IngestError>;

// ============================================================================
// Upload job store
// ============================================================================

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, UploadJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<T>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut UploadJob) -> Result<T>,
    ) -> Result<T> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| IngestError::ReferenceNotFound(format!("upload job {job_id}")))?;
        f(job)
    }
}

#[async_trait]
impl UploadJobStore for MemoryJobStore {
    async fn create(&self, job: &UploadJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<UploadJob>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        self.with_job(job_id, |job| {
            if job.status != JobStatus::Pending {
                return Err(IngestError::InvalidStateTransition(format!(
                    "upload job {job_id} is {}, cannot move to processing",
                    job.status
                )));
            }
            job.status = JobStatus::Processing;
            job.summary.started_at = Some(started_at);
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn set_total(&self, job_id: Uuid, total: i64) -> Result<()> {
        self.with_job(job_id, |job| {
            job.progress.total = total;
            job.progress.percentage =
                JobProgress::percentage_of(job.progress.processed, total);
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn apply_progress(&self, job_id: Uuid, delta: &ProgressDelta) -> Result<UploadJob> {
        self.with_job(job_id, |job| {
            job.progress.total += delta.total;
            job.progress.processed += delta.processed;
            job.progress.successful += delta.successful;
            job.progress.failed += delta.failed;
            job.progress.duplicates += delta.duplicates;
            job.progress.percentage =
                JobProgress::percentage_of(job.progress.processed, job.progress.total);
            job.errors.extend(delta.errors.iter().cloned());
            job.updated_at = Utc::now();
            Ok(job.clone())
        })
    }

    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        summary: &JobSummary,
    ) -> Result<UploadJob> {
        self.with_job(job_id, |job| {
            if job.status.is_terminal() && job.status != status {
                return Err(IngestError::InvalidStateTransition(format!(
                    "upload job {job_id} is {}, cannot move to {status}",
                    job.status
                )));
            }
            job.status = status;
            if summary.started_at.is_some() {
                job.summary.started_at = summary.started_at;
            }
            job.summary.finished_at = summary.finished_at;
            job.summary.duration_ms = summary.duration_ms;
            job.summary.avg_throughput = summary.avg_throughput;
            job.updated_at = Utc::now();
            Ok(job.clone())
        })
    }

    async fn request_cancel(&self, job_id: Uuid) -> Result<()> {
        self.with_job(job_id, |job| {
            if job.status.is_terminal() {
                return Err(IngestError::InvalidStateTransition(format!(
                    "upload job {job_id} is {}, cannot move to cancelled",
                    job.status
                )));
            }
            job.status = JobStatus::Cancelled;
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatus> {
        self.with_job(job_id, |job| Ok(job.status))
    }
}

// ============================================================================
// Identifier store
// ============================================================================

#[derive(Default)]
pub struct MemoryIdentifierStore {
    codes: Mutex<HashSet<String>>,
    /// Codes whose insert should fail with the given message (non-uniqueness)
    failing: Mutex<HashMap<String, String>>,
    /// When set, inserts fail outright once the remaining call count hits 0
    outage: Mutex<Option<(usize, String)>>,
}

impl MemoryIdentifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a code as already stored.
    pub fn seed(&self, code: &str) {
        self.codes.lock().unwrap().insert(code.to_string());
    }

    /// Make inserts of the given code fail with a write error.
    pub fn fail_code(&self, code: &str, message: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(code.to_string(), message.to_string());
    }

    /// Make inserts fail outright after `calls` more succeed, like a lost
    /// connection mid-run.
    pub fn outage_after(&self, calls: usize, message: &str) {
        *self.outage.lock().unwrap() = Some((calls, message.to_string()));
    }

    pub fn stored_count(&self) -> usize {
        self.codes.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentifierStore for MemoryIdentifierStore {
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>> {
        let stored = self.codes.lock().unwrap();
        Ok(codes
            .iter()
            .filter(|c| stored.contains(*c))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, entries: &[NewIdentifier]) -> Result<BulkWriteReport> {
        if let Some((remaining, message)) = self.outage.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(IngestError::Io(std::io::Error::other(message.clone())));
            }
            *remaining -= 1;
        }

        let mut stored = self.codes.lock().unwrap();
        let failing = self.failing.lock().unwrap();
        let mut report = BulkWriteReport::default();

        for entry in entries {
            if let Some(message) = failing.get(&entry.code) {
                report.failures.push(veritag_server::ingest::WriteFailure {
                    code: entry.code.clone(),
                    message: message.clone(),
                });
            } else if stored.insert(entry.code.clone()) {
                report.inserted.insert(entry.code.clone());
            }
            // Codes already present are silently skipped, like
            // ON CONFLICT DO NOTHING.
        }

        Ok(report)
    }
}

// ============================================================================
// Brand store
// ============================================================================

#[derive(Default)]
pub struct MemoryBrandStore {
    counts: Mutex<HashMap<Uuid, i64>>,
}

impl MemoryBrandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_brand(&self, brand_id: Uuid) {
        self.counts.lock().unwrap().insert(brand_id, 0);
    }

    pub fn code_count(&self, brand_id: Uuid) -> i64 {
        self.counts
            .lock()
            .unwrap()
            .get(&brand_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl BrandStore for MemoryBrandStore {
    async fn exists(&self, brand_id: Uuid) -> Result<bool> {
        Ok(self.counts.lock().unwrap().contains_key(&brand_id))
    }

    async fn add_to_code_count(&self, brand_id: Uuid, count: i64) -> Result<()> {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(brand_id).or_insert(0) += count;
        Ok(())
    }
}

// ============================================================================
// Notifiers
// ============================================================================

/// Collects every published event for assertions.
#[derive(Default)]
pub struct CollectingNotifier {
    events: Mutex<Vec<(Uuid, ProgressEvent)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Uuid, ProgressEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressNotifier for CollectingNotifier {
    async fn publish(&self, user_id: Uuid, event: ProgressEvent) {
        self.events.lock().unwrap().push((user_id, event));
    }
}

/// Requests cancellation of the job when the first event is pushed,
/// simulating a cancel request racing a running job.
pub struct CancelOnFirstPush {
    jobs: Arc<MemoryJobStore>,
    triggered: AtomicBool,
}

impl CancelOnFirstPush {
    pub fn new(jobs: Arc<MemoryJobStore>) -> Self {
        Self {
            jobs,
            triggered: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ProgressNotifier for CancelOnFirstPush {
    async fn publish(&self, _user_id: Uuid, event: ProgressEvent) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.jobs.request_cancel(event.job_id).await;
        }
    }
}
