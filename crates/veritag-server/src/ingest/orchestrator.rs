//! Upload job orchestrator
//!
//! Drives one upload job to exactly one terminal state: validates the
//! references, runs the parser/pipeline for the declared file kind,
//! finalizes summary statistics, and always cleans up the temporary source
//! file. Unhandled failures become a terminal failed state instead of
//! escaping.
//!
//! Jobs run as independent background tasks; the interface that accepted
//! the upload returns immediately after `spawn`. At most one run per job id
//! is a caller precondition.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use veritag_common::types::{FileKind, JobStatus, JobSummary};

use super::notify::ProgressNotifier;
use super::parser::open_row_stream;
use super::pipeline::IngestPipeline;
use super::progress::ProgressReporter;
use super::store::{BrandStore, IdentifierStore, UploadJobStore};
use super::types::{IngestOptions, ProgressDelta};
use super::{IngestError, Result};

/// Everything the orchestrator needs to run one job
#[derive(Debug, Clone)]
pub struct UploadJobRequest {
    pub job_id: Uuid,
    /// Locally materialized source file, deleted on every exit path
    pub file_path: PathBuf,
    /// Declared kind as received from the upload-acceptance layer
    pub file_kind: String,
    pub brand_id: Uuid,
    pub product_id: Option<Uuid>,
    pub owner_id: Uuid,
}

/// Per-job orchestration shell
pub struct UploadOrchestrator {
    jobs: Arc<dyn UploadJobStore>,
    identifiers: Arc<dyn IdentifierStore>,
    brands: Arc<dyn BrandStore>,
    reporter: ProgressReporter,
    options: IngestOptions,
}

impl UploadOrchestrator {
    pub fn new(
        jobs: Arc<dyn UploadJobStore>,
        identifiers: Arc<dyn IdentifierStore>,
        brands: Arc<dyn BrandStore>,
        notifier: Arc<dyn ProgressNotifier>,
        options: IngestOptions,
    ) -> Self {
        let reporter = ProgressReporter::new(Arc::clone(&jobs), notifier);
        Self {
            jobs,
            identifiers,
            brands,
            reporter,
            options,
        }
    }

    /// Run the job on a background task and return immediately.
    pub fn spawn(self: Arc<Self>, request: UploadJobRequest) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(request).await;
        })
    }

    /// Drive the job to a terminal state, converting unhandled failures
    /// into `failed` and always attempting source-file cleanup.
    pub async fn run(&self, request: UploadJobRequest) {
        if let Err(e) = self.execute(&request).await {
            error!(job_id = %request.job_id, error = %e, "Upload job failed");
            if let Err(record_err) = self.fail_job(&request, &e).await {
                error!(
                    job_id = %request.job_id,
                    error = %record_err,
                    "Could not record job failure"
                );
            }
        }

        self.cleanup(&request.file_path).await;
    }

    async fn execute(&self, request: &UploadJobRequest) -> Result<()> {
        let job = self
            .jobs
            .find(request.job_id)
            .await?
            .ok_or_else(|| {
                IngestError::ReferenceNotFound(format!("upload job {}", request.job_id))
            })?;

        if !self.brands.exists(request.brand_id).await? {
            return Err(IngestError::ReferenceNotFound(format!(
                "brand {}",
                request.brand_id
            )));
        }

        let started_at = Utc::now();
        self.jobs.mark_processing(job.id, started_at).await?;

        let mut job = job;
        job.status = JobStatus::Processing;
        job.summary.started_at = Some(started_at);
        self.reporter.push(&job).await;

        info!(
            job_id = %job.id,
            file = %job.file_name,
            kind = %request.file_kind,
            "Starting upload job"
        );

        let kind = FileKind::from_kind(&request.file_kind)
            .ok_or_else(|| IngestError::UnsupportedFormat(request.file_kind.clone()))?;
        let stream = open_row_stream(&request.file_path, kind).await?;

        let pipeline = IngestPipeline::new(
            Arc::clone(&self.jobs),
            Arc::clone(&self.identifiers),
            self.reporter.clone(),
            self.options,
        );
        let result = pipeline.run(&job, stream, request.product_id).await?;

        if result.newly_inserted > 0 {
            self.brands
                .add_to_code_count(request.brand_id, result.newly_inserted)
                .await?;
        }

        // A cancel landing after the last flush still wins over completed.
        let status = if result.cancelled || self.jobs.status(job.id).await? == JobStatus::Cancelled
        {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };

        let summary = JobSummary::finish(started_at, result.processed);
        let job = self.jobs.finalize(job.id, status, &summary).await?;
        self.reporter.push(&job).await;

        info!(
            job_id = %job.id,
            status = %job.status,
            processed = result.processed,
            successful = result.successful,
            failed = result.failed,
            duplicates = result.duplicates,
            duration_ms = summary.duration_ms.unwrap_or(0),
            "Upload job finished"
        );

        Ok(())
    }

    /// Record a failure on the job, when the job record exists at all.
    async fn fail_job(&self, request: &UploadJobRequest, cause: &IngestError) -> Result<()> {
        let Some(job) = self.jobs.find(request.job_id).await? else {
            // Missing job reference: nothing to mutate.
            return Ok(());
        };

        // A job that already reached a terminal state (a cancel racing the
        // start) keeps it.
        if job.status.is_terminal() {
            return Ok(());
        }

        // The error list cap bounds the terminal system entry too; when row
        // errors already fill it, fail the job without appending.
        if job.errors.len() < self.options.max_errors {
            self.jobs
                .apply_progress(job.id, &ProgressDelta::system_error(cause.to_string()))
                .await?;
        }

        let summary = match job.summary.started_at {
            Some(started_at) => JobSummary::finish(started_at, job.progress.processed),
            None => JobSummary::default(),
        };

        let job = self.jobs.finalize(job.id, JobStatus::Failed, &summary).await?;
        self.reporter.push(&job).await;

        Ok(())
    }

    /// Delete the temporary source file; a failure here is logged, never
    /// escalated.
    async fn cleanup(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete source file");
        }
    }
}
