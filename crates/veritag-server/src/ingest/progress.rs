//! Progress reporting
//!
//! After every flush the batch's deltas are added to the persisted job
//! counters in one atomic update, then a progress event is pushed to the
//! owner's notification channel. The push is fire-and-forget; the persisted
//! record is the source of truth.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::notify::{ProgressEvent, ProgressNotifier};
use super::store::UploadJobStore;
use super::types::{ProgressDelta, UploadJob};
use super::Result;

/// Applies progress deltas and pushes the resulting snapshot.
#[derive(Clone)]
pub struct ProgressReporter {
    jobs: Arc<dyn UploadJobStore>,
    notifier: Arc<dyn ProgressNotifier>,
}

impl ProgressReporter {
    pub fn new(jobs: Arc<dyn UploadJobStore>, notifier: Arc<dyn ProgressNotifier>) -> Self {
        Self { jobs, notifier }
    }

    /// Persist one batch's deltas atomically and push the fresh snapshot.
    pub async fn report(&self, job_id: Uuid, delta: &ProgressDelta) -> Result<UploadJob> {
        let job = self.jobs.apply_progress(job_id, delta).await?;

        debug!(
            job_id = %job_id,
            processed = job.progress.processed,
            successful = job.progress.successful,
            failed = job.progress.failed,
            duplicates = job.progress.duplicates,
            percentage = job.progress.percentage,
            "Progress flushed"
        );

        self.push(&job).await;
        Ok(job)
    }

    /// Push the job's current snapshot without touching counters.
    pub async fn push(&self, job: &UploadJob) {
        self.notifier
            .publish(
                job.owner_id,
                ProgressEvent {
                    job_id: job.id,
                    status: job.status,
                    progress: job.progress,
                    errors: job.errors.clone(),
                },
            )
            .await;
    }
}
