//! Get upload job query
//!
//! Poll-style status read for a single upload job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veritag_common::types::{JobProgress, JobStatus, JobSummary, RowError};

use crate::ingest::{IngestError, UploadJob, UploadJobStore};

/// Query to get an upload job by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

/// Upload job status as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub file_name: String,
    pub file_kind: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub errors: Vec<RowError>,
    pub summary: JobSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UploadJob> for JobStatusResponse {
    fn from(job: UploadJob) -> Self {
        Self {
            id: job.id,
            file_name: job.file_name,
            file_kind: job.file_kind,
            status: job.status,
            progress: job.progress,
            errors: job.errors,
            summary: job.summary,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Error type for get job query
#[derive(Debug, thiserror::Error)]
pub enum GetJobError {
    #[error("Upload job not found")]
    NotFound,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl Request<Result<JobStatusResponse, GetJobError>> for GetJobQuery {}

pub async fn handle(
    jobs: Arc<dyn UploadJobStore>,
    query: GetJobQuery,
) -> Result<JobStatusResponse, GetJobError> {
    let job = jobs
        .find(query.job_id)
        .await?
        .ok_or(GetJobError::NotFound)?;

    Ok(JobStatusResponse::from(job))
}
