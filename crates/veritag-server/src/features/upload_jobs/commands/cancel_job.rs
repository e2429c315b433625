//! Cancel upload job command
//!
//! Records a cancellation request on a pending or processing job. The
//! pipeline observes the persisted status between batches, so already
//! processed rows stay processed; a terminal job refuses the request.

use std::sync::Arc;

use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::{IngestError, UploadJobStore};

/// Command to request cooperative cancellation of an upload job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobCommand {
    pub job_id: Uuid,
}

/// Error type for the cancel command
#[derive(Debug, thiserror::Error)]
pub enum CancelJobError {
    #[error("Upload job not found")]
    NotFound,
    #[error("{0}")]
    AlreadyTerminal(String),
    #[error(transparent)]
    Ingest(IngestError),
}

impl From<IngestError> for CancelJobError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ReferenceNotFound(_) => CancelJobError::NotFound,
            IngestError::InvalidStateTransition(msg) => CancelJobError::AlreadyTerminal(msg),
            other => CancelJobError::Ingest(other),
        }
    }
}

impl Request<Result<(), CancelJobError>> for CancelJobCommand {}

pub async fn handle(
    jobs: Arc<dyn UploadJobStore>,
    command: CancelJobCommand,
) -> Result<(), CancelJobError> {
    jobs.request_cancel(command.job_id).await?;
    tracing::info!(job_id = %command.job_id, "Upload job cancellation requested");
    Ok(())
}
