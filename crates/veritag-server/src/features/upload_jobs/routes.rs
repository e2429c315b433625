//! Upload job routes
//!
//! Status reads and cancellation for upload jobs. The route-level error
//! mapping goes through [`AppError`](crate::error::AppError): a missing job
//! is 404, cancelling a terminal job is 409.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::commands::{cancel_job, CancelJobCommand, CancelJobError};
use super::queries::{get_job, GetJobError, GetJobQuery};
use crate::error::AppError;
use crate::features::FeatureState;

/// Create upload job routes
pub fn upload_jobs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/:job_id", get(get_upload_job))
        .route("/:job_id/cancel", post(cancel_upload_job))
}

/// Get a specific upload job by ID
///
/// GET /upload-jobs/:job_id
async fn get_upload_job(
    State(state): State<FeatureState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let query = GetJobQuery { job_id };

    match get_job::handle(state.jobs, query).await {
        Ok(job) => Ok((StatusCode::OK, Json(json!(job))).into_response()),
        Err(GetJobError::NotFound) => {
            Err(AppError::NotFound(format!("upload job {job_id}")))
        }
        Err(GetJobError::Ingest(e)) => Err(AppError::from(e)),
    }
}

/// Request cooperative cancellation of an upload job
///
/// POST /upload-jobs/:job_id/cancel
async fn cancel_upload_job(
    State(state): State<FeatureState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let command = CancelJobCommand { job_id };

    match cancel_job::handle(state.jobs, command).await {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id, "status": "cancellation_requested" })),
        )
            .into_response()),
        Err(CancelJobError::NotFound) => {
            Err(AppError::NotFound(format!("upload job {job_id}")))
        }
        Err(CancelJobError::AlreadyTerminal(msg)) => Err(AppError::Conflict(msg)),
        Err(CancelJobError::Ingest(e)) => Err(AppError::from(e)),
    }
}
