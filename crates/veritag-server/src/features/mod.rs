//! Feature modules implementing the Veritag API
//!
//! Each feature is organized as a vertical slice with its own commands,
//! queries, and routes:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions
//!
//! Commands and queries implement the mediator pattern using the `mediator`
//! crate, enabling clean separation of concerns and easy testing.
//!
//! # Features
//!
//! - **upload_jobs**: Status reads and cooperative cancellation for bulk
//!   identifier upload jobs

pub mod upload_jobs;

use std::sync::Arc;

use axum::Router;

use crate::ingest::UploadJobStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Upload-job record store
    pub jobs: Arc<dyn UploadJobStore>,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest(
        "/upload-jobs",
        upload_jobs::upload_jobs_routes().with_state(state),
    )
}
