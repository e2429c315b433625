//! Upload job feature
//!
//! Read and cancel operations for bulk identifier upload jobs. Job creation
//! happens in the upload-acceptance layer, which materializes the file and
//! spawns the orchestrator; these routes cover everything a client does
//! afterwards.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::upload_jobs_routes;
