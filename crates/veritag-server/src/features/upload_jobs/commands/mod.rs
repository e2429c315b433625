//! Upload job commands

pub mod cancel_job;

pub use cancel_job::{CancelJobCommand, CancelJobError};
