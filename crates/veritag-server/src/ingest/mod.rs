//! Bulk identifier ingestion
//!
//! Turns an uploaded tabular file (delimited text or spreadsheet) into
//! validated, deduplicated identifier records, persisting incremental
//! progress and pushing live updates to the owning user's notification
//! channel.
//!
//! # Architecture
//!
//! - **parser**: row streams for both file formats (`RowStream`)
//! - **extract**: candidate code extraction and normalization
//! - **pipeline**: batch accumulation, deduplication, bulk writes
//! - **progress**: add-delta progress persistence + notification push
//! - **orchestrator**: per-job shell driving a run to one terminal state
//! - **store**: trait seams for the durable stores and the notifier
//! - **storage**: PostgreSQL implementations of the store seams
//! - **notify**: in-process per-user notification hub
//!
//! A job runs as a single background task; the interface that accepted the
//! upload returns immediately after creating the job record and handing the
//! orchestrator a file path.

pub mod extract;
pub mod notify;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod storage;
pub mod store;
pub mod types;

pub use extract::extract_code;
pub use notify::{NotificationHub, ProgressEvent, ProgressNotifier};
pub use orchestrator::{UploadJobRequest, UploadOrchestrator};
pub use parser::{open_row_stream, RowRecord, RowStream};
pub use pipeline::{IngestPipeline, PipelineResult};
pub use progress::ProgressReporter;
pub use storage::{PgBrandStore, PgIdentifierStore, PgUploadJobStore};
pub use store::{
    BrandStore, BulkWriteReport, IdentifierStore, NewIdentifier, UploadJobStore, WriteFailure,
};
pub use types::{IngestOptions, ProgressDelta, UploadJob};

/// Default number of extracted identifiers per batch flush
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default cap on retained row errors per job
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Inclusive identifier length bounds after trimming
pub const MIN_CODE_LENGTH: usize = 3;
pub const MAX_CODE_LENGTH: usize = 100;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for the ingestion pipeline
///
/// Only these reach the orchestrator boundary; row- and entry-level failures
/// are absorbed into the job's counters and capped error list.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}
