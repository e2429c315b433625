//! Batch accumulation, deduplication, and bulk persistence
//!
//! Consumes a row stream in bounded batches. Each batch is deduplicated
//! against the identifier store, bulk-written, and reported before further
//! intake continues — suspending stream consumption bounds peak memory and
//! keeps persisted progress synchronized with committed writes.
//!
//! Identifiers repeated within one batch are intentionally not pre-filtered:
//! every occurrence goes to the insert, the store rejects the later ones for
//! uniqueness, and they are reclassified as duplicates here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use veritag_common::types::{ErrorCode, JobStatus, RowError};

use super::extract::extract_code;
use super::parser::{ParsedRow, RowStream};
use super::progress::ProgressReporter;
use super::store::{IdentifierStore, NewIdentifier, UploadJobStore};
use super::types::{IngestOptions, ProgressDelta, UploadJob};
use super::Result;

/// Final result of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub duplicates: i64,
    /// Capped error sample, mirroring what was persisted
    pub errors: Vec<RowError>,
    /// Identifiers actually written to the store by this run
    pub newly_inserted: i64,
    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
}

/// One extracted identifier candidate awaiting its batch flush
struct Candidate {
    row: u64,
    code: String,
}

/// Rows accumulated since the last flush
#[derive(Default)]
struct Batch {
    candidates: Vec<Candidate>,
    errors: Vec<RowError>,
    rows_consumed: i64,
    dropped_rows: i64,
}

/// Counters produced by one flush
struct BatchOutcome {
    processed: i64,
    successful: i64,
    failed: i64,
    duplicates: i64,
    newly_inserted: i64,
    errors: Vec<RowError>,
}

/// Drives row intake through dedup, bulk writes, and progress reporting.
pub struct IngestPipeline {
    jobs: Arc<dyn UploadJobStore>,
    identifiers: Arc<dyn IdentifierStore>,
    reporter: ProgressReporter,
    options: IngestOptions,
}

impl IngestPipeline {
    pub fn new(
        jobs: Arc<dyn UploadJobStore>,
        identifiers: Arc<dyn IdentifierStore>,
        reporter: ProgressReporter,
        options: IngestOptions,
    ) -> Self {
        Self {
            jobs,
            identifiers,
            reporter,
            options,
        }
    }

    /// Run the pipeline to exhaustion or cancellation.
    ///
    /// Row-level failures are absorbed into counters and the capped error
    /// list; only store/stream outages escape as errors.
    pub async fn run(
        &self,
        job: &UploadJob,
        mut stream: Box<dyn RowStream>,
        product_id: Option<Uuid>,
    ) -> Result<PipelineResult> {
        // A materialized source knows its size up front, making the
        // percentage meaningful mid-run. A streamed source grows the total
        // with each flush instead.
        let total_preset = match stream.total_rows() {
            Some(total) => {
                self.jobs.set_total(job.id, total as i64).await?;
                true
            },
            None => false,
        };

        let mut result = PipelineResult::default();
        let mut errors_persisted = 0usize;
        let mut batch = Batch::default();
        let mut exhausted = false;

        while !exhausted {
            match stream.next_row().await? {
                Some(ParsedRow::Row(record)) => {
                    batch.rows_consumed += 1;
                    match extract_code(&record) {
                        Ok(code) => batch.candidates.push(Candidate {
                            row: record.row,
                            code,
                        }),
                        Err(err) => {
                            batch.dropped_rows += 1;
                            batch.errors.push(err);
                        },
                    }
                },
                Some(ParsedRow::Malformed(err)) => {
                    batch.rows_consumed += 1;
                    batch.dropped_rows += 1;
                    batch.errors.push(err);
                },
                None => exhausted = true,
            }

            // The bound counts extracted identifiers; dropped rows ride
            // along with whichever batch they fall into.
            let bound_reached = batch.candidates.len() >= self.options.batch_size;
            if !bound_reached && !(exhausted && batch.rows_consumed > 0) {
                continue;
            }

            let full_batch = std::mem::take(&mut batch);
            let outcome = self
                .flush(job, full_batch, product_id, total_preset, &mut errors_persisted)
                .await?;

            result.processed += outcome.processed;
            result.successful += outcome.successful;
            result.failed += outcome.failed;
            result.duplicates += outcome.duplicates;
            result.newly_inserted += outcome.newly_inserted;
            result.errors.extend(outcome.errors);

            // Cooperative cancellation, observed only between batches.
            if !exhausted && self.jobs.status(job.id).await? == JobStatus::Cancelled {
                info!(job_id = %job.id, "Cancellation observed, stopping intake");
                result.cancelled = true;
                break;
            }
        }

        Ok(result)
    }

    /// Deduplicate, bulk-write, and report one batch.
    async fn flush(
        &self,
        job: &UploadJob,
        batch: Batch,
        product_id: Option<Uuid>,
        total_preset: bool,
        errors_persisted: &mut usize,
    ) -> Result<BatchOutcome> {
        let mut errors = batch.errors;
        let mut failed = batch.dropped_rows;
        let mut successful = 0i64;
        let mut duplicates = 0i64;
        let mut newly_inserted = 0i64;

        if !batch.candidates.is_empty() {
            let codes: Vec<String> = batch.candidates.iter().map(|c| c.code.clone()).collect();
            let existing = self.identifiers.find_existing(&codes).await?;

            let mut queued = Vec::with_capacity(batch.candidates.len());
            for candidate in batch.candidates {
                if existing.contains(&candidate.code) {
                    duplicates += 1;
                    errors.push(RowError::new(
                        candidate.row,
                        ErrorCode::DuplicateCode,
                        "Duplicate code",
                    ));
                } else {
                    queued.push(candidate);
                }
            }

            if !queued.is_empty() {
                let entries: Vec<NewIdentifier> = queued
                    .iter()
                    .map(|c| NewIdentifier {
                        code: c.code.clone(),
                        brand_id: job.brand_id,
                        product_id,
                    })
                    .collect();

                let report = self.identifiers.insert_many(&entries).await?;

                let mut inserted = report.inserted;
                let mut failures: HashMap<String, Vec<String>> = HashMap::new();
                for failure in report.failures {
                    failures
                        .entry(failure.code)
                        .or_default()
                        .push(failure.message);
                }

                for candidate in queued {
                    let failure_message = failures
                        .get_mut(&candidate.code)
                        .and_then(|messages| messages.pop());

                    if let Some(message) = failure_message {
                        failed += 1;
                        errors.push(RowError::new(candidate.row, ErrorCode::WriteFailed, message));
                    } else if inserted.remove(&candidate.code) {
                        // First occurrence of an inserted code wins.
                        successful += 1;
                        newly_inserted += 1;
                    } else {
                        // Rejected for uniqueness: reclassified as duplicate.
                        duplicates += 1;
                        errors.push(RowError::new(
                            candidate.row,
                            ErrorCode::DuplicateCode,
                            "Duplicate code",
                        ));
                    }
                }
            }
        }

        let processed = batch.rows_consumed;

        // The cap bounds what is persisted; counters always reflect the
        // true totals.
        let room = self.options.max_errors.saturating_sub(*errors_persisted);
        errors.truncate(room);
        *errors_persisted += errors.len();

        let delta = ProgressDelta {
            total: if total_preset { 0 } else { processed },
            processed,
            successful,
            failed,
            duplicates,
            errors: errors.clone(),
        };
        self.reporter.report(job.id, &delta).await?;

        Ok(BatchOutcome {
            processed,
            successful,
            failed,
            duplicates,
            newly_inserted,
            errors,
        })
    }
}
