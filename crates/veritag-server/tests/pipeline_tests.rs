//! Pipeline behavior against in-memory stores: counter consistency,
//! deduplication, error capping, and cooperative cancellation.

mod support;

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use tempfile::NamedTempFile;
use uuid::Uuid;

use veritag_common::types::{ErrorCode, JobStatus};
use veritag_server::ingest::parser::{DelimitedRows, SpreadsheetRows};
use veritag_server::ingest::{
    IngestOptions, IngestPipeline, ProgressNotifier, ProgressReporter, UploadJob, UploadJobStore,
};

use support::{CancelOnFirstPush, CollectingNotifier, MemoryIdentifierStore, MemoryJobStore};

struct Fixture {
    jobs: Arc<MemoryJobStore>,
    identifiers: Arc<MemoryIdentifierStore>,
    notifier: Arc<CollectingNotifier>,
    job: UploadJob,
}

async fn fixture() -> Fixture {
    let jobs = Arc::new(MemoryJobStore::new());
    let identifiers = Arc::new(MemoryIdentifierStore::new());
    let notifier = Arc::new(CollectingNotifier::new());

    let job = UploadJob::new(Uuid::new_v4(), Uuid::new_v4(), "codes.xlsx", "spreadsheet");
    jobs.create(&job).await.unwrap();
    jobs.mark_processing(job.id, Utc::now()).await.unwrap();

    Fixture {
        jobs,
        identifiers,
        notifier,
        job,
    }
}

fn pipeline(fix: &Fixture, options: IngestOptions) -> IngestPipeline {
    let reporter = ProgressReporter::new(
        fix.jobs.clone(),
        fix.notifier.clone() as Arc<dyn ProgressNotifier>,
    );
    IngestPipeline::new(fix.jobs.clone(), fix.identifiers.clone(), reporter, options)
}

fn sheet(rows: &[&[&str]]) -> Box<SpreadsheetRows> {
    Box::new(SpreadsheetRows::from_rows(
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect(),
    ))
}

#[tokio::test]
async fn test_mixed_batch_counters_consistent() {
    let fix = fixture().await;
    let pipeline = pipeline(&fix, IngestOptions::default());

    // One valid code, its duplicate, an empty cell, and a too-short code.
    let stream = sheet(&[
        &["code"],
        &["ABCDEFGH"],
        &["ABCDEFGH"],
        &[""],
        &["XY"],
    ]);

    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.processed, 4);
    assert_eq!(result.successful, 1);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(result.newly_inserted, 1);
    assert!(!result.cancelled);

    let job = fix.jobs.find(fix.job.id).await.unwrap().unwrap();
    assert_eq!(job.progress.total, 4);
    assert_eq!(job.progress.processed, 4);
    assert_eq!(job.progress.percentage, 100);
    assert!(job.progress.is_consistent());

    // Empty cell (row 4), short code (row 5), duplicate (row 3).
    assert_eq!(job.errors.len(), 3);
    assert!(job
        .errors
        .iter()
        .any(|e| e.row == 4 && e.code == ErrorCode::EmptyCode));
    assert!(job
        .errors
        .iter()
        .any(|e| e.row == 5 && e.code == ErrorCode::InvalidLength));
    assert!(job
        .errors
        .iter()
        .any(|e| e.row == 3 && e.code == ErrorCode::DuplicateCode));
}

#[tokio::test]
async fn test_multi_batch_flushes_and_reports() {
    let fix = fixture().await;
    let options = IngestOptions {
        batch_size: 4,
        ..IngestOptions::default()
    };
    let pipeline = pipeline(&fix, options);

    let codes: Vec<String> = (0..10).map(|i| format!("CODE-{i:04}")).collect();
    let mut rows: Vec<Vec<String>> = vec![vec!["code".to_string()]];
    rows.extend(codes.iter().map(|c| vec![c.clone()]));
    let stream = Box::new(SpreadsheetRows::from_rows(rows));

    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.processed, 10);
    assert_eq!(result.successful, 10);
    assert_eq!(result.failed, 0);
    assert_eq!(result.duplicates, 0);
    assert_eq!(fix.identifiers.stored_count(), 10);

    // 10 rows at batch size 4: three flushes, each pushing one event.
    let events = fix.notifier.events();
    assert_eq!(events.len(), 3);
    let last = &events.last().unwrap().1;
    assert_eq!(last.progress.processed, 10);
    assert_eq!(last.progress.percentage, 100);

    // Events are scoped to the owning user.
    assert!(events.iter().all(|(user, _)| *user == fix.job.owner_id));
}

#[tokio::test]
async fn test_batch_bound_counts_extracted_identifiers() {
    let fix = fixture().await;
    let options = IngestOptions {
        batch_size: 2,
        ..IngestOptions::default()
    };
    let pipeline = pipeline(&fix, options);

    // Dropped rows ride along without counting toward the bound: the first
    // flush happens once two identifiers have been extracted, after row 4.
    let stream = sheet(&[
        &["code"],
        &["CODE-A1"],
        &[""],
        &["CODE-B2"],
        &["CODE-C3"],
    ]);

    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.processed, 4);
    assert_eq!(result.successful, 3);
    assert_eq!(result.failed, 1);

    let events = fix.notifier.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1.progress.processed, 3);
    assert_eq!(events[0].1.progress.successful, 2);
    assert_eq!(events[0].1.progress.failed, 1);
}

#[tokio::test]
async fn test_error_list_capped_counters_exact() {
    let fix = fixture().await;
    let options = IngestOptions {
        batch_size: 3,
        max_errors: 5,
    };
    let pipeline = pipeline(&fix, options);

    // Ten rows with empty codes.
    let mut rows: Vec<Vec<String>> = vec![vec!["code".to_string()]];
    rows.extend((0..10).map(|_| vec![String::new()]));
    let stream = Box::new(SpreadsheetRows::from_rows(rows));

    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.failed, 10);
    assert_eq!(result.errors.len(), 5);

    let job = fix.jobs.find(fix.job.id).await.unwrap().unwrap();
    assert_eq!(job.progress.failed, 10);
    assert_eq!(job.errors.len(), 5);
    assert!(job.progress.is_consistent());
}

#[tokio::test]
async fn test_duplicates_against_stored_records() {
    let fix = fixture().await;
    fix.identifiers.seed("EXISTING-CODE");
    let pipeline = pipeline(&fix, IngestOptions::default());

    let stream = sheet(&[&["code"], &["EXISTING-CODE"], &["FRESH-CODE"]]);
    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.successful, 1);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.newly_inserted, 1);

    let job = fix.jobs.find(fix.job.id).await.unwrap().unwrap();
    assert!(job
        .errors
        .iter()
        .any(|e| e.row == 2 && e.code == ErrorCode::DuplicateCode));
}

#[tokio::test]
async fn test_write_failure_becomes_failed_row() {
    let fix = fixture().await;
    fix.identifiers.fail_code("BAD-WRITE", "connection reset");
    let pipeline = pipeline(&fix, IngestOptions::default());

    let stream = sheet(&[&["code"], &["BAD-WRITE"], &["GOOD-CODE"]]);
    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 1);

    let job = fix.jobs.find(fix.job.id).await.unwrap().unwrap();
    assert!(job
        .errors
        .iter()
        .any(|e| e.row == 2 && e.code == ErrorCode::WriteFailed));
    assert!(job.progress.is_consistent());
}

#[tokio::test]
async fn test_cancellation_between_batches() {
    let jobs = Arc::new(MemoryJobStore::new());
    let identifiers = Arc::new(MemoryIdentifierStore::new());
    let notifier = Arc::new(CancelOnFirstPush::new(jobs.clone()));

    let job = UploadJob::new(Uuid::new_v4(), Uuid::new_v4(), "codes.xlsx", "spreadsheet");
    jobs.create(&job).await.unwrap();
    jobs.mark_processing(job.id, Utc::now()).await.unwrap();

    let options = IngestOptions {
        batch_size: 2,
        ..IngestOptions::default()
    };
    let reporter = ProgressReporter::new(jobs.clone(), notifier as Arc<dyn ProgressNotifier>);
    let pipeline = IngestPipeline::new(jobs.clone(), identifiers.clone(), reporter, options);

    let stream = sheet(&[
        &["code"],
        &["CODE-A1"],
        &["CODE-B2"],
        &["CODE-C3"],
        &["CODE-D4"],
        &["CODE-E5"],
        &["CODE-F6"],
    ]);

    let result = pipeline.run(&job, stream, None).await.unwrap();

    // Cancel was requested during the first flush; the pipeline stops before
    // consuming the second batch, keeping what was already committed.
    assert!(result.cancelled);
    assert_eq!(result.processed, 2);
    assert_eq!(result.successful, 2);
    assert_eq!(identifiers.stored_count(), 2);
    assert_eq!(jobs.status(job.id).await.unwrap(), JobStatus::Cancelled);
}

#[tokio::test]
async fn test_delimited_stream_accumulates_total() {
    let fix = fixture().await;
    let options = IngestOptions {
        batch_size: 2,
        ..IngestOptions::default()
    };
    let pipeline = pipeline(&fix, options);

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "code,product").unwrap();
    writeln!(file, "STREAM-1,widget").unwrap();
    writeln!(file, "STREAM-2,widget").unwrap();
    writeln!(file, "STREAM-3,widget").unwrap();
    file.flush().unwrap();

    let stream = Box::new(DelimitedRows::open(file.path()).await.unwrap());
    let result = pipeline.run(&fix.job, stream, None).await.unwrap();

    assert_eq!(result.successful, 3);

    // A streamed source has no preset total: it grows with each flush and
    // matches processed once the input is exhausted.
    let job = fix.jobs.find(fix.job.id).await.unwrap().unwrap();
    assert_eq!(job.progress.total, 3);
    assert_eq!(job.progress.processed, 3);
    assert_eq!(job.progress.percentage, 100);
}
