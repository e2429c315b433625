//! PostgreSQL storage layer for the ingestion pipeline
//!
//! Production implementations of the store seams in [`store`](super::store).
//! Progress updates are applied as counter additions in a single UPDATE so
//! concurrent writers (the pipeline and a cancel request) never clobber each
//! other; the job record is never read-modify-written.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use veritag_common::types::{JobProgress, JobStatus, JobSummary, RowError};

use super::store::{
    BrandStore, BulkWriteReport, IdentifierStore, NewIdentifier, UploadJobStore,
};
use super::types::{ProgressDelta, UploadJob};
use super::{IngestError, Result};

/// Columns returned for a full job record, in `UploadJobRow` field order.
const JOB_COLUMNS: &str = "id, owner_id, brand_id, file_name, file_kind, status, \
     total, processed, successful, failed, duplicates, percentage, errors, \
     started_at, finished_at, duration_ms, avg_throughput, created_at, updated_at";

/// Raw upload_jobs row; converted into the domain type after fetch.
#[derive(sqlx::FromRow)]
struct UploadJobRow {
    id: Uuid,
    owner_id: Uuid,
    brand_id: Uuid,
    file_name: String,
    file_kind: String,
    status: String,
    total: i64,
    processed: i64,
    successful: i64,
    failed: i64,
    duplicates: i64,
    percentage: i32,
    errors: serde_json::Value,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    avg_throughput: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UploadJobRow> for UploadJob {
    fn from(row: UploadJobRow) -> Self {
        let errors: Vec<RowError> = serde_json::from_value(row.errors).unwrap_or_default();
        UploadJob {
            id: row.id,
            owner_id: row.owner_id,
            brand_id: row.brand_id,
            file_name: row.file_name,
            file_kind: row.file_kind,
            status: JobStatus::from(row.status),
            progress: JobProgress {
                total: row.total,
                processed: row.processed,
                successful: row.successful,
                failed: row.failed,
                duplicates: row.duplicates,
                percentage: row.percentage,
            },
            errors,
            summary: JobSummary {
                started_at: row.started_at,
                finished_at: row.finished_at,
                duration_ms: row.duration_ms,
                avg_throughput: row.avg_throughput,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Upload-job records backed by the upload_jobs table
pub struct PgUploadJobStore {
    db: PgPool,
}

impl PgUploadJobStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Distinguish a missing job from a refused transition after a guarded
    /// UPDATE matched no row.
    async fn transition_refused(&self, job_id: Uuid, wanted: &str) -> IngestError {
        match self.current_status(job_id).await {
            Ok(Some(status)) => IngestError::InvalidStateTransition(format!(
                "upload job {job_id} is {status}, cannot move to {wanted}"
            )),
            Ok(None) => IngestError::ReferenceNotFound(format!("upload job {job_id}")),
            Err(e) => e,
        }
    }

    async fn current_status(&self, job_id: Uuid) -> Result<Option<String>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM upload_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(status)
    }
}

#[async_trait]
impl UploadJobStore for PgUploadJobStore {
    async fn create(&self, job: &UploadJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_jobs (
                id, owner_id, brand_id, file_name, file_kind, status,
                total, processed, successful, failed, duplicates, percentage,
                errors, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, 0, 0, 0, 0, 0, '[]'::jsonb, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(job.owner_id)
        .bind(job.brand_id)
        .bind(&job.file_name)
        .bind(&job.file_kind)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.db)
        .await?;

        debug!(job_id = %job.id, "Created upload job");
        Ok(())
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<UploadJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM upload_jobs WHERE id = $1");
        let row: Option<UploadJobRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(UploadJob::from))
    }

    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'processing', started_at = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .bind(started_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_refused(job_id, "processing").await);
        }
        Ok(())
    }

    async fn set_total(&self, job_id: Uuid, total: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET total = $2,
                percentage = CASE WHEN $2 > 0
                    THEN ROUND(processed::numeric / $2 * 100)::int
                    ELSE 0 END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(total)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IngestError::ReferenceNotFound(format!(
                "upload job {job_id}"
            )));
        }
        Ok(())
    }

    async fn apply_progress(&self, job_id: Uuid, delta: &ProgressDelta) -> Result<UploadJob> {
        let errors = serde_json::to_value(&delta.errors)
            .map_err(|e| IngestError::Parse(e.to_string()))?;

        let sql = format!(
            r#"
            UPDATE upload_jobs
            SET total = total + $2,
                processed = processed + $3,
                successful = successful + $4,
                failed = failed + $5,
                duplicates = duplicates + $6,
                errors = errors || $7,
                percentage = CASE WHEN total + $2 > 0
                    THEN ROUND((processed + $3)::numeric / (total + $2) * 100)::int
                    ELSE 0 END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row: Option<UploadJobRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .bind(delta.total)
            .bind(delta.processed)
            .bind(delta.successful)
            .bind(delta.failed)
            .bind(delta.duplicates)
            .bind(errors)
            .fetch_optional(&self.db)
            .await?;

        row.map(UploadJob::from).ok_or_else(|| {
            IngestError::ReferenceNotFound(format!("upload job {job_id}"))
        })
    }

    async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        summary: &JobSummary,
    ) -> Result<UploadJob> {
        // Matching an already-identical terminal status lets a cancelled run
        // still record its summary.
        let sql = format!(
            r#"
            UPDATE upload_jobs
            SET status = $2,
                started_at = COALESCE($3, started_at),
                finished_at = $4,
                duration_ms = $5,
                avg_throughput = $6,
                updated_at = NOW()
            WHERE id = $1 AND (status = $2 OR status IN ('pending', 'processing'))
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row: Option<UploadJobRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .bind(status.as_str())
            .bind(summary.started_at)
            .bind(summary.finished_at)
            .bind(summary.duration_ms)
            .bind(summary.avg_throughput)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(UploadJob::from(row)),
            None => Err(self.transition_refused(job_id, status.as_str()).await),
        }
    }

    async fn request_cancel(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_refused(job_id, "cancelled").await);
        }

        debug!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatus> {
        match self.current_status(job_id).await? {
            Some(status) => Ok(JobStatus::from(status)),
            None => Err(IngestError::ReferenceNotFound(format!(
                "upload job {job_id}"
            ))),
        }
    }
}

/// Identifier records backed by the identifiers table.
///
/// Uniqueness is enforced by the UNIQUE constraint on `code`; the bulk
/// insert uses ON CONFLICT DO NOTHING so violations never abort a batch.
pub struct PgIdentifierStore {
    db: PgPool,
}

impl PgIdentifierStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentifierStore for PgIdentifierStore {
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>> {
        if codes.is_empty() {
            return Ok(HashSet::new());
        }

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT code FROM identifiers WHERE code = ANY($1)")
                .bind(codes)
                .fetch_all(&self.db)
                .await?;
        Ok(existing.into_iter().collect())
    }

    async fn insert_many(&self, entries: &[NewIdentifier]) -> Result<BulkWriteReport> {
        if entries.is_empty() {
            return Ok(BulkWriteReport::default());
        }

        let codes: Vec<String> = entries.iter().map(|e| e.code.clone()).collect();
        let brand_ids: Vec<Uuid> = entries.iter().map(|e| e.brand_id).collect();
        let product_ids: Vec<Option<Uuid>> = entries.iter().map(|e| e.product_id).collect();

        let inserted: Vec<String> = sqlx::query_scalar(
            r#"
            INSERT INTO identifiers (code, brand_id, product_id)
            SELECT * FROM UNNEST($1::text[], $2::uuid[], $3::uuid[])
            ON CONFLICT (code) DO NOTHING
            RETURNING code
            "#,
        )
        .bind(&codes)
        .bind(&brand_ids)
        .bind(&product_ids)
        .fetch_all(&self.db)
        .await?;

        debug!(
            queued = entries.len(),
            inserted = inserted.len(),
            "Bulk insert flushed"
        );

        Ok(BulkWriteReport {
            inserted: inserted.into_iter().collect(),
            failures: Vec::new(),
        })
    }
}

/// Brand aggregate backed by the brands table
pub struct PgBrandStore {
    db: PgPool,
}

impl PgBrandStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BrandStore for PgBrandStore {
    async fn exists(&self, brand_id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM brands WHERE id = $1)")
                .bind(brand_id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn add_to_code_count(&self, brand_id: Uuid, count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE brands SET code_count = code_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(brand_id)
        .bind(count)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
