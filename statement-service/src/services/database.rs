//! Postgres-backed job store.

use crate::models::{ExtractionJob, JobStatus};
use crate::services::job_store::{JobCounts, JobStore, StoreError, SystemCounts, UserJobCounts};
use crate::services::metrics::record_db_query;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use uuid::Uuid;

const JOB_COLUMNS: &str = "job_id, user_id, pdf_filename, status, submitted_utc, completed_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "statement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl JobStore for Database {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn create_job(
        &self,
        user_id: Uuid,
        pdf_filename: &str,
    ) -> Result<ExtractionJob, StoreError> {
        let start = Instant::now();
        let job = sqlx::query_as::<_, ExtractionJob>(&format!(
            r#"
            INSERT INTO extraction_jobs (job_id, user_id, pdf_filename, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(pdf_filename)
        .bind(JobStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create extraction job", e))?;
        record_db_query("create_job", start.elapsed());

        info!(job_id = %job.job_id, "Extraction job created");
        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %job_id, status = %next))]
    async fn transition(&self, job_id: Uuid, next: JobStatus) -> Result<ExtractionJob, StoreError> {
        let start = Instant::now();
        let allowed: Vec<String> = next
            .predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // The predecessor guard makes the check and the write one statement.
        let updated = sqlx::query_as::<_, ExtractionJob>(&format!(
            r#"
            UPDATE extraction_jobs
            SET status = $2,
                completed_utc = CASE WHEN $3 THEN NOW() ELSE NULL END
            WHERE job_id = $1 AND status = ANY($4::varchar[])
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(next.as_str())
        .bind(next.is_terminal())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update extraction job", e))?;
        record_db_query("transition_job", start.elapsed());

        match updated {
            Some(job) => Ok(job),
            None => match self.get_job(job_id).await? {
                Some(current) => Err(StoreError::InvalidTransition {
                    job_id,
                    from: current.status,
                    to: next,
                }),
                None => Err(StoreError::NotFound(job_id)),
            },
        }
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ExtractionJob>, StoreError> {
        sqlx::query_as::<_, ExtractionJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM extraction_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get extraction job", e))
    }

    async fn user_counts(&self, user_id: Uuid) -> Result<JobCounts, StoreError> {
        let start = Instant::now();
        let counts = sqlx::query_as::<_, JobCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'success') AS successful,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM extraction_jobs
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count user jobs", e))?;
        record_db_query("user_counts", start.elapsed());
        Ok(counts)
    }

    async fn recent_jobs(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExtractionJob>, StoreError> {
        sqlx::query_as::<_, ExtractionJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM extraction_jobs
            WHERE user_id = $1
            ORDER BY submitted_utc DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list recent jobs", e))
    }

    async fn system_counts(&self) -> Result<SystemCounts, StoreError> {
        let start = Instant::now();
        let counts = sqlx::query_as::<_, SystemCounts>(
            r#"
            SELECT COUNT(DISTINCT user_id) AS active_users,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'success') AS successful,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM extraction_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count jobs", e))?;
        record_db_query("system_counts", start.elapsed());
        Ok(counts)
    }

    async fn per_user_counts(&self) -> Result<Vec<UserJobCounts>, StoreError> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, UserJobCounts>(
            r#"
            SELECT user_id,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'success') AS successful,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                   MAX(submitted_utc) AS last_activity
            FROM extraction_jobs
            GROUP BY user_id
            ORDER BY last_activity DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to aggregate per-user jobs", e))?;
        record_db_query("per_user_counts", start.elapsed());
        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }
}
