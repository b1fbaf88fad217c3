//! Persistence seam for extraction jobs.
//!
//! The orchestrator and dashboards talk to [`JobStore`]; Postgres backs it in
//! production and [`InMemoryJobStore`] backs it in tests.

use crate::models::{ExtractionJob, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Extraction job {0} not found")]
    NotFound(Uuid),

    #[error("Extraction job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job store failure: {0}")]
    Database(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err)),
            StoreError::InvalidTransition { .. } => AppError::InternalError(anyhow::anyhow!(err)),
            StoreError::Database(_) => AppError::DatabaseError(anyhow::anyhow!(err)),
        }
    }
}

/// Job totals for one user or for the whole system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct JobCounts {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SystemCounts {
    pub active_users: i64,
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserJobCounts {
    pub user_id: Uuid,
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `pending` state.
    async fn create_job(&self, user_id: Uuid, pdf_filename: &str)
        -> Result<ExtractionJob, StoreError>;

    /// Move a job to `next`, setting the completion time on terminal states.
    /// Illegal moves fail with [`StoreError::InvalidTransition`].
    async fn transition(&self, job_id: Uuid, next: JobStatus) -> Result<ExtractionJob, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ExtractionJob>, StoreError>;

    async fn user_counts(&self, user_id: Uuid) -> Result<JobCounts, StoreError>;

    /// Most recent jobs for a user, newest first.
    async fn recent_jobs(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<ExtractionJob>, StoreError>;

    async fn system_counts(&self) -> Result<SystemCounts, StoreError>;

    /// One row per user with jobs, most recently active first.
    async fn per_user_counts(&self) -> Result<Vec<UserJobCounts>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Process-local job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, ExtractionJob>>,
    failing_status: Option<JobStatus>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transition into `status` fail as if the database were down.
    pub fn failing_on(status: JobStatus) -> Self {
        Self {
            failing_status: Some(status),
            ..Self::default()
        }
    }

    /// Snapshot of all jobs, oldest first.
    pub async fn jobs(&self) -> Vec<ExtractionJob> {
        let mut jobs: Vec<ExtractionJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.submitted_utc);
        jobs
    }
}

fn tally<'a>(jobs: impl Iterator<Item = &'a ExtractionJob>) -> JobCounts {
    jobs.fold(JobCounts::default(), |mut acc, job| {
        acc.total += 1;
        match job.status {
            JobStatus::Success => acc.successful += 1,
            JobStatus::Failed => acc.failed += 1,
            JobStatus::Pending | JobStatus::Processing => {}
        }
        acc
    })
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(
        &self,
        user_id: Uuid,
        pdf_filename: &str,
    ) -> Result<ExtractionJob, StoreError> {
        let mut job = ExtractionJob::new(user_id, pdf_filename);
        let mut jobs = self.jobs.write().await;
        // Keep submission order strict so "newest first" is deterministic.
        if let Some(latest) = jobs.values().map(|j| j.submitted_utc).max() {
            if job.submitted_utc <= latest {
                job.submitted_utc = latest + chrono::Duration::microseconds(1);
            }
        }
        jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn transition(&self, job_id: Uuid, next: JobStatus) -> Result<ExtractionJob, StoreError> {
        if self.failing_status == Some(next) {
            return Err(StoreError::Database(format!(
                "simulated failure writing status {}",
                next
            )));
        }

        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        let from = job.status;
        if !job.advance(next, Utc::now()) {
            return Err(StoreError::InvalidTransition {
                job_id,
                from,
                to: next,
            });
        }
        Ok(job.clone())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ExtractionJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn user_counts(&self, user_id: Uuid) -> Result<JobCounts, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(tally(jobs.values().filter(|j| j.user_id == user_id)))
    }

    async fn recent_jobs(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExtractionJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut mine: Vec<ExtractionJob> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.submitted_utc.cmp(&a.submitted_utc));
        mine.truncate(limit.max(0) as usize);
        Ok(mine)
    }

    async fn system_counts(&self) -> Result<SystemCounts, StoreError> {
        let jobs = self.jobs.read().await;
        let counts = tally(jobs.values());
        let mut users: Vec<Uuid> = jobs.values().map(|j| j.user_id).collect();
        users.sort();
        users.dedup();
        Ok(SystemCounts {
            active_users: users.len() as i64,
            total: counts.total,
            successful: counts.successful,
            failed: counts.failed,
        })
    }

    async fn per_user_counts(&self) -> Result<Vec<UserJobCounts>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut by_user: HashMap<Uuid, Vec<&ExtractionJob>> = HashMap::new();
        for job in jobs.values() {
            by_user.entry(job.user_id).or_default().push(job);
        }

        let mut rows: Vec<UserJobCounts> = by_user
            .into_iter()
            .map(|(user_id, jobs)| {
                let counts = tally(jobs.iter().copied());
                UserJobCounts {
                    user_id,
                    total: counts.total,
                    successful: counts.successful,
                    failed: counts.failed,
                    last_activity: jobs.iter().map(|j| j.submitted_utc).max(),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_job_is_pending_without_completion() {
        let store = InMemoryJobStore::new();
        let job = store.create_job(Uuid::new_v4(), "a.pdf").await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_utc.is_none());
    }

    #[tokio::test]
    async fn transition_sets_completion_on_terminal_status() {
        let store = InMemoryJobStore::new();
        let job = store.create_job(Uuid::new_v4(), "a.pdf").await.unwrap();

        let job = store.transition(job.job_id, JobStatus::Processing).await.unwrap();
        assert!(job.completed_utc.is_none());

        let job = store.transition(job.job_id, JobStatus::Success).await.unwrap();
        assert!(job.completed_utc.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = store.create_job(Uuid::new_v4(), "a.pdf").await.unwrap();

        let err = store
            .transition(job.job_id, JobStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Failed,
                ..
            }
        ));

        let stored = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store
            .transition(Uuid::new_v4(), JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn counts_and_recent_jobs_are_scoped_per_user() {
        let store = InMemoryJobStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        for (user, name, outcome) in [
            (alice, "1.pdf", JobStatus::Success),
            (alice, "2.pdf", JobStatus::Failed),
            (alice, "3.pdf", JobStatus::Success),
            (bob, "4.pdf", JobStatus::Failed),
        ] {
            let job = store.create_job(user, name).await.unwrap();
            store.transition(job.job_id, JobStatus::Processing).await.unwrap();
            store.transition(job.job_id, outcome).await.unwrap();
        }

        let counts = store.user_counts(alice).await.unwrap();
        assert_eq!(
            counts,
            JobCounts {
                total: 3,
                successful: 2,
                failed: 1
            }
        );

        let recent = store.recent_jobs(alice, 2).await.unwrap();
        let names: Vec<&str> = recent.iter().map(|j| j.pdf_filename.as_str()).collect();
        assert_eq!(names, vec!["3.pdf", "2.pdf"]);

        let system = store.system_counts().await.unwrap();
        assert_eq!(system.active_users, 2);
        assert_eq!(system.total, 4);

        let rows = store.per_user_counts().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, bob);
    }

    #[tokio::test]
    async fn failing_status_simulates_store_outage() {
        let store = InMemoryJobStore::failing_on(JobStatus::Failed);
        let job = store.create_job(Uuid::new_v4(), "a.pdf").await.unwrap();
        store.transition(job.job_id, JobStatus::Processing).await.unwrap();

        let err = store.transition(job.job_id, JobStatus::Failed).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
