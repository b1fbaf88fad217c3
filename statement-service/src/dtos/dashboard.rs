use crate::models::{ExtractionJob, JobStatus};
use crate::services::job_store::{JobCounts, SystemCounts, UserJobCounts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of jobs listed under `recent_files`.
pub const RECENT_FILES_LIMIT: i64 = 5;

/// Percentage of successful jobs, rounded to 2 decimals; 0 when there are none.
pub fn success_rate(successful: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = successful as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentFile {
    pub filename: String,
    pub status: JobStatus,
    pub submitted_at: String,
}

impl From<ExtractionJob> for RecentFile {
    fn from(job: ExtractionJob) -> Self {
        Self {
            filename: job.pdf_filename,
            status: job.status,
            submitted_at: job.submitted_utc.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDashboardResponse {
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub success_rate: f64,
    pub recent_files: Vec<RecentFile>,
}

impl UserDashboardResponse {
    pub fn new(counts: JobCounts, recent: Vec<ExtractionJob>) -> Self {
        Self {
            total_extractions: counts.total,
            successful_extractions: counts.successful,
            failed_extractions: counts.failed,
            success_rate: success_rate(counts.successful, counts.total),
            recent_files: recent.into_iter().map(RecentFile::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminDashboardResponse {
    pub active_users: i64,
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub success_rate: f64,
    pub system_health: String,
}

impl From<SystemCounts> for AdminDashboardResponse {
    fn from(counts: SystemCounts) -> Self {
        Self {
            active_users: counts.active_users,
            total_extractions: counts.total,
            successful_extractions: counts.successful,
            failed_extractions: counts.failed,
            success_rate: success_rate(counts.successful, counts.total),
            system_health: "good".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatsRow {
    pub user_id: Uuid,
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub success_rate: f64,
    pub last_activity: Option<String>,
}

impl From<UserJobCounts> for UserStatsRow {
    fn from(row: UserJobCounts) -> Self {
        Self {
            user_id: row.user_id,
            total_extractions: row.total,
            successful_extractions: row.successful,
            failed_extractions: row.failed,
            success_rate: success_rate(row.successful, row.total),
            last_activity: row.last_activity.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersStatsResponse {
    pub users: Vec<UserStatsRow>,
    pub total_users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_without_jobs() {
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn success_rate_rounds_to_two_decimals() {
        assert_eq!(success_rate(1, 3), 33.33);
        assert_eq!(success_rate(2, 3), 66.67);
        assert_eq!(success_rate(3, 3), 100.0);
    }
}
