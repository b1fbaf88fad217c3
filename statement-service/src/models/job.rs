//! Extraction job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of one PDF processing attempt.
///
/// `Pending -> Processing -> {Success, Failed}`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Failed)
        )
    }

    /// States a job may be in immediately before entering `self`.
    pub fn predecessors(self) -> &'static [JobStatus] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Success | Self::Failed => &[Self::Processing],
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExtractionJob {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub pdf_filename: String,
    pub status: JobStatus,
    pub submitted_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
}

impl ExtractionJob {
    pub fn new(user_id: Uuid, pdf_filename: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            user_id,
            pdf_filename: pdf_filename.into(),
            status: JobStatus::Pending,
            submitted_utc: Utc::now(),
            completed_utc: None,
        }
    }

    /// Move to `next`, stamping the completion time on terminal states.
    /// Returns `false` and leaves the job untouched when the move is illegal.
    pub fn advance(&mut self, next: JobStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_utc = Some(at);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        use JobStatus::*;
        let all = [Pending, Processing, Success, Failed];
        let legal = [(Pending, Processing), (Processing, Success), (Processing, Failed)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn predecessors_agree_with_transitions() {
        use JobStatus::*;
        for to in [Pending, Processing, Success, Failed] {
            for from in to.predecessors() {
                assert!(from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn completion_time_set_exactly_on_terminal_states() {
        let mut job = ExtractionJob::new(Uuid::new_v4(), "march.pdf");
        let now = Utc::now();

        assert!(job.advance(JobStatus::Processing, now));
        assert!(job.completed_utc.is_none());

        assert!(job.advance(JobStatus::Failed, now));
        assert_eq!(job.completed_utc, Some(now));
    }

    #[test]
    fn illegal_transition_leaves_job_untouched() {
        let mut job = ExtractionJob::new(Uuid::new_v4(), "march.pdf");
        let before = job.clone();

        assert!(!job.advance(JobStatus::Success, Utc::now()));
        assert_eq!(job, before);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
