//! Import job models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an import job.
///
/// PENDING -> RUNNING -> {COMPLETED, FAILED}; terminal states are final.
/// Per-file failures never fail a job, only enumeration does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ImportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Which front-end created a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportSourceType {
    Remote,
    Local,
}

impl ImportSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "REMOTE",
            Self::Local => "LOCAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REMOTE" => Some(Self::Remote),
            "LOCAL" => Some(Self::Local),
            _ => None,
        }
    }
}

/// One import run. Counters are monotonic and persisted after every file so
/// a poller observes progress mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub source_type: ImportSourceType,
    pub project_id: String,
    pub status: ImportJobStatus,
    /// Files discovered so far, growing as enumeration proceeds.
    pub total_files: i64,
    /// Successfully imported plus duplicate-skipped files.
    pub processed_files: i64,
    pub failed_files: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl ImportJob {
    pub fn new(source_type: ImportSourceType, project_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_type,
            project_id: project_id.to_string(),
            status: ImportJobStatus::Pending,
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            error_message: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ImportJobStatus::Pending,
            ImportJobStatus::Running,
            ImportJobStatus::Completed,
            ImportJobStatus::Failed,
        ] {
            assert_eq!(ImportJobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ImportJobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ImportJobStatus::Pending.is_terminal());
        assert!(!ImportJobStatus::Running.is_terminal());
        assert!(ImportJobStatus::Completed.is_terminal());
        assert!(ImportJobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = ImportJob::new(ImportSourceType::Remote, "p1");
        assert_eq!(job.status, ImportJobStatus::Pending);
        assert_eq!(job.total_files, 0);
        assert!(job.started_at.is_none());
    }
}
