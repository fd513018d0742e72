//! Job vocabulary shared by the dispatcher, the status reporter and the
//! worker tasks.

use serde::{Deserialize, Serialize};

/// Kind of asynchronous work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    IndexRepository,
    GenerateWiki,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::IndexRepository, JobKind::GenerateWiki];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::IndexRepository => "INDEX_REPOSITORY",
            JobKind::GenerateWiki => "GENERATE_WIKI",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INDEX_REPOSITORY" => Some(JobKind::IndexRepository),
            "GENERATE_WIKI" => Some(JobKind::GenerateWiki),
            _ => None,
        }
    }

    /// Name the task body is registered under in the worker pool.
    pub fn task_name(&self) -> &'static str {
        match self {
            JobKind::IndexRepository => "index_repository",
            JobKind::GenerateWiki => "generate_wiki",
        }
    }

    pub fn from_task_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.task_name() == name)
    }
}

/// Job status as seen by API clients and stored in the job record store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Retry,
    Revoked,
    /// Synthetic: the worker pool could not be reached.
    Unknown,
    /// Synthetic: querying the worker pool raised an error.
    ErrorFetchingStatus,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Started => "STARTED",
            JobStatus::Progress => "PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Retry => "RETRY",
            JobStatus::Revoked => "REVOKED",
            JobStatus::Unknown => "UNKNOWN",
            JobStatus::ErrorFetchingStatus => "ERROR_FETCHING_STATUS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "STARTED" => Some(JobStatus::Started),
            "PROGRESS" => Some(JobStatus::Progress),
            "SUCCESS" => Some(JobStatus::Success),
            "FAILURE" => Some(JobStatus::Failure),
            "RETRY" => Some(JobStatus::Retry),
            "REVOKED" => Some(JobStatus::Revoked),
            "UNKNOWN" => Some(JobStatus::Unknown),
            "ERROR_FETCHING_STATUS" => Some(JobStatus::ErrorFetchingStatus),
            _ => None,
        }
    }

    /// SUCCESS, FAILURE and REVOKED end a job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure | JobStatus::Revoked)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-formed answer to a status poll. Produced for every job id, including
/// unknown ones and ones whose status could not be fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: JobStatus,
    /// Task payload on success, error description on failure, diagnostic
    /// text for synthetic statuses, otherwise null.
    pub result: Option<serde_json::Value>,
    /// Incremental progress metadata reported by the running task.
    pub details: Option<serde_json::Value>,
}

impl JobStatusReport {
    pub fn synthetic(job_id: &str, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            result: Some(serde_json::Value::String(message.into())),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_value(JobStatus::ErrorFetchingStatus).unwrap();
        assert_eq!(json, "ERROR_FETCHING_STATUS");
        for status in [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::Progress,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Retry,
            JobStatus::Revoked,
            JobStatus::Unknown,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failure.is_terminal());
        assert!(JobStatus::Revoked.is_terminal());
        assert!(!JobStatus::Progress.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_kind_task_names() {
        assert_eq!(
            JobKind::from_task_name("index_repository"),
            Some(JobKind::IndexRepository)
        );
        assert_eq!(JobKind::from_task_name("generate_wiki"), Some(JobKind::GenerateWiki));
        assert_eq!(JobKind::from_task_name("nope"), None);
        assert_eq!(JobKind::from_str(JobKind::GenerateWiki.as_str()), Some(JobKind::GenerateWiki));
    }
}
