//! Job status reporting.
//!
//! Normalizes the worker pool's view of a job into a [`JobStatusReport`].
//! Reporting is read-only and always produces a report, falling back to
//! the synthetic UNKNOWN and ERROR_FETCHING_STATUS statuses.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::{PoolError, PoolTaskState, WorkerPool};
use crate::db::TaskState;
use crate::models::{JobStatus, JobStatusReport};

/// Answers status polls for dispatched jobs.
#[derive(Clone)]
pub struct JobStatusReporter {
    pool: Arc<dyn WorkerPool>,
}

impl JobStatusReporter {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: &str) -> JobStatusReport {
        match self.pool.query(job_id).await {
            Ok(task) => {
                let report = normalize(job_id, task);
                debug!(job_id, status = %report.status, "Job status fetched");
                report
            }
            Err(PoolError::Unavailable(msg)) => {
                warn!(job_id, error = %msg, "Worker pool unavailable while fetching job status");
                JobStatusReport::synthetic(
                    job_id,
                    JobStatus::Unknown,
                    format!("Worker pool connection error: {}", msg),
                )
            }
            Err(e) => {
                error!(job_id, error = %e, "Failed to fetch job status");
                JobStatusReport::synthetic(job_id, JobStatus::ErrorFetchingStatus, e.to_string())
            }
        }
    }
}

fn map_state(state: TaskState) -> JobStatus {
    match state {
        TaskState::Pending => JobStatus::Pending,
        TaskState::Started => JobStatus::Started,
        TaskState::Progress => JobStatus::Progress,
        TaskState::Success => JobStatus::Success,
        TaskState::Failure => JobStatus::Failure,
        TaskState::Retry => JobStatus::Retry,
        TaskState::Revoked => JobStatus::Revoked,
    }
}

fn normalize(job_id: &str, task: PoolTaskState) -> JobStatusReport {
    let status = map_state(task.state);

    let result = match task.state {
        TaskState::Failure => {
            let description = match task.result {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "unknown error".to_string(),
            };
            Some(Value::String(format!("Failure: {}", description)))
        }
        TaskState::Success => task.result,
        _ => None,
    };

    JobStatusReport {
        job_id: job_id.to_string(),
        status,
        result,
        details: task.info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Pool that answers every query with a fixed outcome.
    struct FixedPool(Result<PoolTaskState, PoolError>);

    #[async_trait]
    impl WorkerPool for FixedPool {
        fn is_registered(&self, _task_name: &str) -> bool {
            true
        }

        async fn submit(&self, _task_name: &str, _kwargs: Value) -> Result<String, PoolError> {
            Ok("job-1".to_string())
        }

        async fn query(&self, _task_id: &str) -> Result<PoolTaskState, PoolError> {
            self.0.clone()
        }
    }

    fn reporter(outcome: Result<PoolTaskState, PoolError>) -> JobStatusReporter {
        JobStatusReporter::new(Arc::new(FixedPool(outcome)))
    }

    fn task(state: TaskState, result: Option<Value>, info: Option<Value>) -> PoolTaskState {
        PoolTaskState {
            state,
            result,
            info,
            traceback: None,
        }
    }

    #[tokio::test]
    async fn test_success_passes_payload_through() {
        let report = reporter(Ok(task(TaskState::Success, Some(json!({"documents": 1})), None)))
            .status("job-1")
            .await;
        assert_eq!(report.status, JobStatus::Success);
        assert_eq!(report.result, Some(json!({"documents": 1})));
    }

    #[tokio::test]
    async fn test_failure_wraps_error() {
        let report = reporter(Ok(task(
            TaskState::Failure,
            Some(json!("Request timed out: 10s")),
            None,
        )))
        .status("job-1")
        .await;
        assert_eq!(report.status, JobStatus::Failure);
        assert_eq!(report.result, Some(json!("Failure: Request timed out: 10s")));
    }

    #[tokio::test]
    async fn test_progress_carries_details() {
        let info = json!({"progress": 20, "message": "Content fetched"});
        let report = reporter(Ok(task(TaskState::Progress, None, Some(info.clone()))))
            .status("job-1")
            .await;
        assert_eq!(report.status, JobStatus::Progress);
        assert!(report.result.is_none());
        assert_eq!(report.details, Some(info));
    }

    #[tokio::test]
    async fn test_unavailable_pool_is_unknown() {
        let report = reporter(Err(PoolError::Unavailable("connection refused".into())))
            .status("job-1")
            .await;
        assert_eq!(report.status, JobStatus::Unknown);
        assert_eq!(
            report.result,
            Some(json!("Worker pool connection error: connection refused"))
        );
    }

    #[tokio::test]
    async fn test_query_error_is_error_fetching_status() {
        let report = reporter(Err(PoolError::Backend("no such table".into())))
            .status("job-1")
            .await;
        assert_eq!(report.status, JobStatus::ErrorFetchingStatus);
        assert_eq!(report.job_id, "job-1");
        assert!(report.result.unwrap().as_str().unwrap().contains("no such table"));
    }
}
