//! Job dispatch.
//!
//! Submits a job kind's task body to the worker pool and writes the PENDING
//! job record. Dispatch never fails loudly: every problem is logged and
//! reported to the caller as `None`.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::WorkerPool;
use crate::db::{self, CreateJob, DbPool};
use crate::models::JobKind;

/// Submits jobs to a worker pool.
#[derive(Clone)]
pub struct JobDispatcher {
    pool: Arc<dyn WorkerPool>,
    db: DbPool,
}

impl JobDispatcher {
    pub fn new(pool: Arc<dyn WorkerPool>, db: DbPool) -> Self {
        Self { pool, db }
    }

    /// Dispatch a job and return the id the worker pool assigned to it.
    ///
    /// `params` become the task's kwargs. An integer `repository_id` in
    /// `params` links the job record to that repository up front.
    pub async fn dispatch(&self, kind: JobKind, params: serde_json::Value) -> Option<String> {
        let task_name = kind.task_name();

        if !self.pool.is_registered(task_name) {
            error!(
                kind = kind.as_str(),
                task = task_name,
                "Task is not registered with the worker pool, job not dispatched"
            );
            return None;
        }

        let job_id = match self.pool.submit(task_name, params.clone()).await {
            Ok(id) => id,
            Err(e) => {
                error!(kind = kind.as_str(), error = %e, "Failed to submit job to worker pool");
                return None;
            }
        };

        let mut record = CreateJob::new(job_id.clone(), kind).with_params(params.clone());
        if let Some(repository_id) = params.get("repository_id").and_then(|v| v.as_i64()) {
            record = record.with_repository(repository_id);
        }

        // The task is already queued, so a failed write still yields a job.
        // The worker creates the record when it picks the task up.
        if let Err(e) = db::create_job(&self.db, record).await {
            warn!(job_id = %job_id, error = %e, "Failed to write PENDING job record");
        }

        info!(job_id = %job_id, kind = kind.as_str(), "Job dispatched");

        Some(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};
    use crate::services::{PoolError, PoolTaskState, TaskQueue};
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenPool;

    #[async_trait]
    impl WorkerPool for BrokenPool {
        fn is_registered(&self, _task_name: &str) -> bool {
            true
        }

        async fn submit(&self, _task_name: &str, _kwargs: serde_json::Value) -> Result<String, PoolError> {
            Err(PoolError::Unavailable("broker refused connection".to_string()))
        }

        async fn query(&self, _task_id: &str) -> Result<PoolTaskState, PoolError> {
            Err(PoolError::Unavailable("broker refused connection".to_string()))
        }
    }

    async fn setup_db() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_dispatch_writes_pending_record() {
        let db = setup_db().await;
        let dispatcher = JobDispatcher::new(Arc::new(TaskQueue::new(db.clone())), db.clone());

        let job_id = dispatcher
            .dispatch(JobKind::IndexRepository, json!({"url": "https://github.com/acme/widgets"}))
            .await
            .unwrap();

        let job = db::get_job(&db, &job_id).await.unwrap();
        assert_eq!(job.status, "PENDING");
        assert_eq!(job.kind, "INDEX_REPOSITORY");
        assert!(job.repository_id.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_kind_returns_none() {
        let db = setup_db().await;
        let queue = TaskQueue::with_tasks(db.clone(), ["index_repository"]);
        let dispatcher = JobDispatcher::new(Arc::new(queue), db.clone());

        let result = dispatcher.dispatch(JobKind::GenerateWiki, json!({})).await;
        assert!(result.is_none());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_submit_failure_returns_none() {
        let db = setup_db().await;
        let dispatcher = JobDispatcher::new(Arc::new(BrokenPool), db);
        assert!(dispatcher.dispatch(JobKind::IndexRepository, json!({})).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_is_not_idempotent() {
        let db = setup_db().await;
        let dispatcher = JobDispatcher::new(Arc::new(TaskQueue::new(db.clone())), db);
        let params = json!({"url": "https://github.com/acme/widgets"});

        let first = dispatcher.dispatch(JobKind::IndexRepository, params.clone()).await;
        let second = dispatcher.dispatch(JobKind::IndexRepository, params).await;
        assert_ne!(first.unwrap(), second.unwrap());
    }
}
