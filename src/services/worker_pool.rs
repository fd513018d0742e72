//! Worker pool abstraction and its SQLite-backed implementation.
//!
//! The dispatcher and the status reporter only see [`WorkerPool`]. The
//! [`TaskQueue`] implementation additionally exposes the broker operations
//! the [`JobWorker`](super::JobWorker) uses to execute tasks.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{self, DbPool, QueueStats, QueuedTask, TaskState};
use crate::models::{new_id, JobKind, JobStatus};
use crate::Error;

/// Errors raised by a worker pool.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// The pool's broker or result store cannot be reached.
    #[error("Worker pool unavailable: {0}")]
    Unavailable(String),

    #[error("Task not registered: {0}")]
    NotRegistered(String),

    #[error("Worker pool error: {0}")]
    Backend(String),
}

impl From<Error> for PoolError {
    fn from(err: Error) -> Self {
        match err {
            Error::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => Self::Unavailable(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Native view of a task as the pool reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolTaskState {
    pub state: TaskState,
    /// Return value on success, error description on failure
    pub result: Option<serde_json::Value>,
    /// Progress metadata reported while running
    pub info: Option<serde_json::Value>,
    pub traceback: Option<String>,
}

impl PoolTaskState {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            result: None,
            info: None,
            traceback: None,
        }
    }
}

impl From<QueuedTask> for PoolTaskState {
    fn from(task: QueuedTask) -> Self {
        Self {
            state: task.state_enum().unwrap_or(TaskState::Pending),
            result: task.result_json(),
            info: task.info_json(),
            traceback: task.traceback,
        }
    }
}

/// Minimal contract of an external execution substrate.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Whether a task body is registered under `task_name`.
    fn is_registered(&self, task_name: &str) -> bool;

    /// Submit work and return the id the pool assigned to it.
    async fn submit(&self, task_name: &str, kwargs: serde_json::Value) -> Result<String, PoolError>;

    /// Current state of a task. Ids the pool has never seen report `pending`.
    async fn query(&self, task_id: &str) -> Result<PoolTaskState, PoolError>;
}

/// Durable task queue stored in the application database.
#[derive(Clone)]
pub struct TaskQueue {
    db: DbPool,
    registered: HashSet<String>,
}

impl TaskQueue {
    /// Queue with every job kind's task body registered.
    pub fn new(db: DbPool) -> Self {
        Self::with_tasks(db, JobKind::ALL.iter().map(|k| k.task_name()))
    }

    /// Queue accepting only the given task names.
    pub fn with_tasks<I, S>(db: DbPool, task_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            db,
            registered: task_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Atomically claim the next runnable task for `worker_id`.
    pub async fn claim(&self, worker_id: &str) -> crate::Result<Option<QueuedTask>> {
        db::claim_task(&self.db, worker_id).await
    }

    /// Record progress metadata for a running task.
    pub async fn update_state(
        &self,
        task_id: &str,
        state: TaskState,
        info: &serde_json::Value,
    ) -> crate::Result<bool> {
        db::update_task_state(&self.db, task_id, state, Some(info)).await
    }

    pub async fn mark_success(&self, task_id: &str, result: &serde_json::Value) -> crate::Result<bool> {
        db::complete_task(&self.db, task_id, result).await
    }

    pub async fn mark_failure(
        &self,
        task_id: &str,
        error: &str,
        traceback: Option<&str>,
    ) -> crate::Result<bool> {
        db::fail_task(&self.db, task_id, error, traceback).await
    }

    pub async fn heartbeat(&self, task_id: &str, worker_id: &str) -> crate::Result<bool> {
        db::heartbeat_task(&self.db, task_id, worker_id).await
    }

    /// Hand tasks without a recent heartbeat back to the queue.
    ///
    /// The job records of recovered tasks move to RETRY as well.
    pub async fn recover_stale(&self, stale_after_secs: i64) -> crate::Result<u64> {
        let recovered = db::recover_stale_tasks(&self.db, Some(stale_after_secs)).await?;

        for task_id in &recovered {
            if let Err(e) = db::update_job_status(&self.db, task_id, JobStatus::Retry, None).await {
                warn!(task_id = %task_id, error = %e, "Failed to mark recovered job for retry");
            }
        }

        Ok(recovered.len() as u64)
    }

    pub async fn stats(&self) -> crate::Result<QueueStats> {
        db::get_queue_stats(&self.db).await
    }
}

#[async_trait]
impl WorkerPool for TaskQueue {
    fn is_registered(&self, task_name: &str) -> bool {
        self.registered.contains(task_name)
    }

    async fn submit(&self, task_name: &str, kwargs: serde_json::Value) -> Result<String, PoolError> {
        if !self.is_registered(task_name) {
            return Err(PoolError::NotRegistered(task_name.to_string()));
        }

        let id = new_id();
        db::enqueue_task(&self.db, &id, task_name, &kwargs).await?;
        debug!(task_id = %id, task = task_name, "Task enqueued");

        Ok(id)
    }

    async fn query(&self, task_id: &str) -> Result<PoolTaskState, PoolError> {
        let task = db::get_task(&self.db, task_id).await?;
        Ok(task.map(PoolTaskState::from).unwrap_or_else(PoolTaskState::pending))
    }
}
