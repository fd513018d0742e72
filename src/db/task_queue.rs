//! Task queue database queries.
//!
//! Durable SQLite-backed broker and result store for the worker pool:
//! - Atomic task claiming (prevents duplicate processing)
//! - Heartbeat locks and stale task recovery
//! - Progress metadata and terminal results per task

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// Default lock timeout in seconds (5 minutes)
pub const LOCK_TIMEOUT_SECS: i64 = 300;

/// Native task state vocabulary of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Retry,
    Revoked,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Retry => "retry",
            Self::Revoked => "revoked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "started" => Some(Self::Started),
            "progress" => Some(Self::Progress),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "retry" => Some(Self::Retry),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }
}

/// Task record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    pub task_name: String,
    pub kwargs: String,         // JSON
    pub state: String,
    pub result: Option<String>, // JSON
    pub info: Option<String>,   // JSON
    pub traceback: Option<String>,
    pub attempts: i64,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl QueuedTask {
    /// Get state as enum.
    pub fn state_enum(&self) -> Option<TaskState> {
        TaskState::from_str(&self.state)
    }

    /// Parse kwargs JSON.
    pub fn kwargs_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.kwargs).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Parse result JSON.
    pub fn result_json(&self) -> Option<serde_json::Value> {
        self.result
            .as_ref()
            .and_then(|r| serde_json::from_str(r).ok())
    }

    /// Parse info JSON.
    pub fn info_json(&self) -> Option<serde_json::Value> {
        self.info.as_ref().and_then(|i| serde_json::from_str(i).ok())
    }
}

/// Task counts per state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub retry: i64,
    pub success: i64,
    pub failure: i64,
}

// ============================================================================
// Task Queries
// ============================================================================

/// Enqueue a task for a named task body.
pub async fn enqueue_task(
    pool: &DbPool,
    id: &str,
    task_name: &str,
    kwargs: &serde_json::Value,
) -> Result<QueuedTask> {
    let kwargs_json = serde_json::to_string(kwargs)?;

    sqlx::query_as::<_, QueuedTask>(
        r#"
        INSERT INTO task_queue (id, task_name, kwargs)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(task_name)
    .bind(&kwargs_json)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a task by ID (optional).
pub async fn get_task(pool: &DbPool, id: &str) -> Result<Option<QueuedTask>> {
    sqlx::query_as::<_, QueuedTask>("SELECT * FROM task_queue WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

/// Atomically claim the oldest runnable task.
///
/// Returns None if no task is available or another worker won the race.
pub async fn claim_task(pool: &DbPool, worker_id: &str) -> Result<Option<QueuedTask>> {
    let task = sqlx::query_as::<_, QueuedTask>(
        r#"
        UPDATE task_queue SET
            state = 'started',
            attempts = attempts + 1,
            started_at = datetime('now'),
            locked_at = datetime('now'),
            locked_by = ?,
            updated_at = datetime('now')
        WHERE id = (
            SELECT id FROM task_queue
            WHERE state IN ('pending', 'retry')
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
        )
        AND state IN ('pending', 'retry')
        RETURNING *
        "#,
    )
    .bind(worker_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)?;

    Ok(task)
}

/// Record intermediate state and progress metadata for a running task.
pub async fn update_task_state(
    pool: &DbPool,
    id: &str,
    state: TaskState,
    info: Option<&serde_json::Value>,
) -> Result<bool> {
    let info_json = info.map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE task_queue SET
            state = ?,
            info = COALESCE(?, info),
            updated_at = datetime('now')
        WHERE id = ? AND state NOT IN ('success', 'failure', 'revoked')
        "#,
    )
    .bind(state.as_str())
    .bind(&info_json)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Refresh the lock on a task (heartbeat).
pub async fn heartbeat_task(pool: &DbPool, id: &str, worker_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE task_queue SET locked_at = datetime('now')
        WHERE id = ? AND locked_by = ? AND state IN ('started', 'progress')
        "#,
    )
    .bind(id)
    .bind(worker_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Store the return value of a finished task.
pub async fn complete_task(pool: &DbPool, id: &str, result: &serde_json::Value) -> Result<bool> {
    let result_json = serde_json::to_string(result)?;

    let result = sqlx::query(
        r#"
        UPDATE task_queue SET
            state = 'success',
            result = ?,
            locked_at = NULL,
            locked_by = NULL,
            completed_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ? AND state NOT IN ('success', 'failure', 'revoked')
        "#,
    )
    .bind(&result_json)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Store the error of a failed task.
pub async fn fail_task(pool: &DbPool, id: &str, error: &str, traceback: Option<&str>) -> Result<bool> {
    let error_json = serde_json::to_string(error)?;

    let result = sqlx::query(
        r#"
        UPDATE task_queue SET
            state = 'failure',
            result = ?,
            traceback = ?,
            locked_at = NULL,
            locked_by = NULL,
            completed_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ? AND state NOT IN ('success', 'failure', 'revoked')
        "#,
    )
    .bind(&error_json)
    .bind(traceback)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Recover tasks whose worker stopped heartbeating.
///
/// Running tasks with a lock older than `timeout_secs` go back to `retry`
/// so another worker can claim them. Returns the ids of recovered tasks.
pub async fn recover_stale_tasks(pool: &DbPool, timeout_secs: Option<i64>) -> Result<Vec<String>> {
    let timeout = timeout_secs.unwrap_or(LOCK_TIMEOUT_SECS);

    let ids: Vec<(String,)> = sqlx::query_as(
        r#"
        UPDATE task_queue SET
            state = 'retry',
            locked_at = NULL,
            locked_by = NULL,
            updated_at = datetime('now')
        WHERE state IN ('started', 'progress')
        AND locked_at IS NOT NULL
        AND datetime(locked_at, '+' || ? || ' seconds') < datetime('now')
        RETURNING id
        "#,
    )
    .bind(timeout)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// Get task counts per state.
pub async fn get_queue_stats(pool: &DbPool) -> Result<QueueStats> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM task_queue GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut stats = QueueStats::default();
    for (state, count) in rows {
        match TaskState::from_str(&state) {
            Some(TaskState::Pending) => stats.pending += count,
            Some(TaskState::Started) | Some(TaskState::Progress) => stats.running += count,
            Some(TaskState::Retry) => stats.retry += count,
            Some(TaskState::Success) => stats.success += count,
            Some(TaskState::Failure) => stats.failure += count,
            Some(TaskState::Revoked) | None => {}
        }
    }

    Ok(stats)
}
