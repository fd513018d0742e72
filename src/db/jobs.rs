//! Job record store queries.
//!
//! One row per dispatched job, keyed by the id the worker pool assigned.
//! Status writes follow a few rules:
//! - a terminal status (SUCCESS, FAILURE, REVOKED) is never overwritten
//! - progress only moves forward while the job is running
//! - `updated_at` is refreshed on every write

use crate::models::{JobKind, JobStatus};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite};

use super::DbPool;

/// Guard appended to every status write.
const NOT_TERMINAL: &str = "status NOT IN ('SUCCESS', 'FAILURE', 'REVOKED')";

/// Job record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: String,
    pub repository_id: Option<i64>,
    pub status: String,
    pub progress: i64,
    pub params: Option<String>, // JSON
    pub result: Option<String>, // JSON
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Get kind as enum.
    pub fn kind_enum(&self) -> Option<JobKind> {
        JobKind::from_str(&self.kind)
    }

    /// Get status as enum.
    pub fn status_enum(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }

    /// Check if the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status_enum().map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// Parse result JSON.
    pub fn result_json(&self) -> Option<serde_json::Value> {
        self.result
            .as_ref()
            .and_then(|r| serde_json::from_str(r).ok())
    }

    /// Parse params JSON.
    pub fn params_json(&self) -> Option<serde_json::Value> {
        self.params
            .as_ref()
            .and_then(|p| serde_json::from_str(p).ok())
    }
}

/// Input for creating a job record.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub id: String,
    pub kind: JobKind,
    pub repository_id: Option<i64>,
    pub params: Option<serde_json::Value>,
}

impl CreateJob {
    pub fn new(id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            repository_id: None,
            params: None,
        }
    }

    /// Link the job to a known repository.
    pub fn with_repository(mut self, repository_id: i64) -> Self {
        self.repository_id = Some(repository_id);
        self
    }

    /// Set the dispatch parameters.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Filter for listing job records.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub repository_id: Option<i64>,
}

// ============================================================================
// Job Queries
// ============================================================================

/// Create a new PENDING job record.
pub async fn create_job<'e, E>(executor: E, input: CreateJob) -> Result<Job>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let params_json = input.params.as_ref().map(serde_json::to_string).transpose()?;

    let job = sqlx::query_as::<_, Job>(
        r#"
        INSERT INTO jobs (id, kind, repository_id, status, progress, params)
        VALUES (?, ?, ?, 'PENDING', 0, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(input.kind.as_str())
    .bind(input.repository_id)
    .bind(&params_json)
    .fetch_one(executor)
    .await?;

    Ok(job)
}

/// Create the job record unless it already exists.
///
/// Used by the worker when it picks up a task whose record the dispatcher
/// could not write. Returns true when a row was inserted.
pub async fn ensure_job<'e, E>(executor: E, input: CreateJob) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let params_json = input.params.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (id, kind, repository_id, status, progress, params)
        VALUES (?, ?, ?, 'PENDING', 0, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&input.id)
    .bind(input.kind.as_str())
    .bind(input.repository_id)
    .bind(&params_json)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get a job by ID.
pub async fn get_job(pool: &DbPool, id: &str) -> Result<Job> {
    get_job_optional(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Job not found: {}", id)))
}

/// Get a job by ID (optional).
pub async fn get_job_optional<'e, E>(executor: E, id: &str) -> Result<Option<Job>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(Error::Database)
}

/// Record a non-terminal status transition (STARTED, PROGRESS, RETRY).
///
/// Returns None when the job is unknown or already terminal.
pub async fn update_job_status<'e, E>(
    executor: E,
    id: &str,
    status: JobStatus,
    progress: Option<i64>,
) -> Result<Option<Job>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    if status.is_terminal() {
        return Err(Error::Internal(format!(
            "terminal status {} must go through complete_job or fail_job",
            status
        )));
    }

    let query = format!(
        r#"
        UPDATE jobs SET
            status = ?,
            progress = MAX(progress, COALESCE(?, progress)),
            updated_at = datetime('now')
        WHERE id = ? AND {}
        RETURNING *
        "#,
        NOT_TERMINAL
    );

    sqlx::query_as::<_, Job>(&query)
        .bind(status.as_str())
        .bind(progress.map(|p| p.clamp(0, 100)))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(Error::Database)
}

/// Backfill the repository a job operates on.
pub async fn link_job_repository<'e, E>(executor: E, id: &str, repository_id: i64) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE jobs SET
            repository_id = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(repository_id)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Mark a job SUCCESS with its result payload.
pub async fn complete_job<'e, E>(
    executor: E,
    id: &str,
    result: &serde_json::Value,
) -> Result<Option<Job>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result_json = serde_json::to_string(result)?;
    let query = format!(
        r#"
        UPDATE jobs SET
            status = 'SUCCESS',
            progress = 100,
            result = ?,
            updated_at = datetime('now')
        WHERE id = ? AND {}
        RETURNING *
        "#,
        NOT_TERMINAL
    );

    sqlx::query_as::<_, Job>(&query)
        .bind(&result_json)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(Error::Database)
}

/// Mark a job FAILURE with structured error info.
pub async fn fail_job<'e, E>(
    executor: E,
    id: &str,
    error: &serde_json::Value,
) -> Result<Option<Job>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let error_json = serde_json::to_string(error)?;
    let query = format!(
        r#"
        UPDATE jobs SET
            status = 'FAILURE',
            result = ?,
            updated_at = datetime('now')
        WHERE id = ? AND {}
        RETURNING *
        "#,
        NOT_TERMINAL
    );

    sqlx::query_as::<_, Job>(&query)
        .bind(&error_json)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(Error::Database)
}

/// List job records, newest first.
pub async fn list_jobs(pool: &DbPool, filter: &JobFilter, limit: i64, offset: i64) -> Result<Vec<Job>> {
    let mut conditions = Vec::new();

    if filter.status.is_some() {
        conditions.push("status = ?");
    }
    if filter.kind.is_some() {
        conditions.push("kind = ?");
    }
    if filter.repository_id.is_some() {
        conditions.push("repository_id = ?");
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let query = format!(
        r#"
        SELECT * FROM jobs
        {}
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
        where_clause
    );

    let mut q = sqlx::query_as::<_, Job>(&query);
    if let Some(status) = filter.status {
        q = q.bind(status.as_str());
    }
    if let Some(kind) = filter.kind {
        q = q.bind(kind.as_str());
    }
    if let Some(repository_id) = filter.repository_id {
        q = q.bind(repository_id);
    }
    q = q.bind(limit).bind(offset);

    q.fetch_all(pool).await.map_err(Error::Database)
}

/// Count job records in a status.
pub async fn count_jobs_by_status(pool: &DbPool, status: JobStatus) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};
    use serde_json::json;

    async fn setup_test_db() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let pool = setup_test_db().await;

        let job = create_job(
            &pool,
            CreateJob::new("job-1", JobKind::IndexRepository)
                .with_params(json!({"url": "https://github.com/acme/widgets"})),
        )
        .await
        .unwrap();
        assert_eq!(job.status, "PENDING");
        assert_eq!(job.progress, 0);
        assert_eq!(job.kind_enum(), Some(JobKind::IndexRepository));
        assert_eq!(
            job.params_json().unwrap()["url"],
            "https://github.com/acme/widgets"
        );

        let job = update_job_status(&pool, "job-1", JobStatus::Started, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, "STARTED");

        let job = update_job_status(&pool, "job-1", JobStatus::Progress, Some(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.progress, 50);

        let job = complete_job(&pool, "job-1", &json!({"documents": 1}))
            .await
            .unwrap()
            .unwrap();
        assert!(job.is_finished());
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_json().unwrap()["documents"], 1);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let pool = setup_test_db().await;
        create_job(&pool, CreateJob::new("job-1", JobKind::GenerateWiki))
            .await
            .unwrap();

        update_job_status(&pool, "job-1", JobStatus::Progress, Some(80))
            .await
            .unwrap();
        let job = update_job_status(&pool, "job-1", JobStatus::Progress, Some(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.progress, 80);
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_overwritten() {
        let pool = setup_test_db().await;
        create_job(&pool, CreateJob::new("job-1", JobKind::IndexRepository))
            .await
            .unwrap();

        fail_job(&pool, "job-1", &json!({"error": "boom"}))
            .await
            .unwrap()
            .unwrap();

        let updated = update_job_status(&pool, "job-1", JobStatus::Progress, Some(90))
            .await
            .unwrap();
        assert!(updated.is_none());
        let completed = complete_job(&pool, "job-1", &json!({})).await.unwrap();
        assert!(completed.is_none());

        let job = get_job(&pool, "job-1").await.unwrap();
        assert_eq!(job.status, "FAILURE");
        assert_eq!(job.result_json().unwrap()["error"], "boom");
    }

    #[tokio::test]
    async fn test_terminal_status_rejected_by_update() {
        let pool = setup_test_db().await;
        create_job(&pool, CreateJob::new("job-1", JobKind::IndexRepository))
            .await
            .unwrap();

        let result = update_job_status(&pool, "job-1", JobStatus::Success, Some(100)).await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_ensure_job_is_insert_or_ignore() {
        let pool = setup_test_db().await;
        let inserted = ensure_job(&pool, CreateJob::new("job-1", JobKind::GenerateWiki))
            .await
            .unwrap();
        assert!(inserted);

        update_job_status(&pool, "job-1", JobStatus::Started, None)
            .await
            .unwrap();

        let inserted = ensure_job(&pool, CreateJob::new("job-1", JobKind::GenerateWiki))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(get_job(&pool, "job-1").await.unwrap().status, "STARTED");
    }

    #[tokio::test]
    async fn test_list_jobs_with_filter() {
        let pool = setup_test_db().await;
        create_job(&pool, CreateJob::new("job-1", JobKind::IndexRepository))
            .await
            .unwrap();
        create_job(&pool, CreateJob::new("job-2", JobKind::GenerateWiki))
            .await
            .unwrap();
        complete_job(&pool, "job-2", &json!({})).await.unwrap();

        let all = list_jobs(&pool, &JobFilter::default(), 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "job-2");

        let filter = JobFilter {
            status: Some(JobStatus::Success),
            ..Default::default()
        };
        let done = list_jobs(&pool, &filter, 10, 0).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "job-2");

        let filter = JobFilter {
            kind: Some(JobKind::IndexRepository),
            ..Default::default()
        };
        let index_jobs = list_jobs(&pool, &filter, 10, 0).await.unwrap();
        assert_eq!(index_jobs.len(), 1);

        assert_eq!(count_jobs_by_status(&pool, JobStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_job_is_not_found() {
        let pool = setup_test_db().await;
        let result = get_job(&pool, "missing").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
