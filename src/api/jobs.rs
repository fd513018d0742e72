//! Job Record Routes
//!
//! Read-only views of the job record store.
//!
//! Routes:
//! - GET /api/jobs - List recent jobs (filters: status, kind, repository_id)
//! - GET /api/jobs/:job_id - Get one job record

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, Job, JobFilter};
use crate::models::{JobKind, JobStatus};
use crate::{AppState, Error, Result};

/// Build job record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:job_id", get(get_job))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub repository_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Job record as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub progress: i64,
    pub repository_id: Option<i64>,
    pub params: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobInfo {
    fn from(job: Job) -> Self {
        Self {
            params: job.params_json(),
            result: job.result_json(),
            id: job.id,
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            repository_id: job.repository_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Response for listing jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobInfo>,
    pub limit: u32,
    pub offset: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/jobs
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>> {
    let limit = query.limit.clamp(1, 100);

    let status = query
        .status
        .as_deref()
        .map(|s| {
            JobStatus::from_str(&s.to_uppercase())
                .ok_or_else(|| Error::Validation(format!("unknown job status '{}'", s)))
        })
        .transpose()?;

    let kind = query
        .kind
        .as_deref()
        .map(|k| {
            JobKind::from_str(&k.to_uppercase())
                .ok_or_else(|| Error::Validation(format!("unknown job kind '{}'", k)))
        })
        .transpose()?;

    let filter = JobFilter {
        status,
        kind,
        repository_id: query.repository_id,
    };

    let jobs = db::list_jobs(&state.db, &filter, limit as i64, query.offset as i64).await?;

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
        limit,
        offset: query.offset,
    }))
}

/// GET /api/jobs/:job_id
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobInfo>> {
    let job = db::get_job(&state.db, &job_id).await?;
    Ok(Json(job.into()))
}
