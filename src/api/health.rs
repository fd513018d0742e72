//! Health Routes
//!
//! Routes:
//! - GET / - Welcome message
//! - GET /health - Basic health check
//! - GET /health/ready - Readiness check (database, task queue and job records)

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{self, DbPool, QueueStats};
use crate::models::JobStatus;
use crate::AppState;

/// Build health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub version: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: Vec<DependencyCheck>,
    pub queue: Option<QueueStats>,
    pub jobs: Option<JobCounts>,
}

/// Job records per lifecycle status.
#[derive(Debug, Default, Serialize)]
pub struct JobCounts {
    pub pending: i64,
    pub started: i64,
    pub progress: i64,
    pub retry: i64,
    pub success: i64,
    pub failure: i64,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the DeepWiki API".to_string(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Basic health check.
///
/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now(),
    })
}

/// Readiness check.
///
/// GET /health/ready
///
/// Returns 503 when the database cannot be reached.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let db_check = match db::health_check(&state.db).await {
        Ok(()) => DependencyCheck {
            name: "database".to_string(),
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            message: None,
        },
        Err(e) => DependencyCheck {
            name: "database".to_string(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(e.to_string()),
        },
    };

    let ready = db_check.status == HealthStatus::Healthy;
    let (queue, jobs) = if ready {
        (state.queue.stats().await.ok(), job_counts(&state.db).await.ok())
    } else {
        (None, None)
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            checks: vec![db_check],
            queue,
            jobs,
        }),
    )
}

async fn job_counts(pool: &DbPool) -> crate::Result<JobCounts> {
    Ok(JobCounts {
        pending: db::count_jobs_by_status(pool, JobStatus::Pending).await?,
        started: db::count_jobs_by_status(pool, JobStatus::Started).await?,
        progress: db::count_jobs_by_status(pool, JobStatus::Progress).await?,
        retry: db::count_jobs_by_status(pool, JobStatus::Retry).await?,
        success: db::count_jobs_by_status(pool, JobStatus::Success).await?,
        failure: db::count_jobs_by_status(pool, JobStatus::Failure).await?,
    })
}
