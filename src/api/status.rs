//! Job Status Routes
//!
//! Routes:
//! - GET /api/status/:job_id - Poll the status of a dispatched job
//!
//! Always answers 200 with a well-formed report; an unreachable worker pool
//! shows up as a synthetic status, not as an HTTP error.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::models::JobStatusReport;
use crate::AppState;

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/:job_id", get(get_status))
}

/// GET /api/status/:job_id
async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<JobStatusReport> {
    Json(state.reporter.status(&job_id).await)
}
