//! API Routes for DeepWiki
//!
//! This module combines all API routes into a single router.

mod github;
mod health;
mod jobs;
mod query;
mod status;
mod wiki;

use axum::extract::FromRequest;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::models::{JobStatus, RepositoryIdentity};
use crate::{AppState, Error};

/// Build the complete API router.
///
/// Route structure:
/// - /, /health, /health/ready - Welcome and health checks
/// - /api/github/* - Repository indexing and README preview
/// - /api/wiki/* - Wiki generation and retrieval
/// - /api/query - Questions about indexed repositories
/// - /api/status/:job_id - Job status polling
/// - /api/jobs/* - Job record views
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/api/github", github::routes())
        .nest("/api/wiki", wiki::routes())
        .nest("/api/query", query::routes())
        .nest("/api/status", status::routes())
        .nest("/api/jobs", jobs::routes())
}

/// The full application with HTTP tracing, request timeout and CORS applied.
pub fn app(state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout();

    Router::new()
        .merge(routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

// ============================================================================
// Shared Request/Response Types
// ============================================================================

/// JSON body extractor; malformed or missing bodies become validation errors.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

/// Request body naming a repository by URL.
#[derive(Debug, Deserialize)]
pub struct RepositoryUrlRequest {
    pub url: String,
}

/// Response for an accepted job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub repository_id: Option<i64>,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub status: JobStatus,
}

impl JobAcceptedResponse {
    fn new(job_id: String, repository_id: Option<i64>, identity: &RepositoryIdentity) -> Self {
        Self {
            job_id,
            repository_id,
            owner: identity.owner.clone(),
            name: identity.name.clone(),
            url: identity.url(),
            status: JobStatus::Pending,
        }
    }
}
