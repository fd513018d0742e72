//! GitHub Routes
//!
//! Routes:
//! - POST /api/github/repository - Queue an index job for a repository
//! - POST /api/github/readme - Fetch a repository README synchronously

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{ApiJson, JobAcceptedResponse, RepositoryUrlRequest};
use crate::models::{JobKind, RepositoryIdentity};
use crate::{db, AppState, Error, Result};

/// Build GitHub routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/repository", post(index_repository))
        .route("/readme", post(get_readme))
}

/// README preview response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadmeResponse {
    pub owner: String,
    pub name: String,
    pub content: String,
}

/// Queue indexing of a repository.
///
/// POST /api/github/repository
async fn index_repository(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RepositoryUrlRequest>,
) -> Result<(StatusCode, Json<JobAcceptedResponse>)> {
    let identity = RepositoryIdentity::resolve(&request.url)?;

    let repository_id = db::get_repository_by_url(&state.db, &identity.url())
        .await?
        .map(|r| r.id);

    let params = json!({
        "url": identity.url(),
        "owner": identity.owner,
        "name": identity.name,
        "repository_id": repository_id,
    });

    let job_id = state
        .dispatcher
        .dispatch(JobKind::IndexRepository, params)
        .await
        .ok_or_else(|| {
            Error::DispatchFailed(format!("indexing of {} could not be queued", identity))
        })?;

    info!(job_id = %job_id, repo = %identity, "Index job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse::new(job_id, repository_id, &identity)),
    ))
}

/// Fetch a README, bounded by the GitHub request timeout.
///
/// POST /api/github/readme
async fn get_readme(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RepositoryUrlRequest>,
) -> Result<Json<ReadmeResponse>> {
    let identity = RepositoryIdentity::resolve(&request.url)?;
    let content = state.fetcher.fetch_primary_document(&identity).await?;

    Ok(Json(ReadmeResponse {
        owner: identity.owner,
        name: identity.name,
        content,
    }))
}
