//! Wiki Routes
//!
//! Routes:
//! - POST /api/wiki/generate - Queue wiki generation for an indexed repository
//! - GET /api/wiki/:owner/:name - Get the stored wiki page with its navigation tree

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{ApiJson, JobAcceptedResponse, RepositoryUrlRequest};
use crate::models::{JobKind, RepositoryIdentity};
use crate::services::markdown::{build_navigation, extract_headings, NavigationItem};
use crate::{db, AppState, Error, Result};

/// Build wiki routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_wiki))
        .route("/:owner/:name", get(get_wiki))
}

/// Stored wiki page.
#[derive(Debug, Serialize, Deserialize)]
pub struct WikiResponse {
    pub repository_id: i64,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub content: String,
    /// Heading tree of `content`
    pub navigation: Vec<NavigationItem>,
    pub version: i64,
    pub generated_at: String,
}

/// Queue wiki generation.
///
/// POST /api/wiki/generate
async fn generate_wiki(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RepositoryUrlRequest>,
) -> Result<(StatusCode, Json<JobAcceptedResponse>)> {
    let identity = RepositoryIdentity::resolve(&request.url)?;

    // Missing repositories are reported by the job itself.
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
        .dispatch(JobKind::GenerateWiki, params)
        .await
        .ok_or_else(|| {
            Error::DispatchFailed(format!("wiki generation for {} could not be queued", identity))
        })?;

    info!(job_id = %job_id, repo = %identity, "Wiki job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse::new(job_id, repository_id, &identity)),
    ))
}

/// Get the wiki page of a repository.
///
/// GET /api/wiki/:owner/:name
async fn get_wiki(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<WikiResponse>> {
    let identity = RepositoryIdentity::new(&owner, &name)?;

    let repo = db::get_repository_by_url(&state.db, &identity.url())
        .await?
        .ok_or_else(|| Error::NotFound(format!("Repository {} has not been indexed", identity)))?;

    let doc = db::get_wiki_document(&state.db, repo.id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No wiki has been generated for {}", identity)))?;

    let navigation = build_navigation(&extract_headings(&doc.content));

    Ok(Json(WikiResponse {
        repository_id: repo.id,
        owner: repo.owner,
        name: repo.name,
        url: repo.url,
        content: doc.content,
        navigation,
        version: doc.version,
        generated_at: doc.generated_at,
    }))
}
