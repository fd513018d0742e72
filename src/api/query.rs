//! Query Routes
//!
//! Routes:
//! - POST /api/query - Answer a question from an indexed repository's README

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiJson;
use crate::models::RepositoryIdentity;
use crate::services::SourceDocument;
use crate::{db, AppState, Error, Result};

/// Build query routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(query_repository))
}

/// Question about a repository, named by id or by URL.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub repository_id: Option<i64>,
    pub url: Option<String>,
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub repository_id: i64,
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceDocument>,
}

/// Answer a question about an indexed repository.
///
/// POST /api/query
async fn query_repository(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let question = request.query.trim();
    if question.is_empty() {
        return Err(Error::Validation("query must not be empty".to_string()));
    }

    let repo = match (request.repository_id, request.url.as_deref()) {
        (Some(id), _) => db::get_repository(&state.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Repository {} not found", id)))?,
        (None, Some(url)) => {
            let identity = RepositoryIdentity::resolve(url)?;
            db::get_repository_by_url(&state.db, &identity.url())
                .await?
                .ok_or_else(|| Error::NotFound(format!("Repository {} has not been indexed", identity)))?
        }
        (None, None) => {
            return Err(Error::Validation(
                "either repository_id or url is required".to_string(),
            ))
        }
    };

    let kb = db::get_knowledge_base(&state.db, repo.id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Repository {} has not been indexed", repo.full_name())))?;
    let sections = db::list_knowledge_sections(&state.db, kb.id).await?;

    let identity = RepositoryIdentity::new(&repo.owner, &repo.name)?;
    let answer = state.querier.answer(&identity, question, &sections).await?;

    info!(
        repo = %repo.full_name(),
        sections = sections.len(),
        sources = answer.sources.len(),
        "Query answered"
    );

    Ok(Json(QueryResponse {
        repository_id: repo.id,
        query: question.to_string(),
        answer: answer.answer,
        sources: answer.sources,
    }))
}
