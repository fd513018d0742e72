//! Task bodies executed by the job worker.
//!
//! Each body drives one job through its status transitions, reporting
//! progress to both the task queue (status poll details) and the job
//! record store. Database work happens in short transactions that are
//! never held across a fetch or a pipeline call. A failing body rolls back
//! its transaction, records FAILURE in a separate write, and returns the
//! error so the queue marks the task failed as well.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{markdown, ContentFetcher, ContentGenerator, ContentIndexer, FetchError, TaskQueue};
use crate::db::{self, CreateJob, DbPool, TaskState};
use crate::models::{JobKind, JobStatus, RepositoryIdentity};
use crate::{Error, Result};

/// Dependencies shared by all task bodies.
#[derive(Clone)]
pub struct TaskContext {
    pub db: DbPool,
    pub queue: TaskQueue,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub indexer: Arc<dyn ContentIndexer>,
    pub generator: Arc<dyn ContentGenerator>,
}

impl TaskContext {
    /// Report a non-terminal transition for a job.
    async fn report(&self, job_id: &str, status: JobStatus, progress: i64, message: &str) {
        let state = match status {
            JobStatus::Started => TaskState::Started,
            _ => TaskState::Progress,
        };
        let meta = json!({ "progress": progress, "message": message });

        if let Err(e) = self.queue.update_state(job_id, state, &meta).await {
            warn!(job_id, error = %e, "Failed to record task progress");
        }
        if let Err(e) = db::update_job_status(&self.db, job_id, status, Some(progress)).await {
            warn!(job_id, error = %e, "Failed to update job record progress");
        }
    }

    /// Write FAILURE to the job record in its own committed statement.
    async fn record_failure(&self, job_id: &str, err: &Error) {
        let payload = json!({
            "error": err.to_string(),
            "error_type": err.kind(),
            "traceback": error_chain(err),
        });

        match db::fail_job(&self.db, job_id, &payload).await {
            Ok(_) => warn!(job_id, error = %err, error_type = err.kind(), "Job failed"),
            Err(e) => warn!(job_id, error = %e, "Failed to record job failure"),
        }
    }
}

/// Run the task body registered for `kind`.
pub async fn run_task(ctx: &TaskContext, kind: JobKind, job_id: &str, kwargs: &Value) -> Result<Value> {
    // A re-claimed task whose job already committed must not run again.
    if let Some(job) = db::get_job_optional(&ctx.db, job_id).await? {
        if job.is_finished() {
            info!(job_id, status = %job.status, "Job already finished, skipping task body");
            return match job.status_enum() {
                Some(JobStatus::Success) => Ok(job.result_json().unwrap_or(Value::Null)),
                _ => Err(Error::Internal(format!(
                    "job {} already finished with status {}",
                    job_id, job.status
                ))),
            };
        }
    }

    // Dispatch may have queued the task without managing to write the record.
    let record = CreateJob::new(job_id, kind).with_params(kwargs.clone());
    if let Err(e) = db::ensure_job(&ctx.db, record).await {
        warn!(job_id, error = %e, "Failed to ensure job record");
    }

    let outcome = match kind {
        JobKind::IndexRepository => index_repository(ctx, job_id, kwargs).await,
        JobKind::GenerateWiki => generate_wiki(ctx, job_id, kwargs).await,
    };

    if let Err(e) = &outcome {
        ctx.record_failure(job_id, e).await;
    }

    outcome
}

/// Index a repository's README into its knowledge base.
///
/// STARTED, PROGRESS(20) after fetch, PROGRESS(50) after indexing, then
/// SUCCESS with the repository and knowledge base persisted together.
async fn index_repository(ctx: &TaskContext, job_id: &str, kwargs: &Value) -> Result<Value> {
    let identity = identity_from_kwargs(kwargs)?;
    info!(job_id, repo = %identity, "Indexing repository");

    ctx.report(job_id, JobStatus::Started, 0, "Fetching repository content").await;

    let text = match ctx.fetcher.fetch_primary_document(&identity).await {
        Ok(text) => text,
        Err(FetchError::NotFound(msg)) => {
            warn!(job_id, repo = %identity, reason = %msg, "No README found, indexing zero documents");
            String::new()
        }
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        warn!(job_id, repo = %identity, "Repository content is empty");
    }

    ctx.report(job_id, JobStatus::Progress, 20, "Content fetched").await;

    let metadata = json!({
        "source": "readme",
        "owner": identity.owner,
        "name": identity.name,
        "url": identity.url(),
    });
    let summary = ctx.indexer.index(&identity, &text, &metadata).await?;

    ctx.report(job_id, JobStatus::Progress, 50, "Content indexed").await;

    let mut tx = ctx.db.begin().await?;

    let repo = db::upsert_repository(&mut *tx, &identity).await?;
    let repo = db::mark_repository_indexed(&mut *tx, repo.id).await?;
    let kb = db::add_knowledge_base_documents(&mut *tx, repo.id, summary.documents).await?;
    let stored_sections =
        db::replace_knowledge_sections(&mut *tx, kb.id, &markdown::split_sections(&text)).await?;
    db::link_job_repository(&mut *tx, job_id, repo.id).await?;

    let result = json!({
        "repository_id": repo.id,
        "knowledge_base_id": kb.id,
        "owner": repo.owner,
        "name": repo.name,
        "url": repo.url,
        "documents_indexed": summary.documents,
        "document_count": kb.document_count,
        "sections": summary.sections,
        "stored_sections": stored_sections,
        "characters": summary.characters,
    });
    db::complete_job(&mut *tx, job_id, &result).await?;

    tx.commit().await?;

    info!(
        job_id,
        repo = %identity,
        documents = summary.documents,
        document_count = kb.document_count,
        "Repository indexed"
    );

    Ok(result)
}

/// Generate and store the wiki page of an indexed repository.
///
/// STARTED, PROGRESS(30) before generation, PROGRESS(80) before saving,
/// then SUCCESS with the document version bumped.
async fn generate_wiki(ctx: &TaskContext, job_id: &str, kwargs: &Value) -> Result<Value> {
    let identity = identity_from_kwargs(kwargs)?;
    info!(job_id, repo = %identity, "Generating wiki");

    ctx.report(job_id, JobStatus::Started, 0, "Looking up repository").await;

    let repo = db::get_repository_by_url(&ctx.db, &identity.url())
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Repository {} not found, index it before generating a wiki",
                identity
            ))
        })?;

    let source = ctx.fetcher.fetch_primary_document(&identity).await?;

    ctx.report(job_id, JobStatus::Progress, 30, "Generating wiki content").await;

    let content = ctx.generator.generate(&identity, &source).await?;
    if content.trim().is_empty() {
        return Err(Error::Generation(format!(
            "no content was generated for {}",
            identity
        )));
    }

    ctx.report(job_id, JobStatus::Progress, 80, "Saving wiki document").await;

    let mut tx = ctx.db.begin().await?;

    let doc = db::save_wiki_document(&mut *tx, repo.id, &content).await?;
    db::link_job_repository(&mut *tx, job_id, repo.id).await?;

    let result = json!({
        "repository_id": repo.id,
        "wiki_document_id": doc.id,
        "owner": repo.owner,
        "name": repo.name,
        "version": doc.version,
        "characters": content.chars().count(),
    });
    db::complete_job(&mut *tx, job_id, &result).await?;

    tx.commit().await?;

    info!(job_id, repo = %identity, version = doc.version, "Wiki generated");

    Ok(result)
}

fn identity_from_kwargs(kwargs: &Value) -> Result<RepositoryIdentity> {
    let url = kwargs
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("task kwargs are missing 'url'".to_string()))?;
    RepositoryIdentity::resolve(url)
}

/// Render an error and its sources, outermost first.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_kwargs() {
        let identity =
            identity_from_kwargs(&json!({"url": "https://github.com/acme/widgets.git"})).unwrap();
        assert_eq!(identity.canonical_id, "acme_widgets");

        assert!(matches!(
            identity_from_kwargs(&json!({})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            identity_from_kwargs(&json!({"url": "https://gitlab.com/acme/widgets"})),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_chain_lists_sources() {
        let err = Error::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        )));
        let chain = error_chain(&err);
        assert!(chain.starts_with("Database error:"));
        assert!(chain.contains("caused by:"));
    }
}
