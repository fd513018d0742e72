//! Wiki document database queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite};

use crate::Result;

/// Generated wiki page for a repository.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WikiDocument {
    pub id: i64,
    pub repository_id: i64,
    pub content: String,
    pub version: i64,
    pub generated_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Store generated wiki content.
///
/// Creates the document at version 1, or overwrites the existing one and
/// bumps its version.
pub async fn save_wiki_document<'e, E>(
    executor: E,
    repository_id: i64,
    content: &str,
) -> Result<WikiDocument>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let doc = sqlx::query_as::<_, WikiDocument>(
        r#"
        INSERT INTO wiki_documents (repository_id, content, version)
        VALUES (?, ?, 1)
        ON CONFLICT(repository_id) DO UPDATE SET
            content = excluded.content,
            version = wiki_documents.version + 1,
            generated_at = datetime('now'),
            updated_at = datetime('now')
        RETURNING *
        "#,
    )
    .bind(repository_id)
    .bind(content)
    .fetch_one(executor)
    .await?;

    Ok(doc)
}

/// Get the wiki document stored for a repository.
pub async fn get_wiki_document<'e, E>(executor: E, repository_id: i64) -> Result<Option<WikiDocument>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let doc = sqlx::query_as::<_, WikiDocument>(
        "SELECT * FROM wiki_documents WHERE repository_id = ?",
    )
    .bind(repository_id)
    .fetch_optional(executor)
    .await?;

    Ok(doc)
}

/// Count wiki documents for a repository (at most one).
pub async fn count_wiki_documents<'e, E>(executor: E, repository_id: i64) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM wiki_documents WHERE repository_id = ?")
            .bind(repository_id)
            .fetch_one(executor)
            .await?;
    Ok(count)
}
