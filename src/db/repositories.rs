//! Repository database queries.
//!
//! Repositories are keyed by their canonical URL and created lazily by the
//! first index job that runs for them.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite};

use crate::models::RepositoryIdentity;
use crate::Result;

/// Repository record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub owner: String,
    pub last_indexed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Repository {
    /// Get full repository path (owner/name).
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Find or create the repository row for an identity.
///
/// A single `INSERT .. ON CONFLICT(url)` statement, so concurrent index jobs
/// for the same URL converge on one row.
pub async fn upsert_repository<'e, E>(executor: E, identity: &RepositoryIdentity) -> Result<Repository>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let repo = sqlx::query_as::<_, Repository>(
        r#"
        INSERT INTO repositories (url, name, owner)
        VALUES (?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET updated_at = datetime('now')
        RETURNING *
        "#,
    )
    .bind(identity.url())
    .bind(&identity.name)
    .bind(&identity.owner)
    .fetch_one(executor)
    .await?;

    Ok(repo)
}

/// Look up a repository by id.
pub async fn get_repository<'e, E>(executor: E, id: i64) -> Result<Option<Repository>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let repo = sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(repo)
}

/// Look up a repository by its canonical URL.
pub async fn get_repository_by_url<'e, E>(executor: E, url: &str) -> Result<Option<Repository>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let repo = sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE url = ?")
        .bind(url)
        .fetch_optional(executor)
        .await?;

    Ok(repo)
}

/// Record a successful indexing run.
pub async fn mark_repository_indexed<'e, E>(executor: E, id: i64) -> Result<Repository>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let repo = sqlx::query_as::<_, Repository>(
        r#"
        UPDATE repositories SET
            last_indexed_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_one(executor)
    .await?;

    Ok(repo)
}

/// Count stored repositories.
pub async fn count_repositories<'e, E>(executor: E) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM repositories")
        .fetch_one(executor)
        .await?;
    Ok(count)
}
