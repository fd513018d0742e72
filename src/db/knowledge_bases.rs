//! Knowledge base database queries.
//!
//! One knowledge base per repository, accumulating the number of documents
//! indexed across runs. The heading sections of the latest indexed README
//! are kept alongside for answering queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection};

use crate::services::markdown::Section;
use crate::Result;

/// Knowledge base record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: i64,
    pub repository_id: i64,
    pub document_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Indexed section of a knowledge base.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeSection {
    pub id: i64,
    pub knowledge_base_id: i64,
    pub position: i64,
    pub title: String,
    pub anchor: String,
    pub content: String,
    pub created_at: String,
}

/// Find or create the repository's knowledge base and add `documents` to its count.
pub async fn add_knowledge_base_documents<'e, E>(
    executor: E,
    repository_id: i64,
    documents: i64,
) -> Result<KnowledgeBase>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let kb = sqlx::query_as::<_, KnowledgeBase>(
        r#"
        INSERT INTO knowledge_bases (repository_id, document_count)
        VALUES (?, ?)
        ON CONFLICT(repository_id) DO UPDATE SET
            document_count = knowledge_bases.document_count + excluded.document_count,
            updated_at = datetime('now')
        RETURNING *
        "#,
    )
    .bind(repository_id)
    .bind(documents)
    .fetch_one(executor)
    .await?;

    Ok(kb)
}

/// Get a repository's knowledge base, if one has been created.
pub async fn get_knowledge_base<'e, E>(executor: E, repository_id: i64) -> Result<Option<KnowledgeBase>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let kb = sqlx::query_as::<_, KnowledgeBase>(
        "SELECT * FROM knowledge_bases WHERE repository_id = ?",
    )
    .bind(repository_id)
    .fetch_optional(executor)
    .await?;

    Ok(kb)
}

/// Replace the stored sections of a knowledge base.
///
/// Runs several statements, so callers pass a connection or `&mut *tx`.
pub async fn replace_knowledge_sections(
    conn: &mut SqliteConnection,
    knowledge_base_id: i64,
    sections: &[Section],
) -> Result<usize> {
    sqlx::query("DELETE FROM knowledge_sections WHERE knowledge_base_id = ?")
        .bind(knowledge_base_id)
        .execute(&mut *conn)
        .await?;

    for (position, section) in sections.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO knowledge_sections (knowledge_base_id, position, title, anchor, content)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(knowledge_base_id)
        .bind(position as i64)
        .bind(&section.title)
        .bind(&section.id)
        .bind(&section.body)
        .execute(&mut *conn)
        .await?;
    }

    Ok(sections.len())
}

/// Sections of a knowledge base in document order.
pub async fn list_knowledge_sections<'e, E>(executor: E, knowledge_base_id: i64) -> Result<Vec<KnowledgeSection>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sections = sqlx::query_as::<_, KnowledgeSection>(
        "SELECT * FROM knowledge_sections WHERE knowledge_base_id = ? ORDER BY position",
    )
    .bind(knowledge_base_id)
    .fetch_all(executor)
    .await?;

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema, upsert_repository, DbPool};
    use crate::models::RepositoryIdentity;
    use crate::services::markdown::split_sections;

    async fn setup_test_db() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_document_count_accumulates() {
        let pool = setup_test_db().await;
        let identity = RepositoryIdentity::new("acme", "widgets").unwrap();
        let repo = upsert_repository(&pool, &identity).await.unwrap();

        let first = add_knowledge_base_documents(&pool, repo.id, 1).await.unwrap();
        let second = add_knowledge_base_documents(&pool, repo.id, 2).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.document_count, 3);
    }

    #[tokio::test]
    async fn test_replace_sections_keeps_latest() {
        let pool = setup_test_db().await;
        let identity = RepositoryIdentity::new("acme", "widgets").unwrap();
        let repo = upsert_repository(&pool, &identity).await.unwrap();
        let kb = add_knowledge_base_documents(&pool, repo.id, 1).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let old = split_sections("# Old\nstale\n## Gone\nbye");
        assert_eq!(replace_knowledge_sections(&mut conn, kb.id, &old).await.unwrap(), 2);

        let new = split_sections("# Widgets\nA widget library.");
        replace_knowledge_sections(&mut conn, kb.id, &new).await.unwrap();
        drop(conn);

        let stored = list_knowledge_sections(&pool, kb.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Widgets");
        assert_eq!(stored[0].anchor, "widgets");
        assert_eq!(stored[0].content, "A widget library.");
    }
}
