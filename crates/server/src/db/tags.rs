//! Tag repository. Tags are shared by every session and names may repeat.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use knowledge_share_core::{Tag, TagId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TagRow {
    id: TagId,
    name: String,
    color: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row
                .color
                .unwrap_or_else(|| Self::DEFAULT_COLOR.to_owned()),
            created_at: row.created_at,
        }
    }
}

/// Repository for tag database operations.
pub struct TagRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TagRepository<'a> {
    /// Create a new tag repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All tags ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Tag>, RepositoryError> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, color, created_at FROM tags ORDER BY lower(name), id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }

    /// Create a tag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, name: &str, color: &str) -> Result<Tag, RepositoryError> {
        let row = sqlx::query_as::<_, TagRow>(
            r"
            INSERT INTO tags (id, name, color) VALUES ($1, $2, $3)
            RETURNING id, name, color, created_at
            ",
        )
        .bind(TagId::generate())
        .bind(name)
        .bind(color)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }
}
