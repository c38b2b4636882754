//! Interest and comment repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use knowledge_share_core::{Comment, CommentId, InterestId, SessionId, SessionInterest, UserId};

use super::{RepositoryError, conflict_on_unique};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InterestRow {
    id: InterestId,
    session_id: SessionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
}

impl From<InterestRow> for SessionInterest {
    fn from(row: InterestRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: CommentId,
    session_id: SessionId,
    user_id: UserId,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            author_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for interests and comments.
pub struct EngagementRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> EngagementRepository<'a> {
    /// Create a new engagement repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's interest marker on a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<SessionInterest>, RepositoryError> {
        let row = sqlx::query_as::<_, InterestRow>(
            r"
            SELECT id, session_id, user_id, created_at FROM session_interests
            WHERE session_id = $1 AND user_id = $2
            ",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Mark interest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user is already interested.
    /// Returns `RepositoryError::InvalidReference` if the session is gone.
    pub async fn insert_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<SessionInterest, RepositoryError> {
        let row = sqlx::query_as::<_, InterestRow>(
            r"
            INSERT INTO session_interests (id, session_id, user_id) VALUES ($1, $2, $3)
            RETURNING id, session_id, user_id, created_at
            ",
        )
        .bind(InterestId::generate())
        .bind(session_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "interest"))?;

        Ok(row.into())
    }

    /// Remove an interest marker.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it was already removed.
    pub async fn delete_interest(&self, id: InterestId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM session_interests WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Interest markers on a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_interests(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SessionInterest>, RepositoryError> {
        let rows = sqlx::query_as::<_, InterestRow>(
            r"
            SELECT id, session_id, user_id, created_at FROM session_interests
            WHERE session_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Post a comment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidReference` if the session is gone.
    pub async fn insert_comment(
        &self,
        session_id: SessionId,
        author_id: UserId,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r"
            INSERT INTO session_comments (id, session_id, user_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, session_id, user_id, content, created_at, updated_at
            ",
        )
        .bind(CommentId::generate())
        .bind(session_id)
        .bind(author_id)
        .bind(content)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a comment by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r"
            SELECT id, session_id, user_id, content, created_at, updated_at
            FROM session_comments WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Replace a comment's content.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the comment was deleted.
    pub async fn update_comment(
        &self,
        id: CommentId,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r"
            UPDATE session_comments SET content = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, session_id, user_id, content, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(content)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a comment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it was already deleted.
    pub async fn delete_comment(&self, id: CommentId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM session_comments WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Comments on a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_comments(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Comment>, RepositoryError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r"
            SELECT id, session_id, user_id, content, created_at, updated_at
            FROM session_comments WHERE session_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
