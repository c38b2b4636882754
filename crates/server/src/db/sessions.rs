//! Session repository, including tag and guest associations.
//!
//! Creating a session writes the session row, its associations, and the link
//! on the originating request in one transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use knowledge_share_core::{
    Session, SessionDraft, SessionGuest, SessionId, SessionRequestId, Tag, TagId, UserId,
    Visibility,
};

use super::profiles::like_pattern;
use super::requests::{link_session, lock_for_link};
use super::tags::TagRow;
use super::{Associations, RepositoryError, SessionQuery};

const SESSION_COLUMNS: &str = "id, title, description, datetime, presentation_url, \
     recording_url, visibility, created_by, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: SessionId,
    title: String,
    description: Option<String>,
    datetime: DateTime<Utc>,
    presentation_url: Option<String>,
    recording_url: Option<String>,
    visibility: Visibility,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            datetime: row.datetime,
            presentation_url: row.presentation_url,
            recording_url: row.recording_url,
            visibility: row.visibility,
            owner_id: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionTagRow {
    session_id: SessionId,
    #[sqlx(flatten)]
    tag: TagRow,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionGuestRow {
    session_id: SessionId,
    user_id: UserId,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for session database operations.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    /// Create a new session repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a session from a validated draft.
    ///
    /// When `request_id` is given the request row is locked first and must be
    /// approved and unlinked; the link is written in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the request cannot be linked.
    /// Returns `RepositoryError::InvalidReference` for unknown tags or guests.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(
        &self,
        owner_id: UserId,
        draft: &SessionDraft,
        request_id: Option<SessionRequestId>,
    ) -> Result<Session, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(request_id) = request_id {
            lock_for_link(&mut tx, request_id).await?;
        }

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r"
            INSERT INTO sessions (id, title, description, datetime, presentation_url,
                                  recording_url, visibility, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(SessionId::generate())
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.datetime)
        .bind(draft.presentation_url.as_deref())
        .bind(draft.recording_url.as_deref())
        .bind(draft.visibility)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;
        let session = Session::from(row);

        insert_tags(&mut tx, session.id, &draft.tag_ids).await?;
        insert_guests(&mut tx, session.id, &draft.guest_ids).await?;

        if let Some(request_id) = request_id {
            link_session(&mut tx, request_id, session.id).await?;
        }

        tx.commit().await?;
        Ok(session)
    }

    /// Get a session by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    /// List sessions matching `query`. Visibility is not applied here.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: &SessionQuery) -> Result<Vec<Session>, RepositoryError> {
        let order = if query.ascending { "ASC" } else { "DESC" };
        let pattern = query.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM sessions s
            WHERE ($1::timestamptz IS NULL OR s.datetime >= $1)
              AND ($2::timestamptz IS NULL OR s.datetime < $2)
              AND ($3::timestamptz IS NULL OR s.datetime > $3)
              AND ($4::timestamptz IS NULL OR s.datetime <= $4)
              AND ($5::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM session_tags st
                    WHERE st.session_id = s.id AND st.tag_id = $5))
              AND ($6::text IS NULL OR s.title ILIKE $6 OR s.description ILIKE $6)
              AND ($7::uuid IS NULL OR s.created_by = $7)
            ORDER BY s.datetime {order}, s.id
            "
        ))
        .bind(query.from)
        .bind(query.to)
        .bind(query.after)
        .bind(query.until)
        .bind(query.tag_id)
        .bind(pattern)
        .bind(query.owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Session::from).collect())
    }

    /// Write the mutable columns of a session and replace the supplied
    /// association sets in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session no longer exists.
    /// Returns `RepositoryError::InvalidReference` for unknown tags or guests;
    /// nothing is written then.
    pub async fn update(
        &self,
        session: &Session,
        associations: Associations<'_>,
    ) -> Result<Session, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r"
            UPDATE sessions
               SET title = $2, description = $3, datetime = $4, presentation_url = $5,
                   recording_url = $6, visibility = $7, updated_at = now()
             WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(session.id)
        .bind(&session.title)
        .bind(&session.description)
        .bind(session.datetime)
        .bind(session.presentation_url.as_deref())
        .bind(session.recording_url.as_deref())
        .bind(session.visibility)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        overwrite_associations(&mut tx, session.id, associations).await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete a session. Associations, interests and comments cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session does not exist.
    pub async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Tags attached to each of `ids`, ordered by tag name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tags_for(
        &self,
        ids: &[SessionId],
    ) -> Result<Vec<(SessionId, Tag)>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SessionTagRow>(
            r"
            SELECT st.session_id, t.id, t.name, t.color, t.created_at
            FROM session_tags st
            JOIN tags t ON t.id = st.tag_id
            WHERE st.session_id = ANY($1)
            ORDER BY t.name, t.id
            ",
        )
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.session_id, row.tag.into()))
            .collect())
    }

    /// Guest entries for each of `ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn guests_for(&self, ids: &[SessionId]) -> Result<Vec<SessionGuest>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SessionGuestRow>(
            "SELECT session_id, user_id FROM session_guests WHERE session_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SessionGuest {
                session_id: row.session_id,
                user_id: row.user_id,
            })
            .collect())
    }

    /// Replace the supplied association sets, delete-then-insert, in one
    /// transaction. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session does not exist.
    /// Returns `RepositoryError::InvalidReference` for unknown tags or guests.
    pub async fn replace_associations(
        &self,
        id: SessionId,
        associations: Associations<'_>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, SessionId>("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        overwrite_associations(&mut tx, id, associations).await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn overwrite_associations(
    tx: &mut Transaction<'_, Postgres>,
    session_id: SessionId,
    associations: Associations<'_>,
) -> Result<(), RepositoryError> {
    if let Some(tag_ids) = associations.tag_ids {
        sqlx::query("DELETE FROM session_tags WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut **tx)
            .await?;
        insert_tags(tx, session_id, tag_ids).await?;
    }
    if let Some(guest_ids) = associations.guest_ids {
        sqlx::query("DELETE FROM session_guests WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut **tx)
            .await?;
        insert_guests(tx, session_id, guest_ids).await?;
    }
    Ok(())
}

async fn insert_tags(
    tx: &mut Transaction<'_, Postgres>,
    session_id: SessionId,
    tag_ids: &[TagId],
) -> Result<(), RepositoryError> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r"
        INSERT INTO session_tags (session_id, tag_id)
        SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS t(tag_id)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(session_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_guests(
    tx: &mut Transaction<'_, Postgres>,
    session_id: SessionId,
    guest_ids: &[UserId],
) -> Result<(), RepositoryError> {
    if guest_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r"
        INSERT INTO session_guests (session_id, user_id)
        SELECT $1, user_id FROM UNNEST($2::uuid[]) AS g(user_id)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(session_id)
    .bind(guest_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_maps_created_by_to_owner() {
        let now = Utc::now();
        let owner = UserId::generate();
        let session = Session::from(SessionRow {
            id: SessionId::generate(),
            title: "Async Rust".to_owned(),
            description: None,
            datetime: now,
            presentation_url: None,
            recording_url: Some("https://example.com/rec".to_owned()),
            visibility: Visibility::Private,
            created_by: owner,
            created_at: now,
            updated_at: now,
        });
        assert_eq!(session.owner_id, owner);
        assert_eq!(session.description, "");
    }
}
