//! Session request repository.
//!
//! Requests are never deleted. Review writes are compare-and-set on
//! `status = 'pending'`, so concurrent reviewers cannot overwrite each other.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use knowledge_share_core::lifecycle::Review;
use knowledge_share_core::{
    RequestStatus, SessionId, SessionRequest, SessionRequestId, UserId, Visibility,
};

use super::{NewRequest, RepositoryError, RequestFilter};

const REQUEST_COLUMNS: &str = "id, title, description, datetime, visibility, status, user_id, \
     reviewed_by, reviewed_at, rejection_reason, session_id, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: SessionRequestId,
    title: String,
    description: Option<String>,
    datetime: DateTime<Utc>,
    visibility: Visibility,
    status: RequestStatus,
    user_id: UserId,
    reviewed_by: Option<UserId>,
    reviewed_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    session_id: Option<SessionId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for SessionRequest {
    type Error = RepositoryError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        if row.status == RequestStatus::Rejected
            && row.rejection_reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(RepositoryError::DataCorruption(format!(
                "request {} is rejected without a reason",
                row.id
            )));
        }

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            requested_datetime: row.datetime,
            visibility: row.visibility,
            status: row.status,
            requester_id: row.user_id,
            reviewer_id: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
            linked_session_id: row.session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Link state of a request, read under a row lock while materializing.
#[derive(Debug, sqlx::FromRow)]
struct LinkStateRow {
    status: RequestStatus,
    session_id: Option<SessionId>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for session request database operations.
pub struct RequestRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RequestRepository<'a> {
    /// Create a new request repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Submit a new request in the `pending` state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, request: &NewRequest) -> Result<SessionRequest, RepositoryError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r"
            INSERT INTO session_requests (id, title, description, datetime, visibility, status, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REQUEST_COLUMNS}
            "
        ))
        .bind(SessionRequestId::generate())
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.requested_datetime)
        .bind(request.visibility)
        .bind(RequestStatus::Pending)
        .bind(request.requester_id)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Get a request by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row breaks a request invariant.
    pub async fn get_by_id(
        &self,
        id: SessionRequestId,
    ) -> Result<Option<SessionRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM session_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<SessionRequest>, RepositoryError> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r"
            SELECT {REQUEST_COLUMNS} FROM session_requests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_at DESC
            "
        ))
        .bind(filter.status)
        .bind(filter.requester_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply a review if, and only if, the request is still pending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the request was already reviewed.
    /// Returns `RepositoryError::NotFound` if the request does not exist.
    pub async fn review(
        &self,
        id: SessionRequestId,
        review: &Review,
    ) -> Result<SessionRequest, RepositoryError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r"
            UPDATE session_requests
               SET status = $2, reviewed_by = $3, reviewed_at = $4,
                   rejection_reason = $5, updated_at = $4
             WHERE id = $1 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "
        ))
        .bind(id)
        .bind(review.status)
        .bind(review.reviewer_id)
        .bind(review.reviewed_at)
        .bind(review.rejection_reason.as_deref())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get_by_id(id).await? {
                Some(current) => Err(RepositoryError::Conflict(format!(
                    "request is already {}",
                    current.status
                ))),
                None => Err(RepositoryError::NotFound),
            },
        }
    }
}

/// Lock the request row and check it can still be linked to a new session.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the request does not exist.
/// Returns `RepositoryError::Conflict` if it is not approved or already linked.
pub(crate) async fn lock_for_link(
    tx: &mut Transaction<'_, Postgres>,
    id: SessionRequestId,
) -> Result<(), RepositoryError> {
    let state = sqlx::query_as::<_, LinkStateRow>(
        "SELECT status, session_id FROM session_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    if let Some(existing) = state.session_id {
        return Err(RepositoryError::Conflict(format!(
            "request has already been scheduled as session {existing}"
        )));
    }
    if state.status != RequestStatus::Approved {
        return Err(RepositoryError::Conflict(format!(
            "request is {}, only approved requests can be scheduled",
            state.status
        )));
    }
    Ok(())
}

/// Point a request at its session. Guarded on the link still being empty.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the request was linked meanwhile.
pub(crate) async fn link_session(
    tx: &mut Transaction<'_, Postgres>,
    id: SessionRequestId,
    session_id: SessionId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE session_requests SET session_id = $2, updated_at = now()
        WHERE id = $1 AND session_id IS NULL AND status = 'approved'
        ",
    )
    .bind(id)
    .bind(session_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(
            "request was scheduled by someone else".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(status: RequestStatus, reason: Option<&str>) -> RequestRow {
        let now = Utc::now();
        RequestRow {
            id: SessionRequestId::generate(),
            title: "Intro to Rust".to_owned(),
            description: None,
            datetime: now,
            visibility: Visibility::Public,
            status,
            user_id: UserId::generate(),
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: reason.map(str::to_owned),
            session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_stored_column_names() {
        let r = row(RequestStatus::Pending, None);
        let requester = r.user_id;
        let request = SessionRequest::try_from(r).unwrap();
        assert_eq!(request.requester_id, requester);
        assert_eq!(request.description, "");
        assert!(!request.is_materialized());
    }

    #[test]
    fn test_rejected_without_reason_is_corruption() {
        assert!(matches!(
            SessionRequest::try_from(row(RequestStatus::Rejected, Some("  "))),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert!(SessionRequest::try_from(row(RequestStatus::Rejected, Some("dup"))).is_ok());
    }
}
