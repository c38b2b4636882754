//! Persistence for Knowledge Share.
//!
//! # Tables
//!
//! - `profiles` - Users known from the identity provider, with their role
//! - `session_requests` - Topic proposals and their review outcome
//! - `sessions` - Scheduled sessions
//! - `tags`, `session_tags` - Shared labels and their assignment
//! - `session_guests` - Extra viewers of private sessions
//! - `session_interests` - One "interested" marker per user and session
//! - `session_comments` - Discussion under a session
//! - `tower_sessions.session` - Cookie session storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p knowledge-share-cli -- migrate
//! ```
//!
//! # Stores
//!
//! Services talk to a [`Store`]. [`PgStore`] is the production implementation
//! built from the repositories in this module; [`MemoryStore`] keeps everything
//! in process for tests and local experiments.

pub mod engagement;
pub mod memory;
pub mod pg;
pub mod profiles;
pub mod requests;
pub mod sessions;
pub mod tags;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use knowledge_share_core::lifecycle::Review;
use knowledge_share_core::{
    Comment, CommentId, Email, InterestId, Profile, RequestStatus, Role, Session, SessionDraft,
    SessionGuest, SessionId, SessionInterest, SessionRequest, SessionRequestId, Tag, TagId, UserId,
    Visibility,
};

pub use engagement::EngagementRepository;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use profiles::ProfileRepository;
pub use requests::RequestRepository;
pub use sessions::SessionRepository;
pub use tags::TagRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// A guarded write lost to a concurrent change, or a uniqueness
    /// constraint was hit.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced row (tag, guest) does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The session row was written but a later step was not.
    #[error("session {session_id} was created but {reason}")]
    Incomplete {
        session_id: SessionId,
        reason: String,
    },

    /// The store did not confirm whether the write happened.
    #[error("outcome unknown: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            // Connection-level failures: the client cannot tell whether a write landed
            sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed | sqlx::Error::PoolTimedOut => {
                Self::Unknown(e.to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                Self::InvalidReference(db_err.message().to_owned())
            }
            other => Self::Database(other),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Inputs and filters
// =============================================================================

/// Profile fields asserted by the identity provider.
#[derive(Debug, Clone)]
pub struct ProfileClaims {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
}

/// Filter for user listings.
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub role: Option<Role>,
    /// Case-insensitive substring of display name or email.
    pub search: Option<String>,
}

/// A new session request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub requested_datetime: DateTime<Utc>,
    pub visibility: Visibility,
    pub requester_id: UserId,
}

/// Filter for request listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requester_id: Option<UserId>,
}

/// Filter for session listings.
///
/// Bounds are `from <= datetime < to` and `after < datetime <= until`.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tag_id: Option<TagId>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub owner_id: Option<UserId>,
    /// Earliest first when set, latest first otherwise.
    pub ascending: bool,
}

/// Which association sets to overwrite. `None` leaves a set untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Associations<'a> {
    pub tag_ids: Option<&'a [TagId]>,
    pub guest_ids: Option<&'a [UserId]>,
}

// =============================================================================
// Store
// =============================================================================

/// Everything the services need from persistence.
///
/// Lookups return `Ok(None)` for missing rows; mutations of a missing row
/// return [`RepositoryError::NotFound`].
pub trait Store: Clone + Send + Sync + 'static {
    /// Round trip to the backing store.
    fn ping(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    // Profiles

    fn get_profile(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<Profile>, RepositoryError>> + Send;

    fn profiles_by_ids(
        &self,
        ids: &[UserId],
    ) -> impl Future<Output = Result<Vec<Profile>, RepositoryError>> + Send;

    /// Insert a new profile as `basic`, or refresh the email of an existing
    /// one. A stored display name is kept unless it is blank. Never changes
    /// the role.
    ///
    /// [`RepositoryError::Conflict`] if another profile has the same email,
    /// compared case-insensitively.
    fn upsert_profile(
        &self,
        claims: &ProfileClaims,
    ) -> impl Future<Output = Result<Profile, RepositoryError>> + Send;

    /// Ordered by display name.
    fn list_profiles(
        &self,
        filter: &ProfileFilter,
    ) -> impl Future<Output = Result<Vec<Profile>, RepositoryError>> + Send;

    fn update_display_name(
        &self,
        id: UserId,
        display_name: &str,
    ) -> impl Future<Output = Result<Profile, RepositoryError>> + Send;

    fn update_role(
        &self,
        id: UserId,
        role: Role,
    ) -> impl Future<Output = Result<Profile, RepositoryError>> + Send;

    fn delete_profile(&self, id: UserId)
    -> impl Future<Output = Result<(), RepositoryError>> + Send;

    // Requests

    fn insert_request(
        &self,
        request: &NewRequest,
    ) -> impl Future<Output = Result<SessionRequest, RepositoryError>> + Send;

    fn get_request(
        &self,
        id: SessionRequestId,
    ) -> impl Future<Output = Result<Option<SessionRequest>, RepositoryError>> + Send;

    fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> impl Future<Output = Result<Vec<SessionRequest>, RepositoryError>> + Send;

    /// Write a review only if the request is still pending.
    ///
    /// Returns [`RepositoryError::Conflict`] when another reviewer got there
    /// first.
    fn review_request(
        &self,
        id: SessionRequestId,
        review: &Review,
    ) -> impl Future<Output = Result<SessionRequest, RepositoryError>> + Send;

    // Sessions

    /// Create a session with its tags and guests, and link it to the
    /// originating request when there is one.
    ///
    /// The request link is guarded: if the request is not approved or is
    /// already linked, nothing is written and [`RepositoryError::Conflict`] is
    /// returned. A store that cannot write all rows as one unit reports a late
    /// failure as [`RepositoryError::Incomplete`].
    fn materialize_session(
        &self,
        owner_id: UserId,
        draft: &SessionDraft,
        request_id: Option<SessionRequestId>,
    ) -> impl Future<Output = Result<Session, RepositoryError>> + Send;

    fn get_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> impl Future<Output = Result<Vec<Session>, RepositoryError>> + Send;

    /// Write every mutable column of `session`, bump `updated_at` and replace
    /// the supplied association sets, all or nothing.
    ///
    /// Unknown tag or guest ids leave the session untouched and return
    /// [`RepositoryError::InvalidReference`].
    fn update_session(
        &self,
        session: &Session,
        associations: Associations<'_>,
    ) -> impl Future<Output = Result<Session, RepositoryError>> + Send;

    /// Remove a session with its tags, guests, interests and comments.
    fn delete_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Tags of each listed session.
    fn session_tags(
        &self,
        ids: &[SessionId],
    ) -> impl Future<Output = Result<Vec<(SessionId, Tag)>, RepositoryError>> + Send;

    fn session_guests(
        &self,
        ids: &[SessionId],
    ) -> impl Future<Output = Result<Vec<SessionGuest>, RepositoryError>> + Send;

    /// Delete then insert the supplied association sets.
    fn replace_associations(
        &self,
        id: SessionId,
        associations: Associations<'_>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    // Tags

    /// Ordered by name.
    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, RepositoryError>> + Send;

    fn create_tag(
        &self,
        name: &str,
        color: &str,
    ) -> impl Future<Output = Result<Tag, RepositoryError>> + Send;

    // Engagement

    fn find_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<SessionInterest>, RepositoryError>> + Send;

    /// [`RepositoryError::Conflict`] if the pair already exists.
    fn insert_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> impl Future<Output = Result<SessionInterest, RepositoryError>> + Send;

    fn delete_interest(
        &self,
        id: InterestId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Oldest first.
    fn list_interests(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<SessionInterest>, RepositoryError>> + Send;

    fn insert_comment(
        &self,
        session_id: SessionId,
        author_id: UserId,
        content: &str,
    ) -> impl Future<Output = Result<Comment, RepositoryError>> + Send;

    fn get_comment(
        &self,
        id: CommentId,
    ) -> impl Future<Output = Result<Option<Comment>, RepositoryError>> + Send;

    fn update_comment(
        &self,
        id: CommentId,
        content: &str,
    ) -> impl Future<Output = Result<Comment, RepositoryError>> + Send;

    fn delete_comment(
        &self,
        id: CommentId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Oldest first.
    fn list_comments(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Comment>, RepositoryError>> + Send;
}

/// Map a unique violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::from(e)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfirmed_driver_errors_are_unknown() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::WorkerCrashed),
            RepositoryError::Unknown(_)
        ));
        assert!(matches!(
            RepositoryError::from(sqlx::Error::PoolTimedOut),
            RepositoryError::Unknown(_)
        ));
        assert!(matches!(
            RepositoryError::from(sqlx::Error::RowNotFound),
            RepositoryError::Database(_)
        ));
    }

    #[test]
    fn test_incomplete_message_names_session() {
        let id = SessionId::generate();
        let err = RepositoryError::Incomplete {
            session_id: id,
            reason: "guest associations were not saved".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            format!("session {id} was created but guest associations were not saved")
        );
    }
}
