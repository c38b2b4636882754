//! [`Store`] backed by `PostgreSQL`.

use sqlx::PgPool;

use knowledge_share_core::lifecycle::Review;
use knowledge_share_core::{
    Comment, CommentId, InterestId, Profile, Role, Session, SessionDraft, SessionGuest, SessionId,
    SessionInterest, SessionRequest, SessionRequestId, Tag, UserId,
};

use super::{
    Associations, EngagementRepository, NewRequest, ProfileClaims, ProfileFilter,
    ProfileRepository, RepositoryError, RequestFilter, RequestRepository, SessionQuery,
    SessionRepository, Store, TagRepository,
};

/// Production store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for session storage and migrations.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    const fn profiles(&self) -> ProfileRepository<'_> {
        ProfileRepository::new(&self.pool)
    }

    const fn requests(&self) -> RequestRepository<'_> {
        RequestRepository::new(&self.pool)
    }

    const fn sessions(&self) -> SessionRepository<'_> {
        SessionRepository::new(&self.pool)
    }

    const fn tags(&self) -> TagRepository<'_> {
        TagRepository::new(&self.pool)
    }

    const fn engagement(&self) -> EngagementRepository<'_> {
        EngagementRepository::new(&self.pool)
    }
}

impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        self.profiles().get_by_id(id).await
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> Result<Vec<Profile>, RepositoryError> {
        self.profiles().get_many(ids).await
    }

    async fn upsert_profile(&self, claims: &ProfileClaims) -> Result<Profile, RepositoryError> {
        self.profiles().upsert(claims).await
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, RepositoryError> {
        self.profiles().list(filter).await
    }

    async fn update_display_name(
        &self,
        id: UserId,
        display_name: &str,
    ) -> Result<Profile, RepositoryError> {
        self.profiles().update_display_name(id, display_name).await
    }

    async fn update_role(&self, id: UserId, role: Role) -> Result<Profile, RepositoryError> {
        self.profiles().update_role(id, role).await
    }

    async fn delete_profile(&self, id: UserId) -> Result<(), RepositoryError> {
        self.profiles().delete(id).await
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<SessionRequest, RepositoryError> {
        self.requests().create(request).await
    }

    async fn get_request(
        &self,
        id: SessionRequestId,
    ) -> Result<Option<SessionRequest>, RepositoryError> {
        self.requests().get_by_id(id).await
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<SessionRequest>, RepositoryError> {
        self.requests().list(filter).await
    }

    async fn review_request(
        &self,
        id: SessionRequestId,
        review: &Review,
    ) -> Result<SessionRequest, RepositoryError> {
        self.requests().review(id, review).await
    }

    async fn materialize_session(
        &self,
        owner_id: UserId,
        draft: &SessionDraft,
        request_id: Option<SessionRequestId>,
    ) -> Result<Session, RepositoryError> {
        self.sessions().create(owner_id, draft, request_id).await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        self.sessions().get_by_id(id).await
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, RepositoryError> {
        self.sessions().list(query).await
    }

    async fn update_session(
        &self,
        session: &Session,
        associations: Associations<'_>,
    ) -> Result<Session, RepositoryError> {
        self.sessions().update(session, associations).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), RepositoryError> {
        self.sessions().delete(id).await
    }

    async fn session_tags(
        &self,
        ids: &[SessionId],
    ) -> Result<Vec<(SessionId, Tag)>, RepositoryError> {
        self.sessions().tags_for(ids).await
    }

    async fn session_guests(&self, ids: &[SessionId]) -> Result<Vec<SessionGuest>, RepositoryError> {
        self.sessions().guests_for(ids).await
    }

    async fn replace_associations(
        &self,
        id: SessionId,
        associations: Associations<'_>,
    ) -> Result<(), RepositoryError> {
        self.sessions().replace_associations(id, associations).await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, RepositoryError> {
        self.tags().list().await
    }

    async fn create_tag(&self, name: &str, color: &str) -> Result<Tag, RepositoryError> {
        self.tags().create(name, color).await
    }

    async fn find_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<SessionInterest>, RepositoryError> {
        self.engagement().find_interest(session_id, user_id).await
    }

    async fn insert_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<SessionInterest, RepositoryError> {
        self.engagement().insert_interest(session_id, user_id).await
    }

    async fn delete_interest(&self, id: InterestId) -> Result<(), RepositoryError> {
        self.engagement().delete_interest(id).await
    }

    async fn list_interests(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SessionInterest>, RepositoryError> {
        self.engagement().list_interests(session_id).await
    }

    async fn insert_comment(
        &self,
        session_id: SessionId,
        author_id: UserId,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        self.engagement()
            .insert_comment(session_id, author_id, content)
            .await
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        self.engagement().get_comment(id).await
    }

    async fn update_comment(&self, id: CommentId, content: &str) -> Result<Comment, RepositoryError> {
        self.engagement().update_comment(id, content).await
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), RepositoryError> {
        self.engagement().delete_comment(id).await
    }

    async fn list_comments(&self, session_id: SessionId) -> Result<Vec<Comment>, RepositoryError> {
        self.engagement().list_comments(session_id).await
    }
}
