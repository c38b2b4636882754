//! In-process [`Store`] for tests and local experiments.
//!
//! Everything lives behind one async mutex, so each call is atomic. Two knobs
//! let tests reproduce conditions a real database produces:
//!
//! - [`MemoryStore::fail_next_association_write`] makes the next session
//!   creation stop after the session row, as a store without transactions
//!   would, and report [`RepositoryError::Incomplete`].
//! - [`MemoryStore::set_latency`] delays every call, to exercise deadlines.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use knowledge_share_core::lifecycle::{self, Review};
use knowledge_share_core::{
    Comment, CommentId, InterestId, Profile, RequestStatus, Role, Session, SessionDraft,
    SessionGuest, SessionId, SessionInterest, SessionRequest, SessionRequestId, Tag, TagId, UserId,
};

use super::{
    Associations, NewRequest, ProfileClaims, ProfileFilter, RepositoryError, RequestFilter,
    SessionQuery, Store,
};

#[derive(Debug, Default)]
struct MemoryState {
    profiles: HashMap<UserId, Profile>,
    requests: HashMap<SessionRequestId, SessionRequest>,
    sessions: HashMap<SessionId, Session>,
    tags: HashMap<TagId, Tag>,
    session_tags: HashSet<(SessionId, TagId)>,
    session_guests: HashSet<(SessionId, UserId)>,
    interests: HashMap<InterestId, SessionInterest>,
    comments: HashMap<CommentId, Comment>,
}

impl MemoryState {
    fn check_references(
        &self,
        tag_ids: &[TagId],
        guest_ids: &[UserId],
    ) -> Result<(), RepositoryError> {
        if let Some(missing) = tag_ids.iter().find(|id| !self.tags.contains_key(*id)) {
            return Err(RepositoryError::InvalidReference(format!(
                "tag {missing} does not exist"
            )));
        }
        if let Some(missing) = guest_ids.iter().find(|id| !self.profiles.contains_key(*id)) {
            return Err(RepositoryError::InvalidReference(format!(
                "user {missing} does not exist"
            )));
        }
        Ok(())
    }

    fn overwrite_associations(&mut self, id: SessionId, associations: Associations<'_>) {
        if let Some(tag_ids) = associations.tag_ids {
            self.session_tags.retain(|(session, _)| *session != id);
            self.session_tags
                .extend(tag_ids.iter().map(|tag| (id, *tag)));
        }
        if let Some(guest_ids) = associations.guest_ids {
            self.session_guests.retain(|(session, _)| *session != id);
            self.session_guests
                .extend(guest_ids.iter().map(|user| (id, *user)));
        }
    }

    fn remove_session(&mut self, id: SessionId) -> bool {
        if self.sessions.remove(&id).is_none() {
            return false;
        }
        self.session_tags.retain(|(session, _)| *session != id);
        self.session_guests.retain(|(session, _)| *session != id);
        self.interests.retain(|_, i| i.session_id != id);
        self.comments.retain(|_, c| c.session_id != id);
        // Request links are permanent, even to a session that is gone
        true
    }
}

/// In-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_associations: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next session creation write the session (and request link)
    /// but not its tags and guests.
    pub fn fail_next_association_write(&self) {
        self.fail_associations.store(true, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Insert a profile with a given role, bypassing sign-in.
    pub async fn seed_profile(&self, claims: &ProfileClaims, role: Role) -> Profile {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let profile = Profile {
            id: claims.id,
            email: claims.email.clone(),
            display_name: claims.display_name.clone(),
            avatar_url: None,
            bio: String::new(),
            role,
            created_at: now,
            updated_at: now,
        };
        state.profiles.insert(profile.id, profile.clone());
        profile
    }

    async fn enter(&self) -> MutexGuard<'_, MemoryState> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.state.lock().await
    }
}

impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        drop(self.enter().await);
        Ok(())
    }

    // Profiles

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        Ok(self.enter().await.profiles.get(&id).cloned())
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> Result<Vec<Profile>, RepositoryError> {
        let state = self.enter().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn upsert_profile(&self, claims: &ProfileClaims) -> Result<Profile, RepositoryError> {
        let mut state = self.enter().await;
        let email = claims.email.as_str().to_lowercase();
        if state
            .profiles
            .values()
            .any(|p| p.id != claims.id && p.email.as_str().to_lowercase() == email)
        {
            return Err(RepositoryError::Conflict(
                "a profile with this email already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let profile = state
            .profiles
            .entry(claims.id)
            .and_modify(|p| {
                p.email = claims.email.clone();
                if p.display_name.trim().is_empty() {
                    p.display_name.clone_from(&claims.display_name);
                }
                p.updated_at = now;
            })
            .or_insert_with(|| Profile {
                id: claims.id,
                email: claims.email.clone(),
                display_name: claims.display_name.clone(),
                avatar_url: None,
                bio: String::new(),
                role: Role::Basic,
                created_at: now,
                updated_at: now,
            });
        Ok(profile.clone())
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, RepositoryError> {
        let state = self.enter().await;
        let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut profiles: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| filter.role.is_none_or(|role| p.role == role))
            .filter(|p| {
                needle.as_deref().is_none_or(|n| {
                    p.display_name.to_lowercase().contains(n)
                        || p.email.as_str().to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        profiles.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.email.as_str().cmp(b.email.as_str()))
        });
        Ok(profiles)
    }

    async fn update_display_name(
        &self,
        id: UserId,
        display_name: &str,
    ) -> Result<Profile, RepositoryError> {
        let mut state = self.enter().await;
        let profile = state.profiles.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        display_name.clone_into(&mut profile.display_name);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn update_role(&self, id: UserId, role: Role) -> Result<Profile, RepositoryError> {
        let mut state = self.enter().await;
        let profile = state.profiles.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        profile.role = role;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn delete_profile(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.enter().await;
        if state.profiles.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }

        let owned: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.owner_id == id)
            .map(|s| s.id)
            .collect();
        for session_id in owned {
            state.remove_session(session_id);
        }
        state.requests.retain(|_, r| r.requester_id != id);
        for request in state.requests.values_mut() {
            if request.reviewer_id == Some(id) {
                request.reviewer_id = None;
            }
        }
        state.session_guests.retain(|(_, user)| *user != id);
        state.interests.retain(|_, i| i.user_id != id);
        state.comments.retain(|_, c| c.author_id != id);
        Ok(())
    }

    // Requests

    async fn insert_request(&self, request: &NewRequest) -> Result<SessionRequest, RepositoryError> {
        let mut state = self.enter().await;
        if !state.profiles.contains_key(&request.requester_id) {
            return Err(RepositoryError::InvalidReference(format!(
                "user {} does not exist",
                request.requester_id
            )));
        }
        let now = Utc::now();
        let stored = SessionRequest {
            id: SessionRequestId::generate(),
            title: request.title.clone(),
            description: request.description.clone(),
            requested_datetime: request.requested_datetime,
            visibility: request.visibility,
            status: RequestStatus::Pending,
            requester_id: request.requester_id,
            reviewer_id: None,
            reviewed_at: None,
            rejection_reason: None,
            linked_session_id: None,
            created_at: now,
            updated_at: now,
        };
        state.requests.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_request(
        &self,
        id: SessionRequestId,
    ) -> Result<Option<SessionRequest>, RepositoryError> {
        Ok(self.enter().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<SessionRequest>, RepositoryError> {
        let state = self.enter().await;
        let mut requests: Vec<SessionRequest> = state
            .requests
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.requester_id.is_none_or(|u| r.requester_id == u))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn review_request(
        &self,
        id: SessionRequestId,
        review: &Review,
    ) -> Result<SessionRequest, RepositoryError> {
        let mut state = self.enter().await;
        let request = state.requests.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if request.status != RequestStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "request is already {}",
                request.status
            )));
        }
        review.apply_to(request);
        Ok(request.clone())
    }

    // Sessions

    async fn materialize_session(
        &self,
        owner_id: UserId,
        draft: &SessionDraft,
        request_id: Option<SessionRequestId>,
    ) -> Result<Session, RepositoryError> {
        let mut state = self.enter().await;

        if let Some(request_id) = request_id {
            let request = state
                .requests
                .get(&request_id)
                .ok_or(RepositoryError::NotFound)?;
            lifecycle::ensure_materializable(request)
                .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        }
        state.check_references(&draft.tag_ids, &draft.guest_ids)?;

        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            datetime: draft.datetime,
            presentation_url: draft.presentation_url.clone(),
            recording_url: draft.recording_url.clone(),
            visibility: draft.visibility,
            owner_id,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        if let Some(request) = request_id.and_then(|id| state.requests.get_mut(&id)) {
            request.linked_session_id = Some(session.id);
            request.updated_at = now;
        }

        if self.fail_associations.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Incomplete {
                session_id: session.id,
                reason: "its tags and guests were not saved".to_owned(),
            });
        }

        for tag_id in &draft.tag_ids {
            state.session_tags.insert((session.id, *tag_id));
        }
        for user_id in &draft.guest_ids {
            state.session_guests.insert((session.id, *user_id));
        }
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self.enter().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, RepositoryError> {
        let state = self.enter().await;
        let needle = query.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| query.from.is_none_or(|from| s.datetime >= from))
            .filter(|s| query.to.is_none_or(|to| s.datetime < to))
            .filter(|s| query.after.is_none_or(|after| s.datetime > after))
            .filter(|s| query.until.is_none_or(|until| s.datetime <= until))
            .filter(|s| query.owner_id.is_none_or(|owner| s.owner_id == owner))
            .filter(|s| {
                query
                    .tag_id
                    .is_none_or(|tag| state.session_tags.contains(&(s.id, tag)))
            })
            .filter(|s| {
                needle.as_deref().is_none_or(|n| {
                    s.title.to_lowercase().contains(n) || s.description.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        sessions.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.id.cmp(&b.id)));
        if !query.ascending {
            sessions.reverse();
        }
        Ok(sessions)
    }

    async fn update_session(
        &self,
        session: &Session,
        associations: Associations<'_>,
    ) -> Result<Session, RepositoryError> {
        let mut state = self.enter().await;
        if !state.sessions.contains_key(&session.id) {
            return Err(RepositoryError::NotFound);
        }
        state.check_references(
            associations.tag_ids.unwrap_or_default(),
            associations.guest_ids.unwrap_or_default(),
        )?;

        state.overwrite_associations(session.id, associations);
        let stored = state
            .sessions
            .get_mut(&session.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.title.clone_from(&session.title);
        stored.description.clone_from(&session.description);
        stored.datetime = session.datetime;
        stored.presentation_url.clone_from(&session.presentation_url);
        stored.recording_url.clone_from(&session.recording_url);
        stored.visibility = session.visibility;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), RepositoryError> {
        if self.enter().await.remove_session(id) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn session_tags(
        &self,
        ids: &[SessionId],
    ) -> Result<Vec<(SessionId, Tag)>, RepositoryError> {
        let state = self.enter().await;
        let mut tags: Vec<(SessionId, Tag)> = state
            .session_tags
            .iter()
            .filter(|(session, _)| ids.contains(session))
            .filter_map(|(session, tag)| state.tags.get(tag).map(|t| (*session, t.clone())))
            .collect();
        tags.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn session_guests(&self, ids: &[SessionId]) -> Result<Vec<SessionGuest>, RepositoryError> {
        let state = self.enter().await;
        Ok(state
            .session_guests
            .iter()
            .filter(|(session, _)| ids.contains(session))
            .map(|&(session_id, user_id)| SessionGuest {
                session_id,
                user_id,
            })
            .collect())
    }

    async fn replace_associations(
        &self,
        id: SessionId,
        associations: Associations<'_>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.enter().await;
        if !state.sessions.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        state.check_references(
            associations.tag_ids.unwrap_or_default(),
            associations.guest_ids.unwrap_or_default(),
        )?;

        state.overwrite_associations(id, associations);
        Ok(())
    }

    // Tags

    async fn list_tags(&self) -> Result<Vec<Tag>, RepositoryError> {
        let state = self.enter().await;
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        tags.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tags)
    }

    async fn create_tag(&self, name: &str, color: &str) -> Result<Tag, RepositoryError> {
        let mut state = self.enter().await;
        let tag = Tag {
            id: TagId::generate(),
            name: name.to_owned(),
            color: color.to_owned(),
            created_at: Utc::now(),
        };
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    // Engagement

    async fn find_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<SessionInterest>, RepositoryError> {
        let state = self.enter().await;
        Ok(state
            .interests
            .values()
            .find(|i| i.session_id == session_id && i.user_id == user_id)
            .cloned())
    }

    async fn insert_interest(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<SessionInterest, RepositoryError> {
        let mut state = self.enter().await;
        if !state.sessions.contains_key(&session_id) {
            return Err(RepositoryError::InvalidReference(format!(
                "session {session_id} does not exist"
            )));
        }
        if state
            .interests
            .values()
            .any(|i| i.session_id == session_id && i.user_id == user_id)
        {
            return Err(RepositoryError::Conflict("interest already exists".to_owned()));
        }
        let interest = SessionInterest {
            id: InterestId::generate(),
            session_id,
            user_id,
            created_at: Utc::now(),
        };
        state.interests.insert(interest.id, interest.clone());
        Ok(interest)
    }

    async fn delete_interest(&self, id: InterestId) -> Result<(), RepositoryError> {
        match self.enter().await.interests.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_interests(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SessionInterest>, RepositoryError> {
        let state = self.enter().await;
        let mut interests: Vec<SessionInterest> = state
            .interests
            .values()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect();
        interests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(interests)
    }

    async fn insert_comment(
        &self,
        session_id: SessionId,
        author_id: UserId,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        let mut state = self.enter().await;
        if !state.sessions.contains_key(&session_id) {
            return Err(RepositoryError::InvalidReference(format!(
                "session {session_id} does not exist"
            )));
        }
        let now = Utc::now();
        let comment = Comment {
            id: CommentId::generate(),
            session_id,
            author_id,
            content: content.to_owned(),
            created_at: now,
            updated_at: now,
        };
        state.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        Ok(self.enter().await.comments.get(&id).cloned())
    }

    async fn update_comment(&self, id: CommentId, content: &str) -> Result<Comment, RepositoryError> {
        let mut state = self.enter().await;
        let comment = state.comments.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        content.clone_into(&mut comment.content);
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), RepositoryError> {
        match self.enter().await.comments.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_comments(&self, session_id: SessionId) -> Result<Vec<Comment>, RepositoryError> {
        let state = self.enter().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(comments)
    }
}
