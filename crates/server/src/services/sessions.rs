//! Scheduled sessions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use knowledge_share_core::policy::{self, Capability, authorize};
use knowledge_share_core::schedule::distinct;
use knowledge_share_core::{
    DraftInput, Identity, Session, SessionId, SessionPatch, TagId, UserId, Visibility,
};

use super::Bounded;
use crate::db::{Associations, SessionQuery, Store};
use crate::error::AppError;
use crate::models::{SessionDetail, SessionView};

/// Which side of "now" to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum When {
    /// Strictly after now.
    Upcoming,
    /// At or before now.
    Past,
    #[default]
    All,
}

/// Listing parameters as accepted from clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionListQuery {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub when: When,
    pub tag: Option<TagId>,
    /// Case-insensitive text search over title and description.
    pub q: Option<String>,
    /// Only sessions owned by the viewer.
    pub mine: bool,
}

/// Replacement association sets. `None` leaves a set as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssociationsInput {
    pub tag_ids: Option<Vec<TagId>>,
    pub guest_ids: Option<Vec<UserId>>,
}

/// Session scheduling, browsing and editing.
pub struct SessionService<'a, S> {
    store: Bounded<'a, S>,
}

impl<'a, S: Store> SessionService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>) -> Self {
        Self { store }
    }

    /// Schedule a session without a request. Planners and admins only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for basic users, `Validation` for a bad draft or unknown
    /// tag or guest ids.
    #[instrument(skip(self, identity, input), fields(actor = %identity.id))]
    pub async fn create(
        &self,
        identity: &Identity,
        input: DraftInput,
    ) -> Result<SessionView, AppError> {
        authorize(identity, Capability::CreateSession)?;
        let draft = input.validate()?;

        let session = self
            .store
            .call(self.store.store().materialize_session(identity.id, &draft, None))
            .await?;
        info!(session_id = %session.id, "Session created");

        self.view(session).await
    }

    /// One session as seen by `identity`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the session does not exist, `Forbidden` if the viewer may
    /// not see it.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn get(&self, identity: &Identity, id: SessionId) -> Result<SessionDetail, AppError> {
        let (session, guest_ids) = self.visible(identity, id).await?;

        let interests = self
            .store
            .call(self.store.store().list_interests(id))
            .await?;
        let can_edit = policy::can_edit(identity, &session);

        let mut guests = HashMap::from([(id, guest_ids)]);
        let view = self
            .assemble(vec![session], &mut guests)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("session"))?;

        Ok(SessionDetail {
            view,
            interest_count: interests.len(),
            interested: interests.iter().any(|i| i.user_id == identity.id),
            can_edit,
        })
    }

    /// Sessions matching `query` that `identity` may see.
    ///
    /// Latest first, or earliest first when a date range is given.
    ///
    /// # Errors
    ///
    /// `Validation` when `from` is after `to`.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn list(
        &self,
        identity: &Identity,
        query: SessionListQuery,
    ) -> Result<Vec<SessionView>, AppError> {
        if let (Some(from), Some(to)) = (query.from, query.to)
            && from > to
        {
            return Err(AppError::Validation(
                "`from` must not be after `to`".to_owned(),
            ));
        }

        let now = Utc::now();
        let store_query = SessionQuery {
            from: query.from,
            to: query.to,
            after: (query.when == When::Upcoming).then_some(now),
            until: (query.when == When::Past).then_some(now),
            tag_id: query.tag,
            search: query
                .q
                .map(|q| q.trim().to_owned())
                .filter(|q| !q.is_empty()),
            owner_id: query.mine.then_some(identity.id),
            ascending: query.from.is_some() || query.to.is_some(),
        };

        let sessions = self
            .store
            .call(self.store.store().list_sessions(&store_query))
            .await?;
        let ids: Vec<SessionId> = sessions.iter().map(|s| s.id).collect();
        let mut guests = self.guests_by_session(&ids).await?;

        let visible: Vec<Session> = sessions
            .into_iter()
            .filter(|session| {
                let guest_ids = guests.get(&session.id).map_or(&[][..], Vec::as_slice);
                policy::can_view(identity, session, guest_ids)
            })
            .collect();
        debug!(count = visible.len(), "Sessions listed");

        self.assemble(visible, &mut guests).await
    }

    /// Apply a partial update.
    ///
    /// Tag and guest sets, when present, replace the stored ones. Making a
    /// session public clears its guests.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the editor owns the session or is privileged,
    /// `Validation` for invalid fields or a change to the title or time of a
    /// session that already took place.
    #[instrument(skip(self, identity, patch), fields(actor = %identity.id))]
    pub async fn update(
        &self,
        identity: &Identity,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<SessionView, AppError> {
        let current = self.load(id).await?;
        authorize(identity, Capability::EditSession(&current))?;
        if patch.is_empty() {
            return self.view(current).await;
        }

        let edit = patch.apply(&current, Utc::now())?;
        let associations = Associations {
            tag_ids: edit.tag_ids.as_deref(),
            guest_ids: edit.guest_ids.as_deref(),
        };
        let session = self
            .store
            .call(self.store.store().update_session(&edit.session, associations))
            .await?;
        info!(session_id = %id, "Session updated");

        self.view(session).await
    }

    /// Remove a session with everything attached to it.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the caller owns the session or is privileged.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn delete(&self, identity: &Identity, id: SessionId) -> Result<(), AppError> {
        let session = self.load(id).await?;
        authorize(identity, Capability::DeleteSession(&session))?;

        self.store
            .call(self.store.store().delete_session(id))
            .await?;
        info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Overwrite tags and guests. Safe to repeat; this is the repair for a
    /// session reported as incomplete.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the caller may edit the session, `Validation` for
    /// unknown tag or guest ids.
    #[instrument(skip(self, identity, input), fields(actor = %identity.id))]
    pub async fn replace_associations(
        &self,
        identity: &Identity,
        id: SessionId,
        input: AssociationsInput,
    ) -> Result<SessionView, AppError> {
        let session = self.load(id).await?;
        authorize(identity, Capability::EditSession(&session))?;

        let tag_ids = input.tag_ids.map(distinct);
        let guest_ids = match session.visibility {
            Visibility::Private => input.guest_ids.map(distinct),
            Visibility::Public => input.guest_ids.map(|_| Vec::new()),
        };
        let associations = Associations {
            tag_ids: tag_ids.as_deref(),
            guest_ids: guest_ids.as_deref(),
        };
        self.store
            .call(self.store.store().replace_associations(id, associations))
            .await?;
        info!(session_id = %id, "Session associations replaced");

        self.view(session).await
    }

    /// Load a session and check that `identity` may see it.
    pub(crate) async fn visible(
        &self,
        identity: &Identity,
        id: SessionId,
    ) -> Result<(Session, Vec<UserId>), AppError> {
        let session = self.load(id).await?;
        let guest_ids = self.guests_of(id).await?;
        authorize(
            identity,
            Capability::ViewSession {
                session: &session,
                guests: &guest_ids,
            },
        )?;
        Ok((session, guest_ids))
    }

    async fn load(&self, id: SessionId) -> Result<Session, AppError> {
        self.store
            .call(self.store.store().get_session(id))
            .await?
            .ok_or_else(|| AppError::not_found("session"))
    }

    async fn guests_of(&self, id: SessionId) -> Result<Vec<UserId>, AppError> {
        Ok(self
            .guests_by_session(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default())
    }

    async fn guests_by_session(
        &self,
        ids: &[SessionId],
    ) -> Result<HashMap<SessionId, Vec<UserId>>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .store
            .call(self.store.store().session_guests(ids))
            .await?;
        let mut guests: HashMap<SessionId, Vec<UserId>> = HashMap::new();
        for row in rows {
            guests.entry(row.session_id).or_default().push(row.user_id);
        }
        Ok(guests)
    }

    /// A freshly written session with its stored associations.
    pub(crate) async fn view(&self, session: Session) -> Result<SessionView, AppError> {
        let mut guests = self.guests_by_session(&[session.id]).await?;
        self.assemble(vec![session], &mut guests)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("session"))
    }

    async fn assemble(
        &self,
        sessions: Vec<Session>,
        guests: &mut HashMap<SessionId, Vec<UserId>>,
    ) -> Result<Vec<SessionView>, AppError> {
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<SessionId> = sessions.iter().map(|s| s.id).collect();
        let mut tags: HashMap<SessionId, Vec<_>> = HashMap::new();
        for (session_id, tag) in self
            .store
            .call(self.store.store().session_tags(&ids))
            .await?
        {
            tags.entry(session_id).or_default().push(tag);
        }
        let owners = self.store.directory(sessions.iter().map(|s| s.owner_id)).await?;

        let now = Utc::now();
        Ok(sessions
            .into_iter()
            .map(|session| SessionView {
                owner: owners.person(session.owner_id),
                tags: tags.remove(&session.id).unwrap_or_default(),
                guest_ids: guests.remove(&session.id).unwrap_or_default(),
                is_past: session.is_past(now),
                session,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use knowledge_share_core::Role;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::testing::{TIMEOUT, member};

    fn draft(title: &str, datetime: DateTime<Utc>, visibility: Visibility) -> DraftInput {
        DraftInput {
            title: title.to_owned(),
            datetime: Some(datetime.to_rfc3339()),
            visibility,
            ..DraftInput::default()
        }
    }

    #[tokio::test]
    async fn test_basic_user_cannot_create_directly() {
        let store = MemoryStore::new();
        let basic = member(&store, "Bob", Role::Basic).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let result = service
            .create(&basic, draft("Rust", Utc::now(), Visibility::Public))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_private_session_hidden_from_outsiders() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let guest = member(&store, "Gus", Role::Basic).await;
        let outsider = member(&store, "Olga", Role::Basic).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let mut input = draft("Secret", Utc::now() + Duration::days(1), Visibility::Private);
        input.guest_ids = vec![guest.id];
        let created = service.create(&planner, input).await.unwrap();

        assert!(service.get(&guest, created.session.id).await.is_ok());
        assert!(matches!(
            service.get(&outsider, created.session.id).await,
            Err(AppError::Forbidden(_))
        ));

        let seen = service
            .list(&outsider, SessionListQuery::default())
            .await
            .unwrap();
        assert!(seen.is_empty());
        let seen = service
            .list(&guest, SessionListQuery::default())
            .await
            .unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_list_splits_upcoming_and_past() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));
        let now = Utc::now();

        service
            .create(&planner, draft("Yesterday", now - Duration::days(1), Visibility::Public))
            .await
            .unwrap();
        service
            .create(&planner, draft("Tomorrow", now + Duration::days(1), Visibility::Public))
            .await
            .unwrap();

        let upcoming = service
            .list(
                &planner,
                SessionListQuery {
                    when: When::Upcoming,
                    ..SessionListQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming.first().unwrap().session.title, "Tomorrow");

        let past = service
            .list(
                &planner,
                SessionListQuery {
                    when: When::Past,
                    ..SessionListQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(past.len(), 1);
        assert!(past.first().unwrap().is_past);
    }

    #[tokio::test]
    async fn test_week_range_is_ascending() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));
        let monday = Utc::now() + Duration::days(7);

        for (title, offset) in [("Wed", 2), ("Mon", 0), ("Next Mon", 7)] {
            service
                .create(
                    &planner,
                    draft(title, monday + Duration::days(offset), Visibility::Public),
                )
                .await
                .unwrap();
        }

        let week = service
            .list(
                &planner,
                SessionListQuery {
                    from: Some(monday),
                    to: Some(monday + Duration::days(7)),
                    ..SessionListQuery::default()
                },
            )
            .await
            .unwrap();
        let titles: Vec<&str> = week.iter().map(|v| v.session.title.as_str()).collect();
        assert_eq!(titles, ["Mon", "Wed"]);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));
        let now = Utc::now();

        let result = service
            .list(
                &planner,
                SessionListQuery {
                    from: Some(now),
                    to: Some(now - Duration::days(1)),
                    ..SessionListQuery::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_past_session_title_is_frozen() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let created = service
            .create(&planner, draft("History", Utc::now() - Duration::days(3), Visibility::Public))
            .await
            .unwrap();

        let rename = SessionPatch {
            title: Some("Revisionism".to_owned()),
            ..SessionPatch::default()
        };
        assert!(matches!(
            service.update(&planner, created.session.id, rename).await,
            Err(AppError::Validation(_))
        ));

        let recording = SessionPatch {
            recording_url: Some("https://video.example.com/history".to_owned()),
            ..SessionPatch::default()
        };
        let updated = service
            .update(&planner, created.session.id, recording)
            .await
            .unwrap();
        assert_eq!(
            updated.session.recording_url.as_deref(),
            Some("https://video.example.com/history")
        );
    }

    #[tokio::test]
    async fn test_owner_edits_but_others_cannot() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let basic = member(&store, "Bob", Role::Basic).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let created = service
            .create(&planner, draft("Talk", Utc::now() + Duration::days(2), Visibility::Public))
            .await
            .unwrap();
        let patch = SessionPatch {
            description: Some("New".to_owned()),
            ..SessionPatch::default()
        };

        assert!(matches!(
            service.update(&basic, created.session.id, patch.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete(&basic, created.session.id).await,
            Err(AppError::Forbidden(_))
        ));
        service.delete(&planner, created.session.id).await.unwrap();
        assert!(matches!(
            service.get(&planner, created.session.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_going_public_clears_guests() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let guest = member(&store, "Gus", Role::Basic).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let mut input = draft("Closed", Utc::now() + Duration::days(1), Visibility::Private);
        input.guest_ids = vec![guest.id];
        let created = service.create(&planner, input).await.unwrap();
        assert_eq!(created.guest_ids, vec![guest.id]);

        let patch = SessionPatch {
            visibility: Some(Visibility::Public),
            ..SessionPatch::default()
        };
        let updated = service
            .update(&planner, created.session.id, patch)
            .await
            .unwrap();
        assert!(updated.guest_ids.is_empty());
    }

    #[tokio::test]
    async fn test_refused_edit_leaves_session_unchanged() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let created = service
            .create(&planner, draft("Original", Utc::now() + Duration::days(2), Visibility::Public))
            .await
            .unwrap();

        let patch = SessionPatch {
            title: Some("Renamed".to_owned()),
            tag_ids: Some(vec![TagId::generate()]),
            ..SessionPatch::default()
        };
        assert!(matches!(
            service.update(&planner, created.session.id, patch).await,
            Err(AppError::Validation(_))
        ));

        let stored = service.get(&planner, created.session.id).await.unwrap();
        assert_eq!(stored.view.session.title, "Original");
        assert!(stored.view.tags.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_guest_is_a_validation_error() {
        let store = MemoryStore::new();
        let planner = member(&store, "Pat", Role::Planner).await;
        let service = SessionService::new(Bounded::new(&store, TIMEOUT));

        let mut input = draft("Closed", Utc::now() + Duration::days(1), Visibility::Private);
        input.guest_ids = vec![UserId::generate()];
        assert!(matches!(
            service.create(&planner, input).await,
            Err(AppError::Validation(_))
        ));
    }
}
