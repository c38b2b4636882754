//! Session requests: submission, review and materialization.
//!
//! Approval and materialization are separate operations. Reviewers move a
//! pending request to approved or rejected; afterwards a reviewer, or the
//! basic user who asked, turns the approved request into a session.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use knowledge_share_core::lifecycle::{self, Review};
use knowledge_share_core::policy::{Capability, authorize, can_review};
use knowledge_share_core::{
    DraftError, DraftInput, Identity, RequestStatus, SessionRequest, SessionRequestId, Visibility,
};

use super::{Bounded, SessionService};
use crate::db::{NewRequest, RequestFilter, Store};
use crate::error::AppError;
use crate::models::{RequestView, SessionView};

/// A topic proposal as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub requested_datetime: DateTime<Utc>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Request lifecycle operations.
pub struct RequestService<'a, S> {
    store: Bounded<'a, S>,
}

impl<'a, S: Store> RequestService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>) -> Self {
        Self { store }
    }

    /// Propose a topic. Any signed-in user may submit.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank title.
    #[instrument(skip(self, identity, submission), fields(actor = %identity.id))]
    pub async fn submit(
        &self,
        identity: &Identity,
        submission: SubmitRequest,
    ) -> Result<RequestView, AppError> {
        let title = submission.title.trim();
        if title.is_empty() {
            return Err(DraftError::EmptyTitle.into());
        }
        let new_request = NewRequest {
            title: title.to_owned(),
            description: submission.description.trim().to_owned(),
            requested_datetime: submission.requested_datetime,
            visibility: submission.visibility,
            requester_id: identity.id,
        };

        let request = self
            .store
            .call(self.store.store().insert_request(&new_request))
            .await?;
        info!(request_id = %request.id, "Session request submitted");

        self.view(request).await
    }

    /// Requests visible to `identity`, newest first. Reviewers see all of
    /// them; everyone else sees their own.
    ///
    /// # Errors
    ///
    /// Store errors only.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn list(
        &self,
        identity: &Identity,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestView>, AppError> {
        let filter = RequestFilter {
            status,
            requester_id: (!can_review(identity)).then_some(identity.id),
        };
        let requests = self
            .store
            .call(self.store.store().list_requests(&filter))
            .await?;

        let people = self
            .store
            .directory(
                requests
                    .iter()
                    .flat_map(|r| std::iter::once(r.requester_id).chain(r.reviewer_id)),
            )
            .await?;
        Ok(requests
            .into_iter()
            .map(|request| RequestView {
                requester: people.person(request.requester_id),
                reviewer: request.reviewer_id.map(|id| people.person(id)),
                request,
            })
            .collect())
    }

    /// One request.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist, `Forbidden` for another user's
    /// request unless the caller is a reviewer.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn get(
        &self,
        identity: &Identity,
        id: SessionRequestId,
    ) -> Result<RequestView, AppError> {
        let request = self.load(id).await?;
        authorize(identity, Capability::ViewRequest(&request))?;
        self.view(request).await
    }

    /// `pending -> approved`.
    ///
    /// # Errors
    ///
    /// `Forbidden` for basic users, `Conflict` if the request was already
    /// reviewed (including by a concurrent reviewer).
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn approve(
        &self,
        identity: &Identity,
        id: SessionRequestId,
    ) -> Result<RequestView, AppError> {
        authorize(identity, Capability::ReviewRequests)?;
        let request = self.load(id).await?;
        let review = lifecycle::approve(&request, identity.id, Utc::now())?;

        let request = self.write_review(id, &review).await?;
        info!(request_id = %id, "Session request approved");
        self.view(request).await
    }

    /// `pending -> rejected` with a reason.
    ///
    /// # Errors
    ///
    /// `Forbidden` for basic users, `Validation` for a blank reason,
    /// `Conflict` if the request was already reviewed.
    #[instrument(skip(self, identity, reason), fields(actor = %identity.id))]
    pub async fn reject(
        &self,
        identity: &Identity,
        id: SessionRequestId,
        reason: &str,
    ) -> Result<RequestView, AppError> {
        authorize(identity, Capability::ReviewRequests)?;
        let request = self.load(id).await?;
        let review = lifecycle::reject(&request, identity.id, reason, Utc::now())
            .inspect_err(|e| debug!(request_id = %id, error = %e, "Rejection refused"))?;

        let request = self.write_review(id, &review).await?;
        info!(request_id = %id, "Session request rejected");
        self.view(request).await
    }

    /// Create the session for an approved request and link it.
    ///
    /// The caller becomes the session owner. A second attempt, concurrent or
    /// not, fails with `Conflict` and creates nothing.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the caller is a reviewer or the basic user who
    /// asked, `Conflict` if the request is not approved or already linked,
    /// `Validation` for a bad draft, `Incomplete` if the session was written
    /// without all of its associations.
    #[instrument(skip(self, identity, input), fields(actor = %identity.id))]
    pub async fn materialize(
        &self,
        identity: &Identity,
        id: SessionRequestId,
        input: DraftInput,
    ) -> Result<SessionView, AppError> {
        let request = self.load(id).await?;
        authorize(identity, Capability::MaterializeRequest(&request))?;
        lifecycle::ensure_materializable(&request)?;
        let draft = input.validate()?;

        let session = self
            .store
            .call(
                self.store
                    .store()
                    .materialize_session(identity.id, &draft, Some(id)),
            )
            .await
            .inspect_err(|e| warn!(request_id = %id, error = %e, "Materialization failed"))?;
        info!(request_id = %id, session_id = %session.id, "Session request materialized");

        SessionService::new(self.store).view(session).await
    }

    async fn load(&self, id: SessionRequestId) -> Result<SessionRequest, AppError> {
        self.store
            .call(self.store.store().get_request(id))
            .await?
            .ok_or_else(|| AppError::not_found("request"))
    }

    async fn write_review(
        &self,
        id: SessionRequestId,
        review: &Review,
    ) -> Result<SessionRequest, AppError> {
        self.store
            .call(self.store.store().review_request(id, review))
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::Conflict(_)) {
                    warn!(request_id = %id, "Review lost to a concurrent reviewer");
                }
            })
    }

    async fn view(&self, request: SessionRequest) -> Result<RequestView, AppError> {
        let people = self
            .store
            .directory(std::iter::once(request.requester_id).chain(request.reviewer_id))
            .await?;
        Ok(RequestView {
            requester: people.person(request.requester_id),
            reviewer: request.reviewer_id.map(|id| people.person(id)),
            request,
        })
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

    fn submission(title: &str) -> SubmitRequest {
        SubmitRequest {
            title: title.to_owned(),
            description: String::new(),
            requested_datetime: Utc::now() + Duration::days(14),
            visibility: Visibility::Public,
        }
    }

    fn schedule() -> DraftInput {
        DraftInput {
            title: "Intro to Rust".to_owned(),
            date: Some("2031-05-06".to_owned()),
            time: Some("15:00".to_owned()),
            ..DraftInput::default()
        }
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let store = MemoryStore::new();
        let basic = member(&store, "Bob", Role::Basic).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));

        assert!(matches!(
            service.submit(&basic, submission("   ")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_user_sees_only_own_requests() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let eve = member(&store, "Eve", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));

        let bobs = service.submit(&bob, submission("Bob's")).await.unwrap();
        service.submit(&eve, submission("Eve's")).await.unwrap();

        let listed = service.list(&bob, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.first().unwrap().requester.display_name, "Bob");
        assert_eq!(service.list(&pat, None).await.unwrap().len(), 2);

        assert!(matches!(
            service.get(&eve, bobs.request.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_user_cannot_review() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Mine")).await.unwrap();

        assert!(matches!(
            service.approve(&bob, request.request.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.reject(&bob, request.request.id, "no").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_second_review_conflicts() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let ada = member(&store, "Ada", Role::Admin).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Topic")).await.unwrap();

        let approved = service.approve(&pat, request.request.id).await.unwrap();
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert_eq!(approved.reviewer.unwrap().display_name, "Pat");

        assert!(matches!(
            service.reject(&ada, request.request.id, "too late").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_materialize_requires_approval() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Topic")).await.unwrap();

        // Pending: the requester has no capability yet, the reviewer hits the state check
        assert!(matches!(
            service.materialize(&bob, request.request.id, schedule()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.materialize(&pat, request.request.id, schedule()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_other_basic_user_cannot_materialize() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let eve = member(&store, "Eve", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Topic")).await.unwrap();
        service.approve(&pat, request.request.id).await.unwrap();

        assert!(matches!(
            service.materialize(&eve, request.request.id, schedule()).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_reviewer_materializes_as_owner() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Topic")).await.unwrap();
        service.approve(&pat, request.request.id).await.unwrap();

        let session = service
            .materialize(&pat, request.request.id, schedule())
            .await
            .unwrap();
        assert_eq!(session.session.owner_id, pat.id);
        assert_eq!(session.owner.display_name, "Pat");

        let linked = service.get(&bob, request.request.id).await.unwrap();
        assert_eq!(linked.request.linked_session_id, Some(session.session.id));
    }

    #[tokio::test]
    async fn test_bad_draft_writes_nothing() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let pat = member(&store, "Pat", Role::Planner).await;
        let service = RequestService::new(Bounded::new(&store, TIMEOUT));
        let request = service.submit(&bob, submission("Topic")).await.unwrap();
        service.approve(&pat, request.request.id).await.unwrap();

        let missing_time = DraftInput {
            time: None,
            ..schedule()
        };
        assert!(matches!(
            service
                .materialize(&bob, request.request.id, missing_time)
                .await,
            Err(AppError::Validation(_))
        ));
        let still = service.get(&bob, request.request.id).await.unwrap();
        assert!(still.request.linked_session_id.is_none());
    }
}
