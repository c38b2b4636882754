//! Interest markers and comments.
//!
//! Both require that the caller can see the session. A toggle reads the
//! current marker first, so a client retrying after a timeout must re-fetch
//! before toggling again or it will undo its own change.

use tracing::{debug, info, instrument};

use knowledge_share_core::policy::{Capability, authorize};
use knowledge_share_core::{Comment, CommentId, Identity, SessionId};

use super::{Bounded, SessionService};
use crate::db::Store;
use crate::error::AppError;
use crate::models::{CommentView, InterestState, InterestView};

pub struct EngagementService<'a, S> {
    store: Bounded<'a, S>,
}

impl<'a, S: Store> EngagementService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>) -> Self {
        Self { store }
    }

    /// Flip the caller's interest in a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing session, `Forbidden` if the caller cannot see
    /// it.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn toggle_interest(
        &self,
        identity: &Identity,
        session_id: SessionId,
    ) -> Result<InterestState, AppError> {
        self.ensure_visible(identity, session_id).await?;
        let store = self.store.store();

        let existing = self
            .store
            .call(store.find_interest(session_id, identity.id))
            .await?;
        let interested = match existing {
            Some(interest) => match self.store.call(store.delete_interest(interest.id)).await {
                // Removed concurrently by the same user
                Ok(()) | Err(AppError::NotFound(_)) => false,
                Err(e) => return Err(e),
            },
            None => match self
                .store
                .call(store.insert_interest(session_id, identity.id))
                .await
            {
                Ok(_) | Err(AppError::Conflict(_)) => true,
                Err(e) => return Err(e),
            },
        };

        let count = self
            .store
            .call(store.list_interests(session_id))
            .await?
            .len();
        info!(%session_id, interested, count, "Interest toggled");
        Ok(InterestState { interested, count })
    }

    /// Who is interested, oldest marker first.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Forbidden` as for viewing the session.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn list_interests(
        &self,
        identity: &Identity,
        session_id: SessionId,
    ) -> Result<Vec<InterestView>, AppError> {
        self.ensure_visible(identity, session_id).await?;
        let interests = self
            .store
            .call(self.store.store().list_interests(session_id))
            .await?;
        let people = self
            .store
            .directory(interests.iter().map(|i| i.user_id))
            .await?;

        Ok(interests
            .into_iter()
            .map(|interest| InterestView {
                user: people.person(interest.user_id),
                created_at: interest.created_at,
            })
            .collect())
    }

    /// Post a comment. Content is trimmed and must not be empty.
    ///
    /// # Errors
    ///
    /// `Validation` for blank content, `NotFound` or `Forbidden` as for
    /// viewing the session.
    #[instrument(skip(self, identity, content), fields(actor = %identity.id))]
    pub async fn add_comment(
        &self,
        identity: &Identity,
        session_id: SessionId,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let content = comment_text(content)?;
        self.ensure_visible(identity, session_id).await?;

        let comment = self
            .store
            .call(
                self.store
                    .store()
                    .insert_comment(session_id, identity.id, content),
            )
            .await?;
        info!(comment_id = %comment.id, %session_id, "Comment added");
        self.view(comment).await
    }

    /// Replace a comment's content. Only its author may.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing comment, `Forbidden` for anyone but the
    /// author, `Validation` for blank content.
    #[instrument(skip(self, identity, content), fields(actor = %identity.id))]
    pub async fn edit_comment(
        &self,
        identity: &Identity,
        id: CommentId,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let comment = self.load_comment(id).await?;
        authorize(identity, Capability::ModifyComment(&comment))?;
        let content = comment_text(content)?;

        let comment = self
            .store
            .call(self.store.store().update_comment(id, content))
            .await?;
        info!(comment_id = %id, "Comment edited");
        self.view(comment).await
    }

    /// Delete a comment. Only its author may.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing comment, `Forbidden` for anyone but the
    /// author.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn delete_comment(&self, identity: &Identity, id: CommentId) -> Result<(), AppError> {
        let comment = self.load_comment(id).await?;
        authorize(identity, Capability::ModifyComment(&comment))?;

        self.store
            .call(self.store.store().delete_comment(id))
            .await?;
        info!(comment_id = %id, "Comment deleted");
        Ok(())
    }

    /// Comments on a session, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Forbidden` as for viewing the session.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn list_comments(
        &self,
        identity: &Identity,
        session_id: SessionId,
    ) -> Result<Vec<CommentView>, AppError> {
        self.ensure_visible(identity, session_id).await?;
        let comments = self
            .store
            .call(self.store.store().list_comments(session_id))
            .await?;
        let people = self
            .store
            .directory(comments.iter().map(|c| c.author_id))
            .await?;

        Ok(comments
            .into_iter()
            .map(|comment| {
                let author = people.person(comment.author_id);
                CommentView::new(comment, author)
            })
            .collect())
    }

    async fn ensure_visible(&self, identity: &Identity, id: SessionId) -> Result<(), AppError> {
        SessionService::new(self.store)
            .visible(identity, id)
            .await
            .inspect_err(|e| debug!(session_id = %id, error = %e, "Engagement refused"))
            .map(drop)
    }

    async fn load_comment(&self, id: CommentId) -> Result<Comment, AppError> {
        self.store
            .call(self.store.store().get_comment(id))
            .await?
            .ok_or_else(|| AppError::not_found("comment"))
    }

    async fn view(&self, comment: Comment) -> Result<CommentView, AppError> {
        let author = self
            .store
            .directory([comment.author_id])
            .await?
            .person(comment.author_id);
        Ok(CommentView::new(comment, author))
    }
}

fn comment_text(raw: &str) -> Result<&str, AppError> {
    let content = raw.trim();
    if content.is_empty() {
        Err(AppError::Validation("comment cannot be empty".to_owned()))
    } else {
        Ok(content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use knowledge_share_core::{DraftInput, Role, Visibility};

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::testing::{TIMEOUT, member};

    async fn session(store: &MemoryStore, owner: &Identity, visibility: Visibility) -> SessionId {
        let input = DraftInput {
            title: "Lunch and learn".to_owned(),
            datetime: Some((Utc::now() + Duration::days(1)).to_rfc3339()),
            visibility,
            ..DraftInput::default()
        };
        SessionService::new(Bounded::new(store, TIMEOUT))
            .create(owner, input)
            .await
            .unwrap()
            .session
            .id
    }

    #[tokio::test]
    async fn test_toggle_is_its_own_inverse() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let id = session(&store, &pat, Visibility::Public).await;
        let service = EngagementService::new(Bounded::new(&store, TIMEOUT));

        let on = service.toggle_interest(&bob, id).await.unwrap();
        assert_eq!(on, InterestState { interested: true, count: 1 });
        let off = service.toggle_interest(&bob, id).await.unwrap();
        assert_eq!(off, InterestState { interested: false, count: 0 });
    }

    #[tokio::test]
    async fn test_interest_lists_people() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let id = session(&store, &pat, Visibility::Public).await;
        let service = EngagementService::new(Bounded::new(&store, TIMEOUT));

        service.toggle_interest(&bob, id).await.unwrap();
        let people = service.list_interests(&pat, id).await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people.first().unwrap().user.display_name, "Bob");
    }

    #[tokio::test]
    async fn test_outsider_cannot_engage_with_private_session() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let id = session(&store, &pat, Visibility::Private).await;
        let service = EngagementService::new(Bounded::new(&store, TIMEOUT));

        assert!(matches!(
            service.toggle_interest(&bob, id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.add_comment(&bob, id, "hello").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.list_comments(&bob, id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_comment_is_rejected() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let id = session(&store, &pat, Visibility::Public).await;
        let service = EngagementService::new(Bounded::new(&store, TIMEOUT));

        assert!(matches!(
            service.add_comment(&pat, id, " \n\t ").await,
            Err(AppError::Validation(_))
        ));
        assert!(service.list_comments(&pat, id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_author_edits_or_deletes() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let ada = member(&store, "Ada", Role::Admin).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let id = session(&store, &pat, Visibility::Public).await;
        let service = EngagementService::new(Bounded::new(&store, TIMEOUT));

        let comment = service.add_comment(&bob, id, "  first!  ").await.unwrap();
        assert_eq!(comment.comment.content, "first!");
        assert!(!comment.edited);

        assert!(matches!(
            service.edit_comment(&ada, comment.comment.id, "moderated").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_comment(&pat, comment.comment.id).await,
            Err(AppError::Forbidden(_))
        ));

        let edited = service
            .edit_comment(&bob, comment.comment.id, "second thoughts")
            .await
            .unwrap();
        assert_eq!(edited.comment.content, "second thoughts");
        assert_eq!(edited.author.display_name, "Bob");

        service.delete_comment(&bob, comment.comment.id).await.unwrap();
        assert!(matches!(
            service.delete_comment(&bob, comment.comment.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
