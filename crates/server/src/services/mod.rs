//! Business logic for Knowledge Share.
//!
//! # Services
//!
//! - `identity` - Identity provider assertions and per-request identity resolution
//! - `requests` - Session request submission, review and materialization
//! - `sessions` - Scheduled sessions, their tags and guest lists
//! - `tags` - Shared session labels
//! - `engagement` - Interest markers and comments
//! - `users` - Profiles and role management
//!
//! Every service borrows a [`Store`] and a per-call deadline. A store call that
//! misses the deadline surfaces as [`AppError::Unknown`], since the write may
//! still land.

pub mod engagement;
pub mod identity;
pub mod requests;
pub mod sessions;
pub mod tags;
pub mod users;

use std::future::Future;
use std::time::Duration;

pub use engagement::EngagementService;
pub use identity::{Assertion, IdentityError, IdentityService, SIGNATURE_HEADER, sign_assertion};
pub use requests::{RequestService, SubmitRequest};
pub use sessions::{AssociationsInput, SessionListQuery, SessionService, When};
pub use tags::{NewTag, TagService};
pub use users::{UserListQuery, UserService};

use crate::db::{RepositoryError, Store};
use crate::error::AppError;
use crate::models::views::Directory;

/// A store plus the deadline applied to each call.
#[derive(Debug)]
pub struct Bounded<'a, S> {
    store: &'a S,
    timeout: Duration,
}

// Only a reference is held, so no `S: Copy` bound.
impl<S> Clone for Bounded<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Bounded<'_, S> {}

impl<'a, S: Store> Bounded<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub(crate) const fn store(&self) -> &'a S {
        self.store
    }

    /// Await a store call under the deadline.
    pub(crate) async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                AppError::Unknown(format!(
                    "the store did not answer within {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(AppError::from)
    }

    /// Display names for the given users.
    pub(crate) async fn directory(
        &self,
        ids: impl IntoIterator<Item = knowledge_share_core::UserId>,
    ) -> Result<Directory, AppError> {
        let mut ids: Vec<_> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Directory::default());
        }
        let profiles = self.call(self.store.profiles_by_ids(&ids)).await?;
        Ok(Directory::new(profiles))
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use knowledge_share_core::Role;

    use super::testing::{TIMEOUT, member};
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_reports_unknown_outcome() {
        let store = MemoryStore::new();
        let ada = member(&store, "Ada", Role::Basic).await;
        store.set_latency(Duration::from_secs(30));

        let bounded = Bounded::new(&store, TIMEOUT);
        let err = bounded.call(store.get_profile(ada.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Unknown(_)));
    }

    #[tokio::test]
    async fn test_bounded_is_copy_for_non_copy_stores() {
        let store = MemoryStore::new();
        let ada = member(&store, "Ada", Role::Basic).await;

        let bounded = Bounded::new(&store, TIMEOUT);
        let copied = bounded;
        assert!(bounded.call(store.get_profile(ada.id)).await.unwrap().is_some());
        assert!(copied.call(store.get_profile(ada.id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_directory_resolves_known_names() {
        let store = MemoryStore::new();
        let ada = member(&store, "Ada", Role::Basic).await;
        let gone = knowledge_share_core::UserId::generate();

        let directory = Bounded::new(&store, TIMEOUT)
            .directory([ada.id, ada.id, gone])
            .await
            .unwrap();
        assert_eq!(directory.person(ada.id).display_name, "Ada");
        assert_eq!(directory.person(gone).display_name, "Former member");
    }
}
