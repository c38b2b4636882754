//! Profiles and roles.

use serde::Deserialize;
use tracing::{info, instrument, warn};

use knowledge_share_core::policy::{Capability, authorize};
use knowledge_share_core::{Identity, Profile, Role, UserId};

use super::Bounded;
use crate::db::{ProfileFilter, Store};
use crate::error::AppError;

const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Query for the user directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub q: Option<String>,
}

pub struct UserService<'a, S> {
    store: Bounded<'a, S>,
}

impl<'a, S: Store> UserService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>) -> Self {
        Self { store }
    }

    /// The caller's own profile.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` if the profile was removed meanwhile.
    pub async fn me(&self, identity: &Identity) -> Result<Profile, AppError> {
        self.store
            .call(self.store.store().get_profile(identity.id))
            .await?
            .ok_or_else(|| AppError::Unauthenticated("account no longer exists".to_owned()))
    }

    /// Rename oneself.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank or overlong name.
    #[instrument(skip(self, identity, display_name), fields(actor = %identity.id))]
    pub async fn update_display_name(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<Profile, AppError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::Validation("display name cannot be empty".to_owned()));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "display name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
            )));
        }

        let profile = self
            .store
            .call(
                self.store
                    .store()
                    .update_display_name(identity.id, display_name),
            )
            .await?;
        info!("Display name updated");
        Ok(profile)
    }

    /// All users matching `query`. Admins only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn list(
        &self,
        identity: &Identity,
        query: UserListQuery,
    ) -> Result<Vec<Profile>, AppError> {
        authorize(identity, Capability::ManageUsers)?;
        let filter = ProfileFilter {
            role: query.role,
            search: query
                .q
                .map(|q| q.trim().to_owned())
                .filter(|q| !q.is_empty()),
        };
        self.store
            .call(self.store.store().list_profiles(&filter))
            .await
    }

    /// Change another user's role. Admins only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `Validation` when targeting oneself,
    /// `NotFound` for an unknown user.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn set_role(
        &self,
        identity: &Identity,
        target: UserId,
        role: Role,
    ) -> Result<Profile, AppError> {
        authorize(identity, Capability::ManageUsers)?;
        if target == identity.id {
            return Err(AppError::Validation(
                "you cannot change your own role".to_owned(),
            ));
        }

        let profile = self
            .store
            .call(self.store.store().update_role(target, role))
            .await?;
        info!(user_id = %target, %role, "Role changed");
        Ok(profile)
    }

    /// Remove a user and everything they own. Admins only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `Validation` when targeting oneself,
    /// `NotFound` for an unknown user.
    #[instrument(skip(self, identity), fields(actor = %identity.id))]
    pub async fn delete(&self, identity: &Identity, target: UserId) -> Result<(), AppError> {
        authorize(identity, Capability::ManageUsers)?;
        if target == identity.id {
            return Err(AppError::Validation(
                "you cannot delete your own account".to_owned(),
            ));
        }

        self.store
            .call(self.store.store().delete_profile(target))
            .await?;
        warn!(user_id = %target, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::testing::{TIMEOUT, member};

    #[tokio::test]
    async fn test_rename_trims_and_validates() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = UserService::new(Bounded::new(&store, TIMEOUT));

        let profile = service
            .update_display_name(&bob, "  Robert  ")
            .await
            .unwrap();
        assert_eq!(profile.display_name, "Robert");
        assert!(matches!(
            service.update_display_name(&bob, "   ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.update_display_name(&bob, &"x".repeat(101)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_only_admin_manages_users() {
        let store = MemoryStore::new();
        let pat = member(&store, "Pat", Role::Planner).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = UserService::new(Bounded::new(&store, TIMEOUT));

        assert!(matches!(
            service.list(&pat, UserListQuery::default()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.set_role(&pat, bob.id, Role::Admin).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete(&pat, bob.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_promotes_and_filters() {
        let store = MemoryStore::new();
        let ada = member(&store, "Ada", Role::Admin).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        member(&store, "Bea", Role::Basic).await;
        let service = UserService::new(Bounded::new(&store, TIMEOUT));

        let promoted = service.set_role(&ada, bob.id, Role::Planner).await.unwrap();
        assert_eq!(promoted.role, Role::Planner);

        let planners = service
            .list(
                &ada,
                UserListQuery {
                    role: Some(Role::Planner),
                    q: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(planners.len(), 1);

        let found = service
            .list(
                &ada,
                UserListQuery {
                    role: None,
                    q: Some("BEA@".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(found.first().unwrap().display_name, "Bea");
    }

    #[tokio::test]
    async fn test_admin_cannot_remove_self() {
        let store = MemoryStore::new();
        let ada = member(&store, "Ada", Role::Admin).await;
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = UserService::new(Bounded::new(&store, TIMEOUT));

        assert!(matches!(
            service.delete(&ada, ada.id).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.set_role(&ada, ada.id, Role::Basic).await,
            Err(AppError::Validation(_))
        ));

        service.delete(&ada, bob.id).await.unwrap();
        assert!(matches!(
            service.delete(&ada, bob.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
