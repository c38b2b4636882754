//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::{PgStore, Store};
use crate::services::{
    Bounded, EngagementService, IdentityService, RequestService, SessionService, TagService,
    UserService,
};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Generic over the store so the same router
/// runs against `PostgreSQL` in production and in memory in tests.
pub struct AppState<S = PgStore> {
    inner: Arc<AppStateInner<S>>,
}

struct AppStateInner<S> {
    config: ServerConfig,
    store: S,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> AppState<S> {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, store: S) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The store with the configured per-call deadline.
    #[must_use]
    pub fn bounded(&self) -> Bounded<'_, S> {
        Bounded::new(&self.inner.store, self.inner.config.store_timeout)
    }

    #[must_use]
    pub fn identity(&self) -> IdentityService<'_, S> {
        IdentityService::new(self.bounded(), &self.inner.config.identity)
    }

    #[must_use]
    pub fn requests(&self) -> RequestService<'_, S> {
        RequestService::new(self.bounded())
    }

    #[must_use]
    pub fn sessions(&self) -> SessionService<'_, S> {
        SessionService::new(self.bounded())
    }

    #[must_use]
    pub fn tags(&self) -> TagService<'_, S> {
        TagService::new(self.bounded())
    }

    #[must_use]
    pub fn engagement(&self) -> EngagementService<'_, S> {
        EngagementService::new(self.bounded())
    }

    #[must_use]
    pub fn users(&self) -> UserService<'_, S> {
        UserService::new(self.bounded())
    }
}
