//! Shared fixtures for the Knowledge Share integration tests.
//!
//! Most tests run entirely in process: a [`Harness`] pairs a
//! [`MemoryStore`] with an [`AppState`], so services and the full router can
//! be exercised without a database. Tests that need a running server are
//! marked `#[ignore]`.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests
//! cargo test -p knowledge-share-integration-tests
//!
//! # Against a running server (KS_BASE_URL, KS_IDENTITY_SECRET)
//! cargo test -p knowledge-share-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use knowledge_share_core::{DraftInput, Email, Identity, Role, UserId, Visibility};
use knowledge_share_server::config::{IdentityConfig, ServerConfig};
use knowledge_share_server::db::{MemoryStore, ProfileClaims};
use knowledge_share_server::middleware::create_session_layer;
use knowledge_share_server::services::{Assertion, SIGNATURE_HEADER, sign_assertion};
use knowledge_share_server::state::AppState;

/// Shared secret the in-process server and the tests sign with.
pub const IDENTITY_SECRET: &str = "Gv4pT9xQ2mLr7Wz1Kc8Ns5Hd3Jb6Yf0A";

/// Configuration for an in-process server.
#[must_use]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: SecretString::from("postgres://localhost/knowledge_share_test".to_owned()),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://localhost:3000".to_owned(),
        identity: IdentityConfig {
            secret: SecretString::from(IDENTITY_SECRET.to_owned()),
            max_age: Duration::from_secs(300),
        },
        store_timeout: Duration::from_secs(5),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A memory-backed application and a handle on its store.
pub struct Harness {
    pub store: MemoryStore,
    pub state: AppState<MemoryStore>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(test_config(), store.clone());
        Self { store, state }
    }

    /// Seed a profile named `name` with `role`, as if they had signed in.
    pub async fn member(&self, name: &str, role: Role) -> Identity {
        let claims = ProfileClaims {
            id: UserId::generate(),
            email: Email::parse(&format!("{}@example.com", name.to_lowercase())).unwrap(),
            display_name: name.to_owned(),
        };
        self.store.seed_profile(&claims, role).await.identity()
    }

    /// The full router with an in-memory cookie session store.
    #[must_use]
    pub fn router(&self) -> Router {
        let layer = create_session_layer(
            tower_sessions::MemoryStore::default(),
            self.state.config(),
        );
        knowledge_share_server::app(self.state.clone(), layer)
    }
}

/// A draft for a session at `at`.
#[must_use]
pub fn draft(title: &str, at: DateTime<Utc>) -> DraftInput {
    DraftInput {
        title: title.to_owned(),
        datetime: Some(at.to_rfc3339()),
        visibility: Visibility::Public,
        ..DraftInput::default()
    }
}

/// A signed identity assertion: the signature header value and the body.
#[must_use]
pub fn signed_assertion(identity: &Identity, issued_at: DateTime<Utc>) -> (String, Vec<u8>) {
    let body = serde_json::to_vec(&Assertion {
        user_id: identity.id,
        email: identity.email.to_string(),
        display_name: identity.display_name.clone(),
        issued_at: issued_at.timestamp(),
    })
    .unwrap();
    let secret = SecretString::from(IDENTITY_SECRET.to_owned());
    (sign_assertion(&secret, &body).unwrap(), body)
}

/// Sign in through `POST /auth/session` and return the session cookie.
pub async fn sign_in(app: &Router, identity: &Identity) -> String {
    let (signature, body) = signed_assertion(identity, Utc::now());
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/session")
                .header(SIGNATURE_HEADER, signature)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success(), "sign-in failed: {}", response.status());

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_owned()
}

/// Send a request with an optional cookie and JSON body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Read a response body as JSON.
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
