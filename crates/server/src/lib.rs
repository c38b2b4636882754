//! Knowledge Share server library.
//!
//! Members propose session topics, reviewers approve or reject them, and
//! approved topics become scheduled sessions that others can browse, tag,
//! comment on and mark interest in. The binary in `main.rs` wires this
//! library to `PostgreSQL`; tests wire it to [`db::MemoryStore`].
//!
//! # Layers
//!
//! - [`routes`] - JSON handlers, thin wrappers over services
//! - [`services`] - Authorization, lifecycle rules and store deadlines
//! - [`db`] - The [`db::Store`] seam and its implementations
//! - `knowledge_share_core` - Domain types, policy and lifecycle rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::Router;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use db::Store;
use state::AppState;

/// Build the application router around `state`.
///
/// Sentry layers are added by the binary so tests run without a client.
pub fn app<S, SS>(state: AppState<S>, session_layer: SessionManagerLayer<SS>) -> Router
where
    S: Store,
    SS: SessionStore + Clone,
{
    routes::routes()
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
