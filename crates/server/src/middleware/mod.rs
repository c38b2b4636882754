//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP context)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! Authentication is not a layer: handlers that need an identity take the
//! [`RequireIdentity`] extractor, which re-resolves the user per request.

pub mod auth;
pub mod session;

pub use auth::{RequireIdentity, clear_current_user, set_current_user};
pub use session::{create_session_layer, create_session_store};
