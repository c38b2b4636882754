//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                           - Liveness
//! GET    /health/ready                     - Store connectivity
//!
//! # Auth
//! POST   /auth/session                     - Exchange an identity assertion for a cookie session
//! POST   /auth/logout                      - End the cookie session
//!
//! # Users
//! GET    /api/me                           - Own profile
//! PATCH  /api/me                           - Change own display name
//! GET    /api/users                        - Directory (admin)
//! PATCH  /api/users/{id}/role              - Change a role (admin)
//! DELETE /api/users/{id}                   - Remove a user (admin)
//!
//! # Requests
//! GET    /api/requests                     - List (own, or all for reviewers)
//! POST   /api/requests                     - Submit
//! GET    /api/requests/{id}                - Detail
//! POST   /api/requests/{id}/approve        - Approve (reviewers)
//! POST   /api/requests/{id}/reject         - Reject with a reason (reviewers)
//! POST   /api/requests/{id}/materialize    - Create the session for an approved request
//!
//! # Sessions
//! GET    /api/sessions                     - Browse
//! POST   /api/sessions                     - Create directly (reviewers)
//! GET    /api/sessions/{id}                - Detail
//! PATCH  /api/sessions/{id}                - Edit
//! DELETE /api/sessions/{id}                - Delete
//! PUT    /api/sessions/{id}/associations   - Replace tags and guests
//! GET    /api/sessions/{id}/comments       - Comments
//! POST   /api/sessions/{id}/comments       - Add a comment
//! GET    /api/sessions/{id}/interests      - Interested users
//! POST   /api/sessions/{id}/interest       - Toggle own interest
//!
//! # Comments
//! PATCH  /api/comments/{id}                - Edit (author)
//! DELETE /api/comments/{id}                - Delete (author)
//!
//! # Tags
//! GET    /api/tags                         - List
//! POST   /api/tags                         - Create
//! ```

pub mod auth;
pub mod comments;
pub mod health;
pub mod requests;
pub mod sessions;
pub mod tags;
pub mod users;

use axum::Router;

use crate::db::Store;
use crate::state::AppState;

/// Build the complete router.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(requests::router())
        .merge(sessions::router())
        .merge(comments::router())
        .merge(tags::router())
}
