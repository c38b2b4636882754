//! Sign-in and sign-out.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use tower_sessions::Session;
use tracing::instrument;

use knowledge_share_core::Profile;

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::SIGNATURE_HEADER;
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/auth/session", post(sign_in::<S>))
        .route("/auth/logout", post(sign_out))
}

/// Exchange a signed identity assertion for a cookie session.
#[instrument(skip_all)]
async fn sign_in<S: Store>(
    State(state): State<AppState<S>>,
    session: Session,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Profile>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let profile = state.identity().sign_in(signature, &body).await?;
    set_current_user(&session, &CurrentUser { id: profile.id }).await?;

    Ok(Json(profile))
}

/// End the cookie session.
async fn sign_out(session: Session) -> Result<StatusCode, AppError> {
    clear_current_user(&session).await?;
    crate::error::clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
