//! Profile and user management handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
};
use serde::Deserialize;

use knowledge_share_core::{Profile, Role, UserId};

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::services::UserListQuery;
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/me", get(me::<S>).patch(update_me::<S>))
        .route("/api/users", get(list::<S>))
        .route("/api/users/{id}/role", patch(set_role::<S>))
        .route("/api/users/{id}", delete(remove::<S>))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMe {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRole {
    pub role: Role,
}

async fn me<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
) -> Result<Json<Profile>, AppError> {
    state.users().me(&identity).await.map(Json)
}

async fn update_me<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Json(body): Json<UpdateMe>,
) -> Result<Json<Profile>, AppError> {
    state
        .users()
        .update_display_name(&identity, &body.display_name)
        .await
        .map(Json)
}

async fn list<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<Profile>>, AppError> {
    state.users().list(&identity, query).await.map(Json)
}

async fn set_role<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<UserId>,
    Json(body): Json<SetRole>,
) -> Result<Json<Profile>, AppError> {
    state
        .users()
        .set_role(&identity, id, body.role)
        .await
        .map(Json)
}

async fn remove<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, AppError> {
    state.users().delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
