//! Session, interest and comment-thread handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};

use knowledge_share_core::{DraftInput, SessionId, SessionPatch};

use super::comments::CommentBody;
use crate::db::Store;
use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::{CommentView, InterestState, InterestView, SessionDetail, SessionView};
use crate::services::{AssociationsInput, SessionListQuery};
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/sessions", get(list::<S>).post(create::<S>))
        .route(
            "/api/sessions/{id}",
            get(show::<S>).patch(update::<S>).delete(remove::<S>),
        )
        .route("/api/sessions/{id}/associations", put(associations::<S>))
        .route(
            "/api/sessions/{id}/comments",
            get(comments::<S>).post(add_comment::<S>),
        )
        .route("/api/sessions/{id}/interests", get(interests::<S>))
        .route("/api/sessions/{id}/interest", post(toggle_interest::<S>))
}

async fn list<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionView>>, AppError> {
    state.sessions().list(&identity, query).await.map(Json)
}

async fn create<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Json(draft): Json<DraftInput>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let view = state.sessions().create(&identity, draft).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn show<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionDetail>, AppError> {
    state.sessions().get(&identity, id).await.map(Json)
}

async fn update<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<SessionView>, AppError> {
    state.sessions().update(&identity, id, patch).await.map(Json)
}

async fn remove<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, AppError> {
    state.sessions().delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn associations<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
    Json(body): Json<AssociationsInput>,
) -> Result<Json<SessionView>, AppError> {
    state
        .sessions()
        .replace_associations(&identity, id, body)
        .await
        .map(Json)
}

async fn comments<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    state.engagement().list_comments(&identity, id).await.map(Json)
}

async fn add_comment<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let view = state
        .engagement()
        .add_comment(&identity, id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn interests<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<InterestView>>, AppError> {
    state
        .engagement()
        .list_interests(&identity, id)
        .await
        .map(Json)
}

async fn toggle_interest<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionId>,
) -> Result<Json<InterestState>, AppError> {
    state
        .engagement()
        .toggle_interest(&identity, id)
        .await
        .map(Json)
}
