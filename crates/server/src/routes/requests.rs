//! Session request handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use knowledge_share_core::{DraftInput, RequestStatus, SessionRequestId};

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::{RequestView, SessionView};
use crate::services::SubmitRequest;
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/requests", get(list::<S>).post(submit::<S>))
        .route("/api/requests/{id}", get(show::<S>))
        .route("/api/requests/{id}/approve", post(approve::<S>))
        .route("/api/requests/{id}/reject", post(reject::<S>))
        .route("/api/requests/{id}/materialize", post(materialize::<S>))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: String,
}

async fn list<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestView>>, AppError> {
    state
        .requests()
        .list(&identity, query.status)
        .await
        .map(Json)
}

async fn submit<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<RequestView>), AppError> {
    let view = state.requests().submit(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn show<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionRequestId>,
) -> Result<Json<RequestView>, AppError> {
    state.requests().get(&identity, id).await.map(Json)
}

async fn approve<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionRequestId>,
) -> Result<Json<RequestView>, AppError> {
    state.requests().approve(&identity, id).await.map(Json)
}

async fn reject<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionRequestId>,
    Json(body): Json<RejectBody>,
) -> Result<Json<RequestView>, AppError> {
    state
        .requests()
        .reject(&identity, id, &body.reason)
        .await
        .map(Json)
}

async fn materialize<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<SessionRequestId>,
    Json(draft): Json<DraftInput>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let view = state.requests().materialize(&identity, id, draft).await?;
    Ok((StatusCode::CREATED, Json(view)))
}
