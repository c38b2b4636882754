//! Comment edit and delete handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::patch,
};
use serde::Deserialize;

use knowledge_share_core::CommentId;

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::models::CommentView;
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new().route(
        "/api/comments/{id}",
        patch(edit::<S>).delete(remove::<S>),
    )
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

async fn edit<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<CommentId>,
    Json(body): Json<CommentBody>,
) -> Result<Json<CommentView>, AppError> {
    state
        .engagement()
        .edit_comment(&identity, id, &body.content)
        .await
        .map(Json)
}

async fn remove<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<CommentId>,
) -> Result<StatusCode, AppError> {
    state.engagement().delete_comment(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
