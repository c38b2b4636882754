//! Tag handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};

use knowledge_share_core::Tag;

use crate::db::Store;
use crate::error::AppError;
use crate::middleware::RequireIdentity;
use crate::services::NewTag;
use crate::state::AppState;

pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/api/tags", get(list::<S>).post(create::<S>))
}

async fn list<S: Store>(
    RequireIdentity(_identity): RequireIdentity,
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Tag>>, AppError> {
    state.tags().list().await.map(Json)
}

async fn create<S: Store>(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<AppState<S>>,
    Json(body): Json<NewTag>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let tag = state.tags().create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}
