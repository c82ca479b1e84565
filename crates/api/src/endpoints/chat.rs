//! Chat endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Response,
    routing::get,
};
use pollroom_common::AppResult;
use pollroom_core::{MentionView, MessageView, PostMessageInput};

use crate::{
    extractors::{ApiJson, AuthUser},
    middleware::AppState,
    response::created,
};

/// Public channel history.
async fn public_history(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MessageView>>> {
    Ok(Json(state.chat_service.recent(None).await?))
}

/// Room history.
async fn room_history(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<Vec<MessageView>>> {
    Ok(Json(state.chat_service.recent(Some(&room_id)).await?))
}

/// Post a message to a room or the public channel.
async fn post_message(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PostMessageInput>,
) -> AppResult<Response> {
    let message = state.chat_service.post(&user, req).await?;
    Ok(created(message))
}

/// The caller's recent mentions.
async fn mentions(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MentionView>>> {
    Ok(Json(state.chat_service.mentions_for(&user.id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(public_history).post(post_message))
        .route("/room/{room_id}", get(room_history))
        .route("/mentions", get(mentions))
}
