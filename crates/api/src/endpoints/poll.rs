//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Response,
    routing::{delete, get, patch, post},
};
use pollroom_common::AppResult;
use pollroom_core::{CreatePollInput, PollView, VoteInput};

use crate::{
    extractors::{ApiJson, AuthUser},
    middleware::AppState,
    response::{MessageResponse, created},
};

async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreatePollInput>,
) -> AppResult<Response> {
    let poll = state.poll_service.create_poll(&user, req).await?;
    Ok(created(poll))
}

/// Cast or replace the caller's vote.
async fn vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VoteInput>,
) -> AppResult<MessageResponse> {
    state.poll_service.vote(&user, req).await?;
    Ok(MessageResponse::new("Vote recorded"))
}

/// Current tallies. Closes the poll first if its deadline has passed.
async fn results(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<Json<PollView>> {
    Ok(Json(state.poll_service.get_results(&poll_id).await?))
}

async fn close_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<MessageResponse> {
    state.poll_service.close_poll(&user, &poll_id).await?;
    Ok(MessageResponse::new("Poll closed"))
}

async fn delete_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<MessageResponse> {
    state.poll_service.delete_poll(&user, &poll_id).await?;
    Ok(MessageResponse::new("Poll deleted"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_poll))
        .route("/vote", post(vote))
        .route("/{poll_id}", delete(delete_poll))
        .route("/{poll_id}/results", get(results))
        .route("/{poll_id}/close", patch(close_poll))
}
