//! Room endpoints.
//!
//! Rooms are addressed by their join code, except for closing, which takes
//! the room id in the same path position.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
};
use pollroom_common::AppResult;
use pollroom_core::{CreateRoomInput, RoomDetail, RoomSummary, UpdateRoomInput};

use crate::{
    extractors::{ApiJson, AuthUser},
    middleware::AppState,
    response::{created, no_content},
};

async fn create_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRoomInput>,
) -> AppResult<Response> {
    let room = state.room_service.create(&user, req).await?;
    Ok(created(room))
}

/// Rooms the caller belongs to.
async fn my_rooms(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(state.room_service.list_for_user(&user.id).await?))
}

/// Every active room.
async fn all_rooms(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(state.room_service.list_active().await?))
}

async fn show_room(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<RoomDetail>> {
    Ok(Json(state.room_service.get_by_code(&code).await?))
}

async fn join_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<RoomDetail>> {
    Ok(Json(state.room_service.join(&user, &code).await?))
}

async fn leave_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Response> {
    state.room_service.leave(&user, &code).await?;
    Ok(no_content())
}

async fn kick_member(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((code, user_id)): Path<(String, String)>,
) -> AppResult<Response> {
    state.room_service.kick(&user, &code, &user_id).await?;
    Ok(no_content())
}

async fn update_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(req): ApiJson<UpdateRoomInput>,
) -> AppResult<Json<RoomDetail>> {
    Ok(Json(state.room_service.update(&user, &code, req).await?))
}

async fn close_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Response> {
    state.room_service.close(&user, &room_id).await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_room).get(my_rooms))
        .route("/all", get(all_rooms))
        .route(
            "/{code}",
            get(show_room).put(update_room).delete(close_room),
        )
        .route("/{code}/join", post(join_room))
        .route("/{code}/leave", delete(leave_room))
        .route("/{code}/kick/{user_id}", delete(kick_member))
}
