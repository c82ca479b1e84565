//! User endpoints.

use axum::{Json, Router, extract::State, response::Response, routing::get};
use pollroom_common::AppResult;
use pollroom_core::UserProfile;
use tracing::info;

use crate::{extractors::AuthUser, middleware::AppState, response::no_content};

/// Profile of the caller.
async fn me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.user_service.get_profile(&user.id).await?))
}

/// Delete the caller's account.
async fn delete_me(AuthUser(user): AuthUser, State(state): State<AppState>) -> AppResult<Response> {
    state.user_service.delete_account(&user.id).await?;
    info!(user_id = %user.id, "Account deleted");
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me).delete(delete_me))
}
