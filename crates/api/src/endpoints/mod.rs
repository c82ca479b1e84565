//! API endpoints.

mod auth;
mod chat;
mod poll;
mod rooms;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/chat", chat::router())
        .nest("/rooms", rooms::router())
        .nest("/polls", poll::router())
}
