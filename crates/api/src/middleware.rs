//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use pollroom_core::{ChatService, PollService, RoomService, TokenService, UserService};
use tracing::debug;

use crate::extractors::{InvalidCredential, credential_from_headers};
use crate::streaming::StreamingHub;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub user_service: UserService,
    pub room_service: RoomService,
    pub chat_service: ChatService,
    pub poll_service: PollService,
    pub hub: StreamingHub,
}

/// Authentication middleware.
///
/// A valid credential puts the caller's [`Identity`](pollroom_core::Identity)
/// into the request extensions. An invalid one is remembered so that
/// protected routes answer 403 instead of 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = credential_from_headers(req.headers()) {
        match state.tokens.verify(&token) {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
            }
            Err(e) => {
                debug!(error = %e, "Rejected request credential");
                req.extensions_mut().insert(InvalidCredential);
            }
        }
    }

    next.run(req).await
}
