//! HTTP API layer for pollroom.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: auth, users, chat, rooms and polls under `/api`
//! - **Extractors**: authentication and JSON bodies
//! - **Middleware**: credential verification
//! - **Streaming**: WebSocket fan-out hub
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

use axum::{Router, middleware::from_fn_with_state, routing::get};

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
pub use streaming::{StreamingHub, streaming_handler};

/// The full application: REST routes under `/api` plus `/streaming`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", router())
        .route("/streaming", get(streaming_handler))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
