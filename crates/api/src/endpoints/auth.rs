//! Authentication endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use pollroom_common::{AppError, AppResult};
use pollroom_core::{LoginInput, RegisterInput, UserSummary};
use serde::Serialize;

use crate::{
    extractors::{ApiJson, TOKEN_HEADER},
    middleware::AppState,
};

/// Register response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserSummary,
}

/// Create a new user account.
async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterInput>,
) -> AppResult<Response> {
    let user = state.user_service.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    )
        .into_response())
}

/// Sign in; the credential is returned in the body and the `token` header.
async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginInput>,
) -> AppResult<Response> {
    let result = state.user_service.login(req).await?;

    let header = HeaderValue::from_str(&result.token)
        .map_err(|e| AppError::Internal(format!("Unencodable token: {e}")))?;

    let mut response = Json(result).into_response();
    response.headers_mut().insert(TOKEN_HEADER, header);
    Ok(response)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}
