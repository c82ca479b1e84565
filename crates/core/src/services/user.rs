//! User service: registration, login and account management.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use pollroom_common::{AppError, AppResult, IdGenerator};
use pollroom_db::{
    entities::user::{self, UserRole},
    repositories::UserRepository,
};
use regex::Regex;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::services::auth::{Identity, TokenService, hash_password, verify_password};

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\w+$").unwrap()
});

/// Input for registering an account.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    /// Must match `@(\w+)` mention tokens, so word characters only.
    #[validate(length(min = 1, max = 64), regex(path = *USERNAME_RE))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Input for logging in.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Minimal user reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// Full profile of the calling user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user: UserSummary,
    pub token: String,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    tokens: TokenService,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(user_repo: UserRepository, tokens: TokenService) -> Self {
        Self {
            user_repo,
            tokens,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a new account.
    pub async fn register(&self, input: RegisterInput) -> AppResult<UserSummary> {
        input.validate()?;

        if self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let password_hash = hash_password(&input.password)?;

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username: Set(input.username),
            password_hash: Set(password_hash),
            role: Set(input.role.unwrap_or_default()),
            created_at: Set(Utc::now().into()),
        };

        let created = self.user_repo.create(model).await?;
        info!(user_id = %created.id, username = %created.username, "User registered");

        Ok(UserSummary::from(&created))
    }

    /// Verify credentials and issue a session token.
    ///
    /// Unknown usernames and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, input: LoginInput) -> AppResult<LoginResult> {
        input.validate()?;

        let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

        let user = self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(invalid());
        }

        let summary = UserSummary::from(&user);
        let token = self.tokens.issue(&Identity {
            id: summary.id.clone(),
            username: summary.username.clone(),
        })?;

        info!(user_id = %user.id, "User logged in");

        Ok(LoginResult {
            user: summary,
            token,
        })
    }

    /// Profile of a user.
    pub async fn get_profile(&self, user_id: &str) -> AppResult<UserProfile> {
        let user = self.user_repo.get_by_id(user_id).await?;

        Ok(UserProfile {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at.with_timezone(&Utc),
        })
    }

    /// Delete an account and everything it owns.
    pub async fn delete_account(&self, user_id: &str) -> AppResult<()> {
        if !self.user_repo.delete(user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        info!(user_id = %user_id, "User deleted");
        Ok(())
    }
}
