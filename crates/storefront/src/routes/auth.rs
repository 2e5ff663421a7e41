//! Registration, login and logout handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use ec_space_core::AccountRole;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::ApiJson;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, Profile};
use crate::services::AuthService;
use crate::state::AppState;

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Create a customer account with the signup credit grant.
#[instrument(skip(state, body), fields(username = %body.username))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let account = AuthService::new(state.pool())
        .register(
            &body.username,
            &body.email,
            &body.password,
            AccountRole::Customer,
            state.config().signup_credits,
        )
        .await?;

    tracing::info!(account_id = %account.id, "Account registered");
    Ok((StatusCode::CREATED, Json(Profile::from(account))))
}

/// Verify credentials and store the account in the session.
#[instrument(skip(state, session, body), fields(username = %body.username))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Profile>> {
    let account = AuthService::new(state.pool())
        .login(&body.username, &body.password)
        .await?;

    let current = CurrentUser {
        id: account.id,
        username: account.username.to_string(),
        role: account.role,
    };
    set_current_user(&session, &current)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    set_sentry_user(&account.id, Some(account.username.as_str()));

    tracing::info!(account_id = %account.id, "Logged in");
    Ok(Json(Profile::from(account)))
}

/// Flush the session.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
