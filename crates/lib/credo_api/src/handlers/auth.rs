//! Authentication request handlers.
//!
//! Handlers validate the wire shape, call the lifecycle controller and map
//! its errors through [`AppError`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tracing::debug;

use credo_core::AuthError;
use credo_core::models::auth::{RegisterInput, ResetPasswordInput};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ForgotPasswordRequest, LoginRequest, MessageResponse, ProfileResponse, RefreshRequest,
    RegisterRequest, ResetPasswordRequest, TokenResponse,
};

/// Minimum accepted password length on register and reset.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Identical for registered and unregistered emails.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for this email, a password reset link has been sent";

pub(crate) fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn require_password(field: &str, value: &str) -> AppResult<()> {
    require(field, value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// `POST /auth/register`: create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    require("name", &body.name)?;
    require("email", &body.email)?;
    require_password("password", &body.password)?;
    require("passwordConfirmation", &body.password_confirmation)?;

    state
        .auth
        .register(RegisterInput {
            name: body.name,
            email: body.email,
            password: body.password,
            password_confirmation: body.password_confirmation,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Registration successful")),
    ))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    require("email", &body.email)?;
    require("password", &body.password)?;

    let tokens = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(tokens.into()))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    require("refreshToken", &body.refresh_token)?;

    let tokens = state.auth.refresh_token(&body.refresh_token).await?;
    Ok(Json(tokens.into()))
}

/// `POST /auth/logout`: revoke a refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<MessageResponse>> {
    require("refreshToken", &body.refresh_token)?;

    state.auth.logout(&body.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// `POST /auth/forgot-password`: start password recovery.
///
/// Unknown emails get the same status and body as registered ones.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    require("email", &body.email)?;

    match state.auth.forgot_password(&body.email).await {
        Ok(()) => {}
        Err(AuthError::UserNotFound) => debug!("forgot-password for unknown email masked"),
        Err(e) => return Err(e.into()),
    }
    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// `POST /auth/reset-password`: consume a reset token and set a new password.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    require("token", &body.token)?;
    require_password("newPassword", &body.new_password)?;

    state
        .auth
        .reset_password(ResetPasswordInput {
            token: body.token,
            new_password: body.new_password,
        })
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// `GET /auth/me`: profile of the bearer.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<ProfileResponse>> {
    let user = state
        .auth
        .find_user(&claims.sub)
        .await
        .map_err(AppError::from_user_lookup)?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_rejected() {
        assert!(matches!(require("email", "  "), Err(AppError::Validation(_))));
        assert!(require("email", "ann@x.com").is_ok());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(matches!(
            require_password("password", "short"),
            Err(AppError::Validation(_))
        ));
        assert!(require_password("password", "pw123456").is_ok());
    }
}
