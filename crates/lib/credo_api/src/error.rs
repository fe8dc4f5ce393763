//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use credo_core::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Password reset token has expired")]
    ResetExpired,

    #[error("Password reset token has already been used")]
    ResetAlreadyUsed,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AppError::ResetExpired => (StatusCode::BAD_REQUEST, "reset_expired"),
            AppError::ResetAlreadyUsed => (StatusCode::BAD_REQUEST, "reset_already_used"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Internal(detail) => {
                error!(detail = %detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl AppError {
    /// Map a lookup of an addressed user, where a missing user is the
    /// client's 404 rather than a data fault.
    pub fn from_user_lookup(e: AuthError) -> Self {
        match e {
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            other => other.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::AlreadyExists => {
                AppError::AlreadyExists("An account with this email already exists".into())
            }
            AuthError::PasswordMismatch => {
                AppError::Validation("Password confirmation does not match".into())
            }
            AuthError::InvalidToken => AppError::InvalidToken,
            AuthError::ResetExpired => AppError::ResetExpired,
            AuthError::ResetAlreadyUsed => AppError::ResetAlreadyUsed,
            // Handlers addressing a user map this through `from_user_lookup`;
            // anywhere else it is a dangling reference.
            AuthError::UserNotFound => AppError::Internal("user not found".into()),
            AuthError::Store(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credo_core::store::StoreError;

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        let cases = [
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::AlreadyExists, StatusCode::CONFLICT),
            (AuthError::PasswordMismatch, StatusCode::BAD_REQUEST),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::ResetExpired, StatusCode::BAD_REQUEST),
            (AuthError::ResetAlreadyUsed, StatusCode::BAD_REQUEST),
            (AuthError::UserNotFound, StatusCode::INTERNAL_SERVER_ERROR),
            (
                AuthError::Store(StoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_and_code().0, status);
        }
    }

    #[test]
    fn addressed_missing_user_is_not_found() {
        let err = AppError::from_user_lookup(AuthError::UserNotFound);
        assert_eq!(err.status_and_code(), (StatusCode::NOT_FOUND, "not_found"));
        let err = AppError::from_user_lookup(AuthError::AlreadyExists);
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn internal_detail_is_not_exposed() {
        let resp = AppError::Internal("connection refused on 10.0.0.3".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.3"));
        assert!(text.contains("internal_error"));
    }
}
