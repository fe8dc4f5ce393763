//! Authentication middleware: Bearer token extraction, JWT verification and
//! role guards.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use credo_core::auth::jwt::verify_access_token;
use credo_core::models::auth::TokenClaims;
use credo_core::models::role::Role;

use crate::AppState;
use crate::error::AppError;

/// Key used to store `TokenClaims` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

/// Roles allowed through [`require_admin`].
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the JWT,
/// and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = verify_access_token(token, state.config.jwt_secret.as_bytes())
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}

/// Role guard. Unknown role ids are denied.
pub fn authorize(claims: &TokenClaims, allowed: &[Role]) -> Result<Role, AppError> {
    match Role::from_id(&claims.role) {
        Some(role) if allowed.contains(&role) => Ok(role),
        Some(role) => {
            debug!(user_id = %claims.sub, role = %role, "role not permitted");
            Err(AppError::Forbidden("Insufficient role".into()))
        }
        None => {
            debug!(user_id = %claims.sub, role_id = %claims.role, "unknown role id");
            Err(AppError::Forbidden("Insufficient role".into()))
        }
    }
}

/// Axum middleware: requires an admin or super admin. Must run after
/// [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let AuthenticatedUser(claims) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
    authorize(claims, ADMIN_ROLES)?;
    Ok(next.run(request).await)
}
