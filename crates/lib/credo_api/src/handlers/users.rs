//! User management handlers. Mounted behind [`require_admin`].
//!
//! [`require_admin`]: crate::middleware::auth::require_admin

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use credo_core::models::auth::UserChanges;
use credo_core::models::role::Role;
use credo_core::users::NewUser;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::{require, require_password};
use crate::models::{
    CreateUserRequest, ListUsersQuery, ProfileResponse, UpdateUserRequest, UserListResponse,
};

fn parse_role(name: &str) -> AppResult<Role> {
    Role::from_name(name).ok_or_else(|| AppError::Validation(format!("unknown role: {name}")))
}

/// `GET /users`: one page of users in creation order.
pub async fn list_users_handler(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<Json<UserListResponse>> {
    let page = state.users.list(query.limit, query.offset).await?;
    Ok(Json(page.into()))
}

/// `GET /users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ProfileResponse>> {
    let user = state
        .users
        .get(&id)
        .await
        .map_err(AppError::from_user_lookup)?;
    Ok(Json(user.into()))
}

/// `POST /users`: create an account with an explicit role.
pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ProfileResponse>)> {
    require("name", &body.name)?;
    require("email", &body.email)?;
    require_password("password", &body.password)?;
    let role = match body.role.as_deref() {
        Some(name) => parse_role(name)?,
        None => Role::default(),
    };

    let user = state
        .users
        .create(NewUser {
            name: body.name,
            email: body.email,
            password: body.password,
            role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `PATCH /users/{id}`: change name, email or role.
pub async fn update_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<ProfileResponse>> {
    if let Some(name) = &body.name {
        require("name", name)?;
    }
    if let Some(email) = &body.email {
        require("email", email)?;
    }
    let role_id = match body.role.as_deref() {
        Some(name) => Some(parse_role(name)?.id().to_string()),
        None => None,
    };

    let user = state
        .users
        .update(
            &id,
            UserChanges {
                name: body.name,
                email: body.email,
                role_id,
            },
        )
        .await
        .map_err(AppError::from_user_lookup)?;
    Ok(Json(user.into()))
}

/// `DELETE /users/{id}`: remove the user and every credential it holds.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .users
        .delete(&id)
        .await
        .map_err(AppError::from_user_lookup)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_parsed_strictly() {
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert_eq!(parse_role("super_admin").unwrap(), Role::SuperAdmin);
        assert!(matches!(parse_role("Admin"), Err(AppError::Validation(_))));
        assert!(matches!(parse_role("root"), Err(AppError::Validation(_))));
    }
}
