//! PostgreSQL-backed [`CredentialStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::debug;

use super::{CredentialStore, StoreError};
use crate::models::auth::{PasswordResetRecord, RefreshTokenRecord, User, UserChanges};

type UserRow = (
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type TokenRow = (
    String,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const USER_COLUMNS: &str =
    "id::text, name, email, password_hash, role_id::text, created_at, updated_at";

fn user_from_row(row: UserRow) -> User {
    let (id, name, email, password_hash, role_id, created_at, updated_at) = row;
    User {
        id,
        name,
        email,
        password_hash,
        role_id,
        created_at,
        updated_at,
    }
}

fn refresh_from_row(row: TokenRow) -> RefreshTokenRecord {
    let (id, user_id, token_hash, revoked, expires_at, created_at, updated_at) = row;
    RefreshTokenRecord {
        id,
        user_id,
        token_hash,
        revoked,
        expires_at,
        created_at,
        updated_at,
    }
}

fn reset_from_row(row: TokenRow) -> PasswordResetRecord {
    let (id, user_id, token_hash, used, expires_at, created_at, updated_at) = row;
    PasswordResetRecord {
        id,
        user_id,
        token_hash,
        used,
        expires_at,
        created_at,
        updated_at,
    }
}

fn is_valid_user_id(user_id: &str) -> bool {
    uuid::Uuid::parse_str(user_id).is_ok()
}

fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already registered"))
        }
        e => StoreError::Db(e),
    }
}

async fn set_password<'e>(
    executor: impl PgExecutor<'e>,
    user_id: &str,
    password_hash: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2::uuid",
    )
    .bind(password_hash)
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn revoke_all<'e>(executor: impl PgExecutor<'e>, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = now(), updated_at = now() \
         WHERE user_id = $1::uuid AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn mark_used<'e>(executor: impl PgExecutor<'e>, reset_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE password_resets SET used_at = now(), updated_at = now() \
         WHERE id = $1::uuid AND used_at IS NULL",
    )
    .bind(reset_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Credential store over a shared `PgPool`.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role_id, created_at, updated_at) \
             VALUES ($1::uuid, $2, $3, $4, $5::uuid, $6, $7)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        result.map(|_| ()).map_err(|e| conflict_or_db(e, "email"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        // Ids that are not UUIDs cannot match; avoid a cast error from Postgres.
        if !is_valid_user_id(user_id) {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1::uuid"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn update_user_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        set_password(&self.pool, user_id, password_hash).await?;
        Ok(())
    }

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at, updated_at) \
             VALUES ($1::uuid, $2::uuid, $3, $4, $5, $6)",
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id::text, user_id::text, token_hash, revoked_at IS NOT NULL, \
                    expires_at, created_at, updated_at \
             FROM refresh_tokens \
             WHERE token_hash = $1 \
               AND revoked_at IS NULL \
               AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(refresh_from_row))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2, updated_at = $2 \
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(revoke_all(&self.pool, user_id).await?)
    }

    async fn store_password_reset(&self, reset: &PasswordResetRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at, created_at, updated_at) \
             VALUES ($1::uuid, $2::uuid, $3, $4, $5, $6)",
        )
        .bind(&reset.id)
        .bind(&reset.user_id)
        .bind(&reset.token_hash)
        .bind(reset.expires_at)
        .bind(reset.created_at)
        .bind(reset.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id::text, user_id::text, token_hash, used_at IS NOT NULL, \
                    expires_at, created_at, updated_at \
             FROM password_resets \
             WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(reset_from_row))
    }

    async fn mark_password_reset_used(&self, reset_id: &str) -> Result<bool, StoreError> {
        Ok(mark_used(&self.pool, reset_id).await?)
    }

    async fn complete_password_reset(
        &self,
        reset_id: &str,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        if !mark_used(&mut *tx, reset_id).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        if set_password(&mut *tx, user_id, password_hash).await? != 1 {
            tx.rollback().await?;
            return Err(StoreError::Backend(format!(
                "password reset {reset_id} owner {user_id} missing"
            )));
        }
        let revoked = revoke_all(&mut *tx, user_id).await?;

        tx.commit().await?;
        debug!(reset_id, revoked, "password reset committed");
        Ok(true)
    }

    async fn list_users(&self, limit: u32, offset: u32) -> Result<(Vec<User>, u64), StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok((
            rows.into_iter().map(user_from_row).collect(),
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        if !is_valid_user_id(user_id) {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                role_id = COALESCE($4::uuid, role_id), \
                updated_at = now() \
             WHERE id = $1::uuid \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.role_id.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "email"))?;
        Ok(row.map(user_from_row))
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool, StoreError> {
        if !is_valid_user_id(user_id) {
            return Ok(false);
        }
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM password_resets WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1::uuid")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
