//! Administrative user management: paging, lookup, creation, profile
//! updates and deletion.
//!
//! Authorization is the caller's job; nothing here checks roles.

use std::sync::Arc;

use tracing::info;

use crate::auth::AuthError;
use crate::auth::password::PasswordHashing;
use crate::clock::Clock;
use crate::ids::new_id;
use crate::models::auth::{User, UserChanges};
use crate::models::role::Role;
use crate::store::{CredentialStore, StoreError};

/// Page size when the caller asks for none.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Account created by an administrator.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// One page of users.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

pub struct UserDirectory {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHashing>,
    clock: Arc<dyn Clock>,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHashing>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    /// List users. A zero limit means [`DEFAULT_PAGE_LIMIT`]; larger limits
    /// are capped at [`MAX_PAGE_LIMIT`].
    pub async fn list(&self, limit: u32, offset: u32) -> Result<UserPage, AuthError> {
        let limit = match limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let (users, total) = self.store.list_users(limit, offset).await?;
        Ok(UserPage {
            users,
            total,
            limit,
            offset,
        })
    }

    pub async fn get(&self, user_id: &str) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn create(&self, input: NewUser) -> Result<User, AuthError> {
        let password_hash = self.hasher.hash(&input.password)?;
        let now = self.clock.now();
        let user = User {
            id: new_id(),
            name: input.name,
            email: input.email,
            password_hash,
            role_id: input.role.id().to_string(),
            created_at: now,
            updated_at: now,
        };

        match self.store.create_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(AuthError::AlreadyExists),
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %user.id, role = %input.role, "user created by administrator");
        Ok(user)
    }

    pub async fn update(&self, user_id: &str, changes: UserChanges) -> Result<User, AuthError> {
        if changes.is_empty() {
            return self.get(user_id).await;
        }
        match self.store.update_user(user_id, &changes).await {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "user updated");
                Ok(user)
            }
            Ok(None) => Err(AuthError::UserNotFound),
            Err(StoreError::Conflict(_)) => Err(AuthError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user together with its refresh tokens and password resets.
    pub async fn delete(&self, user_id: &str) -> Result<(), AuthError> {
        if !self.store.delete_user(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::BcryptHasher;
    use crate::clock::ManualClock;
    use crate::store::MemoryCredentialStore;
    use chrono::Duration;

    fn directory() -> (UserDirectory, Arc<MemoryCredentialStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::default());
        let dir = UserDirectory::new(
            store.clone(),
            Arc::new(BcryptHasher::new(4)),
            clock.clone(),
        );
        (dir, store, clock)
    }

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            name: "Ann".into(),
            email: email.into(),
            password: "pw123456".into(),
            role,
        }
    }

    #[tokio::test]
    async fn created_users_get_hashed_passwords_and_roles() {
        let (dir, _, _) = directory();
        let user = dir.create(new_user("root@x.com", Role::Admin)).await.unwrap();

        assert_eq!(user.role_id, Role::Admin.id());
        assert_ne!(user.password_hash, "pw123456");
        assert!(BcryptHasher::new(4).verify("pw123456", &user.password_hash));

        let err = dir.create(new_user("root@x.com", Role::User)).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists));
    }

    #[tokio::test]
    async fn list_applies_default_and_maximum_limits() {
        let (dir, _, clock) = directory();
        for i in 0..12 {
            dir.create(new_user(&format!("u{i}@x.com"), Role::User))
                .await
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let page = dir.list(0, 0).await.unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(page.users.len(), 10);
        assert_eq!(page.total, 12);
        assert_eq!(page.users[0].email, "u0@x.com");

        let page = dir.list(500, 10).await.unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.users.len(), 2);
    }

    #[tokio::test]
    async fn missing_users_are_reported() {
        let (dir, _, _) = directory();
        assert!(matches!(dir.get(&new_id()).await, Err(AuthError::UserNotFound)));
        assert!(matches!(dir.delete(&new_id()).await, Err(AuthError::UserNotFound)));
        let changes = UserChanges {
            name: Some("Nobody".into()),
            ..UserChanges::default()
        };
        assert!(matches!(
            dir.update(&new_id(), changes).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let (dir, store, _) = directory();
        let user = dir.create(new_user("ann@x.com", Role::User)).await.unwrap();
        dir.create(new_user("bob@x.com", Role::User)).await.unwrap();

        let updated = dir
            .update(
                &user.id,
                UserChanges {
                    role_id: Some(Role::Admin.id().into()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role_id, Role::Admin.id());
        assert_eq!(updated.email, "ann@x.com");
        assert_eq!(updated.password_hash, user.password_hash);

        let err = dir
            .update(
                &user.id,
                UserChanges {
                    email: Some("bob@x.com".into()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists));

        dir.delete(&user.id).await.unwrap();
        assert_eq!(store.user_count(), 1);
    }
}
