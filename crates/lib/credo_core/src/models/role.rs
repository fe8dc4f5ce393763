//! Closed set of roles.
//!
//! Role identifiers are persisted on users and embedded in access tokens.
//! [`Role::from_id`] is the only way back from an identifier; anything it
//! does not recognise must be treated as "no permissions".

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::SuperAdmin];

    /// Stable identifier stored in `users.role_id`.
    pub const fn id(self) -> &'static str {
        match self {
            Role::User => "00000000-0000-0000-0000-000000000001",
            Role::Admin => "00000000-0000-0000-0000-000000000002",
            Role::SuperAdmin => "00000000-0000-0000-0000-000000000003",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Map an identifier back to a role. Unknown identifiers yield `None`.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
