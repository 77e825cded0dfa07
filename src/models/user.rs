use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Fixed set of capabilities checked by route guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ViewFiles,
    UploadFiles,
    DeleteFiles,
    ShareFiles,
    ModifyFiles,
    ModerateFiles,

    ViewUsers,
    CreateUsers,
    DeleteUsers,
    ModifyUsers,

    ViewRoles,
    ModifyRoles,

    ViewMetrics,
    ModifySettings,

    ViewFileHistory,
    RestoreFileVersions,
}

impl Permission {
    pub const ALL: &'static [Self] = &[
        Self::ViewFiles,
        Self::UploadFiles,
        Self::DeleteFiles,
        Self::ShareFiles,
        Self::ModifyFiles,
        Self::ModerateFiles,
        Self::ViewUsers,
        Self::CreateUsers,
        Self::DeleteUsers,
        Self::ModifyUsers,
        Self::ViewRoles,
        Self::ModifyRoles,
        Self::ViewMetrics,
        Self::ModifySettings,
        Self::ViewFileHistory,
        Self::RestoreFileVersions,
    ];
}

const USER_PERMISSIONS: &[Permission] = &[
    Permission::ViewFiles,
    Permission::UploadFiles,
    Permission::ViewFileHistory,
];

/// Seeded reference roles. Roles are immutable; only their assignment to
/// users changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }

    #[must_use]
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Admin => Permission::ALL,
            Self::User => USER_PERMISSIONS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "USER" => Ok(Self::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Union of the permissions granted by `roles`.
#[must_use]
pub fn permissions_for_roles<'a>(roles: impl IntoIterator<Item = &'a Role>) -> BTreeSet<Permission> {
    roles
        .into_iter()
        .flat_map(|role| role.permissions().iter().copied())
        .collect()
}

/// User data returned from the store (without the password hash).
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: BTreeSet<Role>,
    pub active: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Verification,
    PasswordReset,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "VERIFICATION",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }

    #[must_use]
    pub const fn ttl(self) -> chrono::Duration {
        match self {
            Self::Verification => chrono::Duration::hours(24),
            Self::PasswordReset => chrono::Duration::hours(1),
        }
    }
}
