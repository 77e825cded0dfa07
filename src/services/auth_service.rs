//! Domain service for registration, login and account administration.
//!
//! Login combines the credential store, the [`LoginThrottle`] and the
//! [`TokenService`]; privileged operations re-resolve the caller's roles
//! through the [`PermissionResolver`] instead of trusting the token snapshot.
//!
//! [`LoginThrottle`]: crate::services::LoginThrottle
//! [`TokenService`]: crate::services::TokenService
//! [`PermissionResolver`]: crate::services::PermissionResolver

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::IdentityField;
use crate::models::{Role, User};
use crate::services::token::{Principal, TokenError};
use crate::services::throttle::remaining_minutes;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", invalid_credentials_message(.remaining_attempts))]
    InvalidCredentials { remaining_attempts: u32 },

    #[error(
        "Account is temporarily locked due to too many failed login attempts. Please try again in {} minutes.",
        lock_minutes(.retry_after)
    )]
    AccountLocked { retry_after: chrono::Duration },

    #[error("{0} already exists")]
    DuplicateIdentity(IdentityField),

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn invalid_credentials_message(remaining_attempts: &u32) -> String {
    if *remaining_attempts == 0 {
        "Account locked due to too many failed attempts. Try again later.".to_string()
    } else {
        format!("Invalid username/email or password. Remaining attempts: {remaining_attempts}")
    }
}

fn lock_minutes(retry_after: &chrono::Duration) -> u64 {
    remaining_minutes(*retry_after)
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// User info DTO for responses. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub active: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            roles: user.roles.into_iter().collect(),
            active: user.active,
            verified: user.verified,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Successful login or registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatus {
    pub verified: bool,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Authenticates by username, falling back to email.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccountLocked`] while the identifier is locked and
    /// [`AuthError::InvalidCredentials`] on a mismatch, after counting the
    /// failure.
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResult, AuthError>;

    /// Creates an unverified USER account and starts the verification hand-off.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for bad input and
    /// [`AuthError::DuplicateIdentity`] if the username or email is taken.
    async fn register(&self, registration: Registration) -> Result<AuthResult, AuthError>;

    /// Consumes a verification token and marks its owner verified.
    async fn verify_email(&self, token: &str) -> Result<(), AuthError>;

    /// Issues a fresh verification token. Succeeds whether or not the
    /// address belongs to an account.
    async fn resend_verification(&self, email: &str) -> Result<(), AuthError>;

    /// Issues a password reset token. Succeeds whether or not the address
    /// belongs to an account.
    async fn forgot_password(&self, email: &str) -> Result<(), AuthError>;

    /// Consumes a reset token, stores the new password and clears any lockout.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    async fn verification_status(&self, user_id: &str) -> Result<VerificationStatus, AuthError>;

    async fn current_user(&self, user_id: &str) -> Result<UserInfo, AuthError>;

    /// Requires `VIEW_USERS`.
    async fn list_users(&self, actor: &Principal) -> Result<Vec<UserInfo>, AuthError>;

    /// Requires `MODIFY_USERS`. Granting ADMIN also verifies the account.
    async fn assign_role(
        &self,
        actor: &Principal,
        user_id: &str,
        role: Role,
    ) -> Result<UserInfo, AuthError>;

    /// Requires `MODIFY_USERS`.
    async fn remove_role(
        &self,
        actor: &Principal,
        user_id: &str,
        role: Role,
    ) -> Result<UserInfo, AuthError>;

    /// Creates a verified administrator, skipping the password policy.
    async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserInfo, AuthError>;

    /// Creates the configured administrator unless the username exists.
    /// Returns `true` if an account was created.
    async fn ensure_admin(&self, username: &str, email: &str, password: &str)
    -> Result<bool, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_message_reports_remaining_attempts() {
        let err = AuthError::InvalidCredentials {
            remaining_attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Invalid username/email or password. Remaining attempts: 3"
        );

        let locked = AuthError::InvalidCredentials {
            remaining_attempts: 0,
        };
        assert!(locked.to_string().starts_with("Account locked"));
    }

    #[test]
    fn test_duplicate_message_names_field() {
        assert_eq!(
            AuthError::DuplicateIdentity(IdentityField::Email).to_string(),
            "Email already exists"
        );
    }

    #[test]
    fn test_lock_message_rounds_up() {
        let err = AuthError::AccountLocked {
            retry_after: chrono::Duration::seconds(90),
        };
        assert!(err.to_string().contains("try again in 2 minutes"));
    }
}
