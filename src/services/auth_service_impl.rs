//! `SeaORM` implementation of the `AuthService` trait.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DbErr, SqlErr};
use tokio::task;
use tracing::{error, info, warn};

use crate::config::{PasswordPolicyConfig, SecurityConfig};
use crate::db::repositories::user::{hash_password, verify_password};
use crate::db::{IdentityField, NewUser, Store};
use crate::models::{Permission, Role, TokenKind, User};
use crate::services::auth_service::{
    AuthError, AuthResult, AuthService, Registration, UserInfo, VerificationStatus,
};
use crate::services::mailer::Mailer;
use crate::services::permissions::PermissionResolver;
use crate::services::throttle::LoginThrottle;
use crate::services::token::{Principal, TokenService};
use crate::services::validation::{validate_email, validate_password, validate_username};

pub struct SeaOrmAuthService {
    store: Store,
    tokens: Arc<TokenService>,
    throttle: Arc<LoginThrottle>,
    permissions: PermissionResolver,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
    dummy_hash: OnceLock<String>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        tokens: Arc<TokenService>,
        throttle: Arc<LoginThrottle>,
        permissions: PermissionResolver,
        mailer: Arc<dyn Mailer>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            permissions,
            store,
            tokens,
            throttle,
            mailer,
            security,
            dummy_hash: OnceLock::new(),
        }
    }

    fn policy(&self) -> &PasswordPolicyConfig {
        &self.security.password_policy
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let config = self.security.clone();
        let hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;
        Ok(hash)
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = self.hash(&uuid::Uuid::new_v4().to_string()).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }

    async fn check_password(&self, password: &str, password_hash: String) -> Result<bool, AuthError> {
        let password = password.to_string();
        let is_valid = task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .context("Password verification task panicked")??;
        Ok(is_valid)
    }

    async fn require(&self, actor: &Principal, permission: Permission) -> Result<(), AuthError> {
        if self
            .permissions
            .has_permission(&actor.user_id, permission)
            .await?
        {
            Ok(())
        } else {
            warn!(user_id = %actor.user_id, ?permission, "Permission denied");
            Err(AuthError::Forbidden("Admin access required".to_string()))
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User, AuthError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, AuthError> {
        let (username, email) = (new_user.username.clone(), new_user.email.clone());

        if let Some(field) = self.store.find_identity_conflict(&username, &email).await? {
            return Err(AuthError::DuplicateIdentity(field));
        }

        match self.store.create_user(new_user, Utc::now()).await {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => {
                // Lost a race with a concurrent registration.
                let field = self
                    .store
                    .find_identity_conflict(&username, &email)
                    .await?
                    .unwrap_or(IdentityField::Username);
                Err(AuthError::DuplicateIdentity(field))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a token of `kind` and hands it to the mailer. Mail failures
    /// are logged, not returned, so callers stay non-revealing.
    async fn send_token(&self, user: &User, kind: TokenKind) -> Result<(), AuthError> {
        let token = self
            .store
            .create_auth_token(&user.id, kind, Utc::now())
            .await?;

        let sent = match kind {
            TokenKind::Verification => {
                self.mailer
                    .send_verification(&user.email, &user.username, &token)
                    .await
            }
            TokenKind::PasswordReset => {
                self.mailer
                    .send_password_reset(&user.email, &user.username, &token)
                    .await
            }
        };

        if let Err(e) = sent {
            error!(user_id = %user.id, kind = kind.as_str(), error = %e, "Mail hand-off failed");
        }
        Ok(())
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DbErr>()
        .and_then(DbErr::sql_err)
        .is_some_and(|e| matches!(e, SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResult, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.trim().is_empty() {
            return Err(AuthError::Validation(
                "Username/email and password cannot be empty".to_string(),
            ));
        }

        let remaining_attempts = match self.throttle.begin_attempt(identifier) {
            Ok(remaining) => remaining,
            Err(retry_after) => {
                info!(identifier = %identifier.to_lowercase(), "Login rejected, identifier locked");
                return Err(AuthError::AccountLocked { retry_after });
            }
        };

        let matched = match self.store.get_user_credentials(identifier).await? {
            Some((user, hash)) if user.active => {
                self.check_password(password, hash).await?.then_some(user)
            }
            _ => {
                // Same argon2 cost as a real account.
                let hash = self.dummy_hash().await?;
                self.check_password(password, hash).await?;
                None
            }
        };

        let Some(user) = matched else {
            info!(
                identifier = %identifier.to_lowercase(),
                remaining_attempts,
                "Authentication failed"
            );
            return Err(AuthError::InvalidCredentials { remaining_attempts });
        };

        self.throttle.record_success(identifier);

        let now = Utc::now();
        self.store.touch_last_login(&user.id, now).await?;
        let issued = self.tokens.issue(&user)?;

        info!(user_id = %user.id, roles = ?user.roles, "User authenticated");

        let mut info = UserInfo::from(user);
        info.last_login = Some(now);
        Ok(AuthResult {
            token: issued.token,
            expires_at: issued.expires_at,
            user: info,
        })
    }

    async fn register(&self, registration: Registration) -> Result<AuthResult, AuthError> {
        let Registration {
            username,
            email,
            password,
        } = registration;
        let username = username.trim().to_string();
        let email = email.trim().to_string();

        validate_username(&username).map_err(AuthError::Validation)?;
        validate_email(&email).map_err(AuthError::Validation)?;
        validate_password(&password, self.policy()).map_err(AuthError::Validation)?;

        let password_hash = self.hash(&password).await?;
        let user = self
            .insert_user(NewUser {
                username,
                email,
                password_hash,
                roles: BTreeSet::from([Role::User]),
                verified: false,
            })
            .await?;

        let issued = self.tokens.issue(&user)?;
        info!(user_id = %user.id, username = %user.username, "User registered");

        // Verification delivery must not hold up the response.
        let store = self.store.clone();
        let mailer = Arc::clone(&self.mailer);
        let pending = user.clone();
        tokio::spawn(async move {
            let token = match store
                .create_auth_token(&pending.id, TokenKind::Verification, Utc::now())
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    error!(user_id = %pending.id, error = %e, "Failed to create verification token");
                    return;
                }
            };
            if let Err(e) = mailer
                .send_verification(&pending.email, &pending.username, &token)
                .await
            {
                error!(user_id = %pending.id, error = %e, "Verification hand-off failed");
            }
        });

        Ok(AuthResult {
            token: issued.token,
            expires_at: issued.expires_at,
            user: UserInfo::from(user),
        })
    }

    async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Validation("Token is required".to_string()));
        }

        let user_id = self
            .store
            .consume_auth_token(token, TokenKind::Verification, Utc::now())
            .await?
            .ok_or_else(|| AuthError::Validation("Invalid or expired token".to_string()))?;

        self.store.set_user_verified(&user_id, true).await?;
        info!(user_id = %user_id, "Email verified");
        Ok(())
    }

    async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }

        match self.store.get_user_by_email(email).await? {
            Some(user) if !user.verified => self.send_token(&user, TokenKind::Verification).await,
            _ => Ok(()),
        }
    }

    async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }

        match self.store.get_user_by_email(email).await? {
            Some(user) if user.active => self.send_token(&user, TokenKind::PasswordReset).await,
            _ => Ok(()),
        }
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Validation("Token is required".to_string()));
        }
        validate_password(new_password, self.policy()).map_err(AuthError::Validation)?;

        let user_id = self
            .store
            .consume_auth_token(token, TokenKind::PasswordReset, Utc::now())
            .await?
            .ok_or_else(|| AuthError::Validation("Invalid or expired token".to_string()))?;

        let password_hash = self.hash(new_password).await?;
        self.store
            .update_password_hash(&user_id, &password_hash)
            .await?;

        if let Some(user) = self.store.get_user(&user_id).await? {
            self.throttle.record_success(&user.username);
            self.throttle.record_success(&user.email);
        }

        info!(user_id = %user_id, "Password reset");
        Ok(())
    }

    async fn verification_status(&self, user_id: &str) -> Result<VerificationStatus, AuthError> {
        let user = self.load_user(user_id).await?;
        Ok(VerificationStatus {
            verified: user.verified,
            email: user.email,
        })
    }

    async fn current_user(&self, user_id: &str) -> Result<UserInfo, AuthError> {
        Ok(self.load_user(user_id).await?.into())
    }

    async fn list_users(&self, actor: &Principal) -> Result<Vec<UserInfo>, AuthError> {
        self.require(actor, Permission::ViewUsers).await?;

        let users = self.store.list_users().await?;
        info!(user_id = %actor.user_id, count = users.len(), "Listed users");
        Ok(users.into_iter().map(UserInfo::from).collect())
    }

    async fn assign_role(
        &self,
        actor: &Principal,
        user_id: &str,
        role: Role,
    ) -> Result<UserInfo, AuthError> {
        self.require(actor, Permission::ModifyUsers).await?;
        self.load_user(user_id).await?;

        if self.store.assign_role(user_id, role).await? {
            info!(actor = %actor.user_id, target_user = %user_id, %role, "Role assigned");
        }
        if role == Role::Admin {
            self.store.set_user_verified(user_id, true).await?;
        }

        Ok(self.load_user(user_id).await?.into())
    }

    async fn remove_role(
        &self,
        actor: &Principal,
        user_id: &str,
        role: Role,
    ) -> Result<UserInfo, AuthError> {
        self.require(actor, Permission::ModifyUsers).await?;

        if role == Role::Admin && actor.user_id == user_id {
            return Err(AuthError::Validation(
                "Administrators cannot remove their own ADMIN role".to_string(),
            ));
        }

        self.load_user(user_id).await?;
        if self.store.remove_role(user_id, role).await? {
            info!(actor = %actor.user_id, target_user = %user_id, %role, "Role removed");
        }

        Ok(self.load_user(user_id).await?.into())
    }

    async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserInfo, AuthError> {
        let username = username.trim().to_string();
        let email = email.trim().to_string();

        validate_username(&username).map_err(AuthError::Validation)?;
        validate_email(&email).map_err(AuthError::Validation)?;
        if password.trim().is_empty() {
            return Err(AuthError::Validation("Password cannot be blank".to_string()));
        }

        let password_hash = self.hash(password).await?;
        let user = self
            .insert_user(NewUser {
                username,
                email,
                password_hash,
                roles: BTreeSet::from([Role::Admin]),
                verified: true,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "Administrator created");
        Ok(user.into())
    }

    async fn ensure_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        if self.store.get_user_by_username(username).await?.is_some() {
            return Ok(false);
        }

        self.create_admin(username, email, password).await?;
        Ok(true)
    }
}
