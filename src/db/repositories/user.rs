use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::db::{format_timestamp, parse_timestamp};
use crate::entities::{user_roles, users};
use crate::models::{Role, User};

/// Fields needed to create an account. The hash is computed by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub verified: bool,
}

/// Which unique column an insert would collide with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Username,
    Email,
}

impl IdentityField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Username => "Username",
            Self::Email => "Email",
        })
    }
}

fn parse_roles(rows: impl IntoIterator<Item = user_roles::Model>) -> BTreeSet<Role> {
    rows.into_iter()
        .filter_map(|row| match row.role.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(user_id = %row.user_id, "Ignoring stored role: {e}");
                None
            }
        })
        .collect()
}

fn to_user(model: users::Model, roles: BTreeSet<Role>) -> User {
    User {
        id: model.id,
        username: model.username,
        email: model.email,
        roles,
        active: model.active,
        verified: model.verified,
        created_at: parse_timestamp(&model.created_at),
        last_login: model.last_login.as_deref().map(parse_timestamp),
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts the user and its role rows in one transaction.
    pub async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = format_timestamp(now);

        let txn = self.conn.begin().await?;

        users::ActiveModel {
            id: Set(id.clone()),
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            active: Set(true),
            verified: Set(new_user.verified),
            created_at: Set(created_at),
            last_login: Set(None),
        }
        .insert(&txn)
        .await
        .context("Failed to insert user")?;

        for role in &new_user.roles {
            user_roles::ActiveModel {
                user_id: Set(id.clone()),
                role: Set(role.as_str().to_string()),
            }
            .insert(&txn)
            .await
            .context("Failed to insert user role")?;
        }

        txn.commit().await?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {id} vanished after insert"))
    }

    /// Returns the first unique column that `username` or `email` already occupies.
    pub async fn find_conflict(&self, username: &str, email: &str) -> Result<Option<IdentityField>> {
        let existing = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(username))
                    .add(users::Column::Email.eq(email)),
            )
            .all(&self.conn)
            .await
            .context("Failed to check user uniqueness")?;

        if existing.iter().any(|u| u.username == username) {
            return Ok(Some(IdentityField::Username));
        }
        if existing.iter().any(|u| u.email == email) {
            return Ok(Some(IdentityField::Email));
        }
        Ok(None)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let Some(model) = users::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?
        else {
            return Ok(None);
        };

        let roles = self.roles_for(&model.id).await?;
        Ok(Some(to_user(model, roles)))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        self.with_roles(model).await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        self.with_roles(model).await
    }

    /// Looks up a login identifier as a username first, then as an email.
    /// Returns the user together with its password hash.
    pub async fn get_credentials(&self, identifier: &str) -> Result<Option<(User, String)>> {
        let mut model = users::Entity::find()
            .filter(users::Column::Username.eq(identifier))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        if model.is_none() {
            model = users::Entity::find()
                .filter(users::Column::Email.eq(identifier))
                .one(&self.conn)
                .await
                .context("Failed to query user by email")?;
        }

        let Some(model) = model else {
            return Ok(None);
        };

        let password_hash = model.password_hash.clone();
        let roles = self.roles_for(&model.id).await?;
        Ok(Some((to_user(model, roles), password_hash)))
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let models = users::Entity::find()
            .order_by_asc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        let role_rows = user_roles::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to list user roles")?;

        let mut by_user: HashMap<String, Vec<user_roles::Model>> = HashMap::new();
        for row in role_rows {
            by_user.entry(row.user_id.clone()).or_default().push(row);
        }

        Ok(models
            .into_iter()
            .map(|model| {
                let roles = parse_roles(by_user.remove(&model.id).unwrap_or_default());
                to_user(model, roles)
            })
            .collect())
    }

    pub async fn roles_for(&self, user_id: &str) -> Result<BTreeSet<Role>> {
        let rows = user_roles::Entity::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await
            .context("Failed to query user roles")?;

        Ok(parse_roles(rows))
    }

    pub async fn touch_last_login(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LastLogin, Expr::value(format_timestamp(now)))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }

    pub async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update password hash")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn set_verified(&self, user_id: &str, verified: bool) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::Verified, Expr::value(verified))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update verification flag")?;
        Ok(result.rows_affected > 0)
    }

    /// Returns `true` if the role was newly assigned.
    pub async fn assign_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let inserted = user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(user_id.to_string()),
            role: Set(role.as_str().to_string()),
        })
        .on_conflict(
            OnConflict::columns([user_roles::Column::UserId, user_roles::Column::Role])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await
        .context("Failed to assign role")?;

        Ok(inserted > 0)
    }

    /// Returns `true` if the role was held and is now removed.
    pub async fn remove_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let result = user_roles::Entity::delete_many()
            .filter(user_roles::Column::UserId.eq(user_id))
            .filter(user_roles::Column::Role.eq(role.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to remove role")?;

        Ok(result.rows_affected > 0)
    }

    async fn with_roles(&self, model: Option<users::Model>) -> Result<Option<User>> {
        let Some(model) = model else {
            return Ok(None);
        };
        let roles = self.roles_for(&model.id).await?;
        Ok(Some(to_user(model, roles)))
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
///
/// CPU-bound; call it from `spawn_blocking`.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC hash. The parameters are read
/// from the hash itself, so older hashes keep verifying after a cost change.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
