use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{FileRecord, ModerationStatus, Role, TokenKind, User};

pub mod migrator;
pub mod repositories;

pub use repositories::user::{IdentityField, NewUser};

/// Fixed-width UTC timestamp so stored values sort lexicographically.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[must_use]
pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |e| {
            warn!("Unparseable stored timestamp {value:?}: {e}");
            DateTime::<Utc>::default()
        },
        |dt| dt.with_timezone(&Utc),
    )
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every pooled connection to `:memory:` would see its own database.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn token_repo(&self) -> repositories::token::TokenRepository {
        repositories::token::TokenRepository::new(self.conn.clone())
    }

    fn file_repo(&self) -> repositories::file::FileRepository {
        repositories::file::FileRepository::new(self.conn.clone())
    }

    // Users

    pub async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User> {
        self.user_repo().create(new_user, now).await
    }

    pub async fn find_identity_conflict(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<IdentityField>> {
        self.user_repo().find_conflict(username, email).await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_credentials(&self, identifier: &str) -> Result<Option<(User, String)>> {
        self.user_repo().get_credentials(identifier).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list_all().await
    }

    pub async fn get_user_roles(&self, user_id: &str) -> Result<BTreeSet<Role>> {
        self.user_repo().roles_for(user_id).await
    }

    pub async fn touch_last_login(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().touch_last_login(user_id, now).await
    }

    pub async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        self.user_repo()
            .update_password_hash(user_id, password_hash)
            .await
    }

    pub async fn set_user_verified(&self, user_id: &str, verified: bool) -> Result<bool> {
        self.user_repo().set_verified(user_id, verified).await
    }

    pub async fn assign_role(&self, user_id: &str, role: Role) -> Result<bool> {
        self.user_repo().assign_role(user_id, role).await
    }

    pub async fn remove_role(&self, user_id: &str, role: Role) -> Result<bool> {
        self.user_repo().remove_role(user_id, role).await
    }

    // Verification / reset tokens

    pub async fn create_auth_token(
        &self,
        user_id: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.token_repo().create(user_id, kind, now).await
    }

    pub async fn consume_auth_token(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.token_repo().consume(token, kind, now).await
    }

    pub async fn purge_auth_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        self.token_repo().purge(now).await
    }

    // Files

    pub async fn insert_file(&self, record: &FileRecord) -> Result<()> {
        self.file_repo().insert(record).await
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        self.file_repo().get(id).await
    }

    pub async fn set_file_visibility(&self, id: &str, is_public: bool) -> Result<bool> {
        self.file_repo().set_visibility(id, is_public).await
    }

    pub async fn set_file_moderation(&self, id: &str, status: ModerationStatus) -> Result<bool> {
        self.file_repo().set_moderation(id, status).await
    }

    pub async fn list_public_files(&self, limit: u64, offset: u64) -> Result<Vec<FileRecord>> {
        self.file_repo().list_public(limit, offset).await
    }

    pub async fn count_public_files(&self) -> Result<u64> {
        self.file_repo().count_public().await
    }

    pub async fn list_files_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>> {
        self.file_repo().list_by_owner(owner_id).await
    }

    pub async fn list_all_files(&self) -> Result<Vec<FileRecord>> {
        self.file_repo().list_all().await
    }

    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        self.file_repo().delete(id).await
    }
}
