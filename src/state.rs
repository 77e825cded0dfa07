use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, FileService, LogMailer, LoginThrottle, Mailer, PermissionResolver, RateLimiter,
    SeaOrmAuthService, SeaOrmFileService, TokenService,
};

/// Long-lived collaborators shared by the HTTP layer and the scheduler.
///
/// Configuration is fixed at startup; nothing here re-reads it.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub tokens: Arc<TokenService>,

    pub throttle: Arc<LoginThrottle>,

    pub rate_limiter: Arc<RateLimiter>,

    pub mailer: Arc<dyn Mailer>,

    pub auth_service: Arc<dyn AuthService>,

    pub file_service: Arc<dyn FileService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(config.server.app_base_url.clone()));
        Self::with_mailer(config, mailer).await
    }

    /// Builds the state around a caller-supplied mail collaborator.
    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let tokens = Arc::new(TokenService::new(&config.token));
        let throttle = Arc::new(LoginThrottle::new(&config.security.auth_throttle));
        let rate_limiter = Arc::new(RateLimiter::new(&config.security.rate_limit));
        let permissions = PermissionResolver::new(store.clone());

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            tokens.clone(),
            throttle.clone(),
            permissions.clone(),
            mailer.clone(),
            config.security.clone(),
        )) as Arc<dyn AuthService>;

        let file_service = Arc::new(SeaOrmFileService::new(store.clone(), permissions))
            as Arc<dyn FileService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            throttle,
            rate_limiter,
            mailer,
            auth_service,
            file_service,
        })
    }
}
