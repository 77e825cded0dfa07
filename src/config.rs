use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub token: TokenConfig,

    pub security: SecurityConfig,

    pub scheduler: SchedulerConfig,

    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/filedock.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the CSRF cookie.
    pub secure_cookies: bool,

    /// Requests running longer than this are cancelled with 408.
    pub request_timeout_seconds: u64,

    /// Trusted proxy IP addresses allowed to provide forwarded client IP headers.
    ///
    /// When empty, forwarded headers are ignored for rate-limiting identity and
    /// the socket peer address is used.
    pub trusted_proxy_ips: Vec<String>,

    /// Base URL used when building verification and reset links.
    pub app_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:8080".to_string(),
                "http://localhost:3000".to_string(),
            ],
            secure_cookies: false,
            request_timeout_seconds: 30,
            trusted_proxy_ips: Vec::new(),
            app_base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC signing secret. Required; there is no built-in default.
    #[serde(skip_serializing)]
    pub secret: String,

    pub issuer: String,

    pub audience: String,

    pub ttl_hours: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "filedock".to_string(),
            audience: "filedock-users".to_string(),
            ttl_hours: 24 * 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Login throttling and lockout policy.
    pub auth_throttle: AuthThrottleConfig,

    pub password_policy: PasswordPolicyConfig,

    pub rate_limit: RateLimitConfig,

    pub csrf: CsrfConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            auth_throttle: AuthThrottleConfig::default(),
            password_policy: PasswordPolicyConfig::default(),
            rate_limit: RateLimitConfig::default(),
            csrf: CsrfConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    /// Consecutive failures before the identifier is locked.
    pub max_attempts: u32,

    /// How long a lock lasts after the last failure. Also the window after
    /// which an idle record is forgotten.
    pub lockout_minutes: u64,

    /// How often the background sweep evicts stale records.
    pub sweep_interval_minutes: u64,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 30,
            sweep_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicyConfig {
    pub min_length: usize,

    pub require_special: bool,

    pub require_number: bool,

    pub require_uppercase: bool,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_special: true,
            require_number: true,
            require_uppercase: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    pub requests_per_minute: u32,

    pub ban_minutes: u64,

    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 100,
            ban_minutes: 5,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,

    /// Path prefixes that skip double-submit validation. An entry matches
    /// itself and anything below `entry/`.
    pub excluded_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_paths: vec![
                "/api/auth/login".to_string(),
                "/api/auth/register".to_string(),
                "/api/auth/csrf".to_string(),
                "/api/files/upload".to_string(),
                "/api/files/download".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Cron expression for purging used/expired verification and reset tokens.
    pub token_purge_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_purge_cron: "0 0 * * * *".to_string(),
        }
    }
}

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,

    pub email: String,

    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("filedock").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".filedock").join("config.toml"));
        }

        paths
    }

    /// Overlays recognized environment variables on top of the file config.
    ///
    /// The lookup is injected so tests can supply a fixed environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JWT_SECRET") {
            self.token.secret = v;
        }
        if let Some(v) = lookup("JWT_ISSUER") {
            self.token.issuer = v;
        }
        if let Some(v) = lookup("JWT_AUDIENCE") {
            self.token.audience = v;
        }
        if let Some(v) = lookup("JWT_TTL_HOURS") {
            self.token.ttl_hours = parse_env("JWT_TTL_HOURS", &v)?;
        }
        if let Some(v) = lookup("MAX_LOGIN_ATTEMPTS") {
            self.security.auth_throttle.max_attempts = parse_env("MAX_LOGIN_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("LOCKOUT_DURATION_MINUTES") {
            self.security.auth_throttle.lockout_minutes =
                parse_env("LOCKOUT_DURATION_MINUTES", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_REQUESTS_PER_MINUTE") {
            self.security.rate_limit.requests_per_minute =
                parse_env("RATE_LIMIT_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_BAN_MINUTES") {
            self.security.rate_limit.ban_minutes = parse_env("RATE_LIMIT_BAN_MINUTES", &v)?;
        }
        if let Some(v) = lookup("MIN_PASSWORD_LENGTH") {
            self.security.password_policy.min_length = parse_env("MIN_PASSWORD_LENGTH", &v)?;
        }
        if let Some(v) = lookup("REQUIRE_SPECIAL_CHARS") {
            self.security.password_policy.require_special =
                parse_env("REQUIRE_SPECIAL_CHARS", &v)?;
        }
        if let Some(v) = lookup("REQUIRE_NUMBERS") {
            self.security.password_policy.require_number = parse_env("REQUIRE_NUMBERS", &v)?;
        }
        if let Some(v) = lookup("REQUIRE_UPPERCASE") {
            self.security.password_policy.require_uppercase =
                parse_env("REQUIRE_UPPERCASE", &v)?;
        }
        if let Some(v) = lookup("CSRF_EXCLUDED_PATHS") {
            self.security.csrf.excluded_paths = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.general.database_path = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = lookup("APP_BASE_URL") {
            self.server.app_base_url = v;
        }
        if let Some(v) = lookup("ADMIN_PASSWORD") {
            self.admin.password = v;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.secret.is_empty() {
            anyhow::bail!("JWT_SECRET is required (set token.secret or the JWT_SECRET variable)");
        }

        if self.token.secret.len() < 32 {
            anyhow::bail!("Token secret must be at least 32 bytes long");
        }

        if self.token.ttl_hours == 0 || self.token.ttl_hours > MAX_TOKEN_TTL_HOURS {
            anyhow::bail!("Token TTL must be between 1 and {MAX_TOKEN_TTL_HOURS} hours");
        }

        let throttle = &self.security.auth_throttle;
        if throttle.max_attempts == 0 || throttle.lockout_minutes == 0 {
            anyhow::bail!("Login throttle max_attempts and lockout_minutes must be > 0");
        }
        if throttle.lockout_minutes > MAX_PENALTY_MINUTES {
            anyhow::bail!("Login lockout must be at most {MAX_PENALTY_MINUTES} minutes");
        }

        let rate_limit = &self.security.rate_limit;
        if rate_limit.requests_per_minute == 0 || rate_limit.ban_minutes == 0 {
            anyhow::bail!("Rate limit requests_per_minute and ban_minutes must be > 0");
        }
        if rate_limit.ban_minutes > MAX_PENALTY_MINUTES {
            anyhow::bail!("Rate limit ban must be at most {MAX_PENALTY_MINUTES} minutes");
        }

        if self.security.password_policy.min_length < 6 {
            anyhow::bail!("Password policy min_length must be at least 6");
        }

        Ok(())
    }
}

/// One year.
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;

/// Upper bound for lockouts and bans: one week.
pub const MAX_PENALTY_MINUTES: u64 = 7 * 24 * 60;

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}"))
}
