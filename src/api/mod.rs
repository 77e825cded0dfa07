use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

pub mod auth;
mod csrf;
mod error;
mod extract;
mod files;
mod health;
mod observability;
mod rate_limit;
mod types;
mod users;

pub use error::ApiError;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn tokens(&self) -> &crate::services::TokenService {
        &self.shared.tokens
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &crate::services::RateLimiter {
        &self.shared.rate_limiter
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn crate::services::AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn file_service(&self) -> &Arc<dyn crate::services::FileService> {
        &self.shared.file_service
    }
}

#[must_use]
pub fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared))
}

/// Builds the full application router.
///
/// Request path, outermost first: tracing, CORS, timeout, request logging,
/// security headers, rate limiting, CSRF, then the bearer check on
/// protected routes.
pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config();
    let cors_origins = config.server.cors_allowed_origins.clone();
    let request_timeout = Duration::from_secs(config.server.request_timeout_seconds.max(1));

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/health", get(health::health))
        .route("/auth/csrf", get(csrf::issue_token))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-email", post(auth::verify_email))
        .route(
            "/auth/resend-verification",
            post(auth::resend_verification),
        )
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/files/public", get(files::list_public))
        .with_state(state.clone());

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-xsrf-token"),
            ])
    };

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            csrf::csrf_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state,
            rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors_layer.allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/verification-status", get(auth::verification_status))
        .route("/auth/users", get(auth::list_users))
        .route(
            "/users/{id}/roles/{role}",
            put(users::assign_role).delete(users::remove_role),
        )
        .route("/files", get(files::list_files))
        .route("/files/upload", post(files::upload))
        .route("/files/{id}/info", get(files::get_info))
        .route(
            "/files/{id}/visibility",
            post(files::set_visibility).patch(files::set_visibility),
        )
        .route(
            "/files/{id}/moderate",
            post(files::moderate).patch(files::moderate),
        )
        .route("/files/{id}", delete(files::delete_file))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
