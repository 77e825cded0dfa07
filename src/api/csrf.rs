//! Double-submit CSRF guard.
//!
//! A random token is set as a readable `XSRF-TOKEN` cookie; state-changing
//! requests must echo it in the `X-XSRF-TOKEN` header.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::{Cookie, SameSite};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::{ApiError, ApiResponse, AppState};
use crate::constants::csrf::{COOKIE_NAME, HEADER_NAME};
use crate::db::repositories::token::generate_token;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub token: String,
    pub header_name: &'static str,
}

pub async fn csrf_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let config = &state.config().security.csrf;
    let path = request.uri().path();

    if !config.enabled
        || request.method() == Method::OPTIONS
        || path.starts_with("/static/")
        || is_excluded(path, &config.excluded_paths)
    {
        return next.run(request).await;
    }

    let cookie_token = cookie_token(request.headers());

    if is_state_changing(request.method()) {
        let header_token = request
            .headers()
            .get(HEADER_NAME)
            .and_then(|v| v.to_str().ok());

        let valid = matches!(
            (cookie_token.as_deref(), header_token),
            (Some(cookie), Some(header)) if constant_time_eq(cookie.as_bytes(), header.as_bytes())
        );

        if !valid {
            warn!(
                method = %request.method(),
                path = %path,
                has_cookie = cookie_token.is_some(),
                has_header = header_token.is_some(),
                "CSRF validation failed"
            );
            let mut response = ApiError::CsrfValidationFailed.into_response();
            if cookie_token.is_none() {
                set_cookie(&mut response, &generate_token(), state.config().server.secure_cookies);
            }
            return response;
        }
    }

    let mut response = next.run(request).await;

    if cookie_token.is_none() {
        set_cookie(&mut response, &generate_token(), state.config().server.secure_cookies);
    }

    response
}

/// GET /auth/csrf
///
/// Returns the caller's token, minting one if the cookie is absent.
pub async fn issue_token(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let existing = cookie_token(&headers);
    let token = existing.clone().unwrap_or_else(generate_token);

    let mut response = Json(ApiResponse::success(CsrfTokenResponse {
        token: token.clone(),
        header_name: HEADER_NAME,
    }))
    .into_response();

    if existing.is_none() {
        set_cookie(&mut response, &token, state.config().server.secure_cookies);
    }

    response
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// An entry matches itself and anything below `entry/`.
fn is_excluded(path: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|entry| {
        let entry = entry.trim_end_matches('/');
        !entry.is_empty()
            && (path == entry
                || path
                    .strip_prefix(entry)
                    .is_some_and(|rest| rest.starts_with('/')))
    })
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == COOKIE_NAME && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

fn set_cookie(response: &mut Response, token: &str, secure: bool) {
    let cookie = Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build();

    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Failed to encode CSRF cookie: {}", e),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
