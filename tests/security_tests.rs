mod common;

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use common::{CSRF_TOKEN, RequestSpec, spawn_app, spawn_app_with, test_config};
use filedock::config::TokenConfig;
use filedock::services::{Scheduler, TokenService};
use serde_json::json;

#[tokio::test]
async fn test_visibility_without_csrf_header_is_rejected() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;
    app.set_visibility(&bob, &f1, true).await;
    app.moderate(&admin, &f1, "APPROVED").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/files/{f1}/visibility"))
        .header("authorization", format!("Bearer {bob}"))
        .header("cookie", format!("XSRF-TOKEN={CSRF_TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "isPublic": true }).to_string()))
        .unwrap();
    let response = app.send_raw(request).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "CSRF_VALIDATION_FAILED");
    assert_eq!(app.file_state(&f1).await, (true, "APPROVED".to_string()));
}

#[tokio::test]
async fn test_mismatched_csrf_token_is_rejected() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let f1 = app.upload(&bob, "f1.png").await;

    let request = Request::builder()
        .method(Method::PATCH)
        .uri(format!("/api/files/{f1}/visibility"))
        .header("authorization", format!("Bearer {bob}"))
        .header("cookie", "XSRF-TOKEN=cookie-value")
        .header("x-xsrf-token", "header-value")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "isPublic": true }).to_string()))
        .unwrap();
    let response = app.send_raw(request).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.file_state(&f1).await, (false, "PENDING".to_string()));

    let accepted = app.set_visibility(&bob, &f1, true).await;
    assert_eq!(accepted.status, StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_runs_before_authentication() {
    let app = spawn_app().await;

    let response = app
        .send(RequestSpec::new(Method::DELETE, "/api/files/anything"))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "CSRF_VALIDATION_FAILED");
}

#[tokio::test]
async fn test_csrf_cookie_is_minted() {
    let app = spawn_app().await;

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/files/public"))
        .await;
    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("XSRF-TOKEN="));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.to_ascii_lowercase().contains("httponly"));

    // An existing cookie is left alone.
    let response = app
        .send(RequestSpec::new(Method::GET, "/api/files/public").with_csrf())
        .await;
    assert!(!response.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_csrf_bootstrap_endpoint() {
    let app = spawn_app().await;

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/auth/csrf"))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let token = response.body["data"]["token"].as_str().unwrap();
    assert_eq!(token.len(), 64);
    assert_eq!(response.body["data"]["headerName"], "X-XSRF-TOKEN");

    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("XSRF-TOKEN={token}")));
}

#[tokio::test]
async fn test_rate_limit_bans_then_recovers() {
    let mut config = test_config();
    config.security.rate_limit.requests_per_minute = 100;
    config.security.rate_limit.ban_minutes = 1;
    let app = spawn_app_with(config).await;

    for i in 1..=100 {
        let response = app
            .send(RequestSpec::new(Method::GET, "/api/health").from_peer("1.2.3.4:40000"))
            .await;
        assert_eq!(response.status, StatusCode::OK, "request {i} was limited");
    }

    let limited = app
        .send(RequestSpec::new(Method::GET, "/api/health").from_peer("1.2.3.4:40000"))
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.body["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(limited.headers[header::RETRY_AFTER], "60");

    // Other clients keep their own budget.
    let other = app
        .send(RequestSpec::new(Method::GET, "/api/health").from_peer("5.6.7.8:40000"))
        .await;
    assert_eq!(other.status, StatusCode::OK);

    // A minute on, the ban is over and the sweep drops it.
    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(app.state.shared.rate_limiter.sweep_at(later), 2);

    let recovered = app
        .send(RequestSpec::new(Method::GET, "/api/health").from_peer("1.2.3.4:40000"))
        .await;
    assert_eq!(recovered.status, StatusCode::OK);
}

#[tokio::test]
async fn test_foreign_and_expired_tokens_are_rejected() {
    let app = spawn_app().await;
    let (_, user_id) = app.register("alice").await;
    let user = app.state.store().get_user(&user_id).await.unwrap().unwrap();

    let foreign = TokenService::new(&TokenConfig {
        secret: "y".repeat(48),
        ..app.state.config().token.clone()
    })
    .issue(&user)
    .unwrap();

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/auth/me").bearer(&foreign.token))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "TOKEN_ERROR");

    let expired = app
        .state
        .tokens()
        .issue_at(&user, chrono::Utc::now() - chrono::Duration::days(30))
        .unwrap();

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/auth/me").bearer(&expired.token))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Authentication token has expired");
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = spawn_app().await;

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/health"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_malformed_login_body_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .send(
            RequestSpec::new(Method::POST, "/api/auth/login")
                .json(json!({ "username": "x" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
    assert_eq!(app.state.shared.throttle.tracked(), 0);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let response = app.send_raw(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");

    let response = app
        .send(RequestSpec::new(Method::GET, "/api/files/public?page=abc"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_scheduler_sweeps_stale_state() {
    let app = spawn_app().await;
    let shared = app.state.shared.clone();

    let long_ago = chrono::Utc::now() - chrono::Duration::hours(2);
    shared.throttle.record_failure_at("ghost", long_ago);
    shared.throttle.record_failure("recent");
    assert_eq!(shared.throttle.tracked(), 2);

    let scheduler = Scheduler::new(shared.clone(), shared.config.scheduler.clone());
    scheduler.run_once().await;

    assert_eq!(shared.throttle.tracked(), 1);
    assert!(!scheduler.is_running().await);
}
