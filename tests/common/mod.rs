#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
};
use filedock::api::{AppState, create_app_state, router};
use filedock::config::Config;
use filedock::services::Mailer;
use filedock::state::SharedState;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "Adm1n!secret";
pub const PASSWORD: &str = "Passw0rd!";
pub const CSRF_TOKEN: &str = "test-csrf-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub kind: &'static str,
    pub email: String,
    pub token: String,
}

/// Captures hand-offs so tests can read the issued tokens.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Waits for the background verification hand-off after registration.
    pub async fn wait_for(&self, kind: &str, email: &str) -> SentMail {
        for _ in 0..100 {
            if let Some(mail) = self
                .sent()
                .into_iter()
                .rev()
                .find(|m| m.kind == kind && m.email == email)
            {
                return mail;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no {kind} mail for {email}");
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification(&self, email: &str, _username: &str, token: &str) -> anyhow::Result<()> {
        self.sent.lock().push(SentMail {
            kind: "verification",
            email: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, _username: &str, token: &str) -> anyhow::Result<()> {
        self.sent.lock().push(SentMail {
            kind: "password_reset",
            email: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
    _db_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.token.secret = "x".repeat(48);
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.rate_limit.requests_per_minute = 10_000;
    config.admin.password = ADMIN_PASSWORD.to_string();
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

/// Builds the app over a fresh SQLite file that lives as long as the `TestApp`.
pub async fn spawn_app_with(mut config: Config) -> TestApp {
    let db_dir = tempfile::tempdir().expect("Failed to create temp dir");
    config.general.database_path =
        format!("sqlite://{}", db_dir.path().join("filedock.db").display());

    let mailer = Arc::new(RecordingMailer::default());
    let admin = config.admin.clone();

    let shared = SharedState::with_mailer(config, mailer.clone())
        .await
        .expect("Failed to create shared state");
    shared
        .auth_service
        .ensure_admin(&admin.username, &admin.email, &admin.password)
        .await
        .expect("Failed to create admin");

    let state = create_app_state(Arc::new(shared));
    TestApp {
        router: router(state.clone()),
        state,
        mailer,
        _db_dir: db_dir,
    }
}

pub struct RequestSpec<'a> {
    pub method: Method,
    pub uri: &'a str,
    pub bearer: Option<&'a str>,
    pub body: Option<Value>,
    pub csrf: bool,
    pub peer: Option<&'a str>,
}

impl<'a> RequestSpec<'a> {
    pub fn new(method: Method, uri: &'a str) -> Self {
        Self {
            method,
            uri,
            bearer: None,
            body: None,
            csrf: false,
            peer: None,
        }
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_csrf(mut self) -> Self {
        self.csrf = true;
        self
    }

    pub fn from_peer(mut self, peer: &'a str) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);

        if let Some(token) = self.bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if self.csrf {
            builder = builder
                .header("cookie", format!("XSRF-TOKEN={CSRF_TOKEN}"))
                .header("x-xsrf-token", CSRF_TOKEN);
        }

        let body = match self.body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let mut request = builder.body(body).unwrap();
        if let Some(peer) = self.peer {
            request
                .extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        request
    }
}

impl TestApp {
    pub async fn send(&self, spec: RequestSpec<'_>) -> TestResponse {
        self.send_raw(spec.build()).await
    }

    pub async fn send_raw(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.send(
            RequestSpec::new(Method::POST, "/api/auth/login")
                .json(json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Logs in and returns the session token.
    pub async fn token_for(&self, username: &str, password: &str) -> String {
        let response = self.login(username, password).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.body["data"]["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.token_for(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Registers `username` and returns `(token, user_id)`.
    pub async fn register(&self, username: &str) -> (String, String) {
        let response = self
            .send(
                RequestSpec::new(Method::POST, "/api/auth/register").json(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "register failed: {}", response.body);

        let data = &response.body["data"];
        (
            data["token"].as_str().unwrap().to_string(),
            data["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Uploads a file owned by the bearer and returns its id.
    pub async fn upload(&self, token: &str, file_name: &str) -> String {
        let response = self
            .send(
                RequestSpec::new(Method::POST, "/api/files/upload")
                    .bearer(token)
                    .json(json!({ "fileName": file_name, "contentType": "image/png", "size": 1024 })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "upload failed: {}", response.body);
        response.body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn set_visibility(&self, token: &str, file_id: &str, is_public: bool) -> TestResponse {
        let uri = format!("/api/files/{file_id}/visibility");
        self.send(
            RequestSpec::new(Method::POST, &uri)
                .bearer(token)
                .with_csrf()
                .json(json!({ "isPublic": is_public })),
        )
        .await
    }

    pub async fn moderate(&self, token: &str, file_id: &str, status: &str) -> TestResponse {
        let uri = format!("/api/files/{file_id}/moderate");
        self.send(
            RequestSpec::new(Method::PATCH, &uri)
                .bearer(token)
                .with_csrf()
                .json(json!({ "status": status })),
        )
        .await
    }

    /// Reads the stored `(is_public, moderation_status)` pair.
    pub async fn file_state(&self, file_id: &str) -> (bool, String) {
        let file = self
            .state
            .store()
            .get_file(file_id)
            .await
            .unwrap()
            .expect("file exists");
        (file.is_public, file.moderation_status.to_string())
    }
}
