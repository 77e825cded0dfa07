mod common;

use axum::http::{Method, StatusCode};
use common::{RequestSpec, TestApp, spawn_app};
use serde_json::json;

async fn public_names(app: &TestApp) -> Vec<String> {
    let response = app
        .send(RequestSpec::new(Method::GET, "/api/files/public"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body["data"]["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["fileName"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_upload_starts_private_and_pending() {
    let app = spawn_app().await;
    let (bob, bob_id) = app.register("bob").await;

    let file_id = app.upload(&bob, "holiday.png").await;

    let info = app
        .send(RequestSpec::new(Method::GET, &format!("/api/files/{file_id}/info")).bearer(&bob))
        .await;
    assert_eq!(info.status, StatusCode::OK);
    assert_eq!(info.body["data"]["ownerId"], bob_id.as_str());
    assert_eq!(info.body["data"]["isPublic"], false);
    assert_eq!(info.body["data"]["moderationStatus"], "PENDING");
}

#[tokio::test]
async fn test_upload_rejects_unsafe_names() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;

    for name in ["", "../etc/passwd", "a/b.txt", "a\\b.txt"] {
        let response = app
            .send(
                RequestSpec::new(Method::POST, "/api/files/upload")
                    .bearer(&bob)
                    .json(json!({ "fileName": name, "size": 1 })),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "accepted {name:?}");
    }
}

#[tokio::test]
async fn test_republishing_resets_moderation() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;

    assert_eq!(app.set_visibility(&bob, &f1, true).await.status, StatusCode::OK);
    assert_eq!(app.moderate(&admin, &f1, "APPROVED").await.status, StatusCode::OK);
    assert_eq!(app.file_state(&f1).await, (true, "APPROVED".to_string()));

    let response = app.set_visibility(&bob, &f1, true).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["moderationStatus"], "PENDING");
    assert_eq!(app.file_state(&f1).await, (true, "PENDING".to_string()));
}

#[tokio::test]
async fn test_approval_publishes_and_strangers_are_forbidden() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let (stranger, _) = app.register("mallory").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;

    app.set_visibility(&bob, &f1, true).await;
    assert!(public_names(&app).await.is_empty());

    let approved = app.moderate(&admin, &f1, "APPROVED").await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.body["data"]["isPublic"], true);
    assert_eq!(public_names(&app).await, vec!["f1.png".to_string()]);

    let response = app.set_visibility(&stranger, &f1, false).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "FORBIDDEN");
    assert_eq!(app.file_state(&f1).await, (true, "APPROVED".to_string()));
}

#[tokio::test]
async fn test_admin_may_change_any_visibility() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;

    let response = app.set_visibility(&admin, &f1, true).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.file_state(&f1).await, (true, "PENDING".to_string()));
}

#[tokio::test]
async fn test_non_admin_cannot_moderate() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let f1 = app.upload(&bob, "f1.png").await;
    app.set_visibility(&bob, &f1, true).await;

    let response = app.moderate(&bob, &f1, "APPROVED").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.file_state(&f1).await, (true, "PENDING".to_string()));
}

#[tokio::test]
async fn test_moderation_errors() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;

    let invalid = app.moderate(&admin, &f1, "DELETED").await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["code"], "VALIDATION_ERROR");

    let missing = app.moderate(&admin, "no-such-file", "APPROVED").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let missing = app.set_visibility(&bob, "no-such-file", true).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejection_keeps_visibility_flag() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;
    app.set_visibility(&bob, &f1, true).await;

    app.moderate(&admin, &f1, "REJECTED").await;
    assert_eq!(app.file_state(&f1).await, (true, "REJECTED".to_string()));
    assert!(public_names(&app).await.is_empty());
}

#[tokio::test]
async fn test_private_files_are_hidden_from_others() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let (stranger, _) = app.register("mallory").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "secret.png").await;
    let uri = format!("/api/files/{f1}/info");

    let hidden = app
        .send(RequestSpec::new(Method::GET, &uri).bearer(&stranger))
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let admin_view = app
        .send(RequestSpec::new(Method::GET, &uri).bearer(&admin))
        .await;
    assert_eq!(admin_view.status, StatusCode::OK);

    app.set_visibility(&bob, &f1, true).await;
    app.moderate(&admin, &f1, "APPROVED").await;
    let listed = app
        .send(RequestSpec::new(Method::GET, &uri).bearer(&stranger))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
}

#[tokio::test]
async fn test_file_listing_scopes() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let (carol, _) = app.register("carol").await;
    let admin = app.admin_token().await;
    app.upload(&bob, "b1.png").await;
    app.upload(&bob, "b2.png").await;
    app.upload(&carol, "c1.png").await;

    let count = |token: String| {
        let app = &app;
        async move {
            app.send(RequestSpec::new(Method::GET, "/api/files").bearer(&token))
                .await
                .body["data"]
                .as_array()
                .unwrap()
                .len()
        }
    };

    assert_eq!(count(bob).await, 2);
    assert_eq!(count(carol).await, 1);
    assert_eq!(count(admin).await, 3);
}

#[tokio::test]
async fn test_public_listing_pages() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let admin = app.admin_token().await;

    for i in 0..3 {
        let id = app.upload(&bob, &format!("p{i}.png")).await;
        app.set_visibility(&bob, &id, true).await;
        app.moderate(&admin, &id, "APPROVED").await;
    }

    let page = app
        .send(RequestSpec::new(
            Method::GET,
            "/api/files/public?page=2&page_size=2",
        ))
        .await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["data"]["total"], 3);
    assert_eq!(page.body["data"]["page"], 2);
    assert_eq!(page.body["data"]["files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_is_owner_or_admin() {
    let app = spawn_app().await;
    let (bob, _) = app.register("bob").await;
    let (stranger, _) = app.register("mallory").await;
    let admin = app.admin_token().await;
    let f1 = app.upload(&bob, "f1.png").await;
    let f2 = app.upload(&bob, "f2.png").await;

    let denied = app
        .send(
            RequestSpec::new(Method::DELETE, &format!("/api/files/{f1}"))
                .bearer(&stranger)
                .with_csrf(),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let own = app
        .send(
            RequestSpec::new(Method::DELETE, &format!("/api/files/{f1}"))
                .bearer(&bob)
                .with_csrf(),
        )
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert!(app.state.store().get_file(&f1).await.unwrap().is_none());

    let by_admin = app
        .send(
            RequestSpec::new(Method::DELETE, &format!("/api/files/{f2}"))
                .bearer(&admin)
                .with_csrf(),
        )
        .await;
    assert_eq!(by_admin.status, StatusCode::OK);
}
