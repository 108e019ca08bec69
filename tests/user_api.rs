mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use recipebook::users::services;
use serde_json::json;

const CREATE: &str = "/api/user/create";
const TOKEN: &str = "/api/user/token";
const ME: &str = "/api/user/me";

#[tokio::test]
async fn create_valid_user_success() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            CREATE,
            None,
            json!({ "email": "test@example.com", "password": "testpass123", "name": "Test name" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "email": "test@example.com", "name": "Test name" }));
    let user = services::authenticate(app.store(), "test@example.com", "testpass123")
        .await
        .unwrap();
    assert!(user.is_some());
}

#[tokio::test]
async fn user_exists_is_rejected() {
    let app = TestApp::new();
    app.user("test@example.com", "testpass123").await;

    let (status, body) = app
        .post(CREATE, None, json!({ "email": "test@example.com", "password": "testpass123" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());
}

#[tokio::test]
async fn password_too_short_creates_nothing() {
    let app = TestApp::new();
    let (status, body) = app
        .post(CREATE, None, json!({ "email": "test@example.com", "password": "pw" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("password").is_some());
    assert!(app
        .store()
        .find_user_by_email("test@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn create_requires_email_and_password() {
    let app = TestApp::new();
    let (status, body) = app.post(CREATE, None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());
    assert!(body.get("password").is_some());

    let (status, _) = app
        .post(CREATE, None, json!({ "email": "not-an-email", "password": "testpass123" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = TestApp::new();
    let req = axum::http::Request::builder()
        .method(Method::POST)
        .uri(CREATE)
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_token_for_user() {
    let app = TestApp::new();
    app.user("test@example.com", "testpass123").await;

    let (status, body) = app
        .post(TOKEN, None, json!({ "email": "test@example.com", "password": "testpass123" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, me) = app.get(ME, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "test@example.com");
}

#[tokio::test]
async fn token_email_is_case_insensitive() {
    let app = TestApp::new();
    app.user("test@example.com", "testpass123").await;

    let (status, body) = app
        .post(TOKEN, None, json!({ "email": "Test@EXAMPLE.com", "password": "testpass123" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("token").is_some());
}

#[tokio::test]
async fn create_token_bad_credentials() {
    let app = TestApp::new();
    app.user("test@example.com", "goodpass").await;

    let (status, body) = app
        .post(TOKEN, None, json!({ "email": "test@example.com", "password": "badpass" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("token").is_none());
    assert!(body.get("non_field_errors").is_some());
}

#[tokio::test]
async fn create_token_no_user() {
    let app = TestApp::new();
    let (status, body) = app
        .post(TOKEN, None, json!({ "email": "test@example.com", "password": "testpass123" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn create_token_blank_password() {
    let app = TestApp::new();
    app.user("test@example.com", "testpass123").await;

    let (status, body) = app
        .post(TOKEN, None, json!({ "email": "test@example.com", "password": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("token").is_none());
    assert!(body.get("password").is_some());
}

#[tokio::test]
async fn retrieve_user_unauthorized() {
    let app = TestApp::new();
    let (status, _) = app.get(ME, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get(ME, Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn retrieve_profile_success() {
    let app = TestApp::new();
    let user = services::create_user(
        app.store(),
        "test@example.com",
        "testpass123",
        services::ExtraFields {
            name: Some("Test Name".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let token = app.token_for(&user);

    let (status, body) = app.get(ME, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "email": "test@example.com", "name": "Test Name" }));
}

#[tokio::test]
async fn post_me_not_allowed() {
    let app = TestApp::new();
    let (_, token) = app.login("test@example.com").await;

    let (status, _) = app.post(ME, Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn update_user_profile() {
    let app = TestApp::new();
    let (user, token) = app.login("test@example.com").await;

    let (status, body) = app
        .patch(ME, Some(&token), json!({ "name": "Updated name", "password": "newpassword123" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Updated name");

    let refreshed = app.store().find_user(user.id).await.unwrap().unwrap();
    assert_eq!(refreshed.name, "Updated name");
    assert!(refreshed.check_password("newpassword123"));
    assert!(!refreshed.check_password("testpass123"));
}

#[tokio::test]
async fn put_me_requires_every_field() {
    let app = TestApp::new();
    let (_, token) = app.login("test@example.com").await;

    let (status, body) = app.put(ME, Some(&token), json!({ "name": "Only name" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());
    assert!(body.get("password").is_some());
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}
