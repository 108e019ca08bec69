#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use recipebook::{
    app::build_app,
    config::{AppConfig, JwtConfig},
    recipes::repo_types::{Attribute, AttributeKind, NewRecipe, Recipe},
    state::AppState,
    storage::LocalStorage,
    store::{MemoryStore, Store},
    users::{
        jwt::JwtKeys,
        repo_types::User,
        services::{self, ExtraFields},
    },
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "recipebook-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub media: TempDir,
}

pub fn config(media_root: PathBuf) -> AppConfig {
    AppConfig {
        database_url: None,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "recipebook".into(),
            audience: "recipebook-users".into(),
            ttl_minutes: 60,
        },
        s3: None,
        media_root,
        admin: None,
    }
}

impl TestApp {
    pub fn new() -> Self {
        let media = tempfile::tempdir().unwrap();
        let state = AppState::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(config(media.path().to_path_buf())),
            Arc::new(LocalStorage::new(media.path())),
        );
        Self {
            router: build_app(state.clone()),
            state,
            media,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.state.store.as_ref()
    }

    pub async fn user(&self, email: &str, password: &str) -> User {
        services::create_user(self.store(), email, password, ExtraFields::default())
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        JwtKeys::new(&self.state.config.jwt).sign(user.id).unwrap()
    }

    /// A fresh user plus a bearer token for it.
    pub async fn login(&self, email: &str) -> (User, String) {
        let user = self.user(email, "testpass123").await;
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn tag(&self, user: &User, name: &str) -> Attribute {
        self.store()
            .insert_attribute(AttributeKind::Tag, user.id, name)
            .await
            .unwrap()
    }

    pub async fn ingredient(&self, user: &User, name: &str) -> Attribute {
        self.store()
            .insert_attribute(AttributeKind::Ingredient, user.id, name)
            .await
            .unwrap()
    }

    pub async fn recipe(&self, user: &User, title: &str) -> Recipe {
        self.recipe_with(user, title, vec![], vec![]).await
    }

    pub async fn recipe_with(
        &self,
        user: &User,
        title: &str,
        tags: Vec<uuid::Uuid>,
        ingredients: Vec<uuid::Uuid>,
    ) -> Recipe {
        self.store()
            .insert_recipe(
                user.id,
                NewRecipe {
                    title: title.into(),
                    time_minutes: 10,
                    price: Decimal::new(500, 2),
                    tags,
                    ingredients,
                },
            )
            .await
            .unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// JSON request; returns the status and the parsed body (`Null` when empty).
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = self.send(req).await;
        let status = res.status();
        (status, read_json(res).await)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::DELETE, uri, token, None).await
    }

    /// Multipart POST with a single file part.
    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        field: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, filename, content_type, data)))
            .unwrap();
        let res = self.send(req).await;
        let status = res.status();
        (status, read_json(res).await)
    }
}

pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn read_json(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

pub fn names(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect()
}
