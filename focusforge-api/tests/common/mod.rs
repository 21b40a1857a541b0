//! Shared helpers for the API integration tests
//!
//! Two flavours of app:
//! - [`TestApp::offline`]: lazy pool that never connects, for requests the
//!   router rejects before touching the database
//! - [`TestApp::with_database`]: real pool from `DATABASE_URL` with
//!   migrations applied; `None` when the variable is unset

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use focusforge_api::{
    app::{build_router, AppState},
    config::Config,
};
use focusforge_shared::{
    auth::jwt::{create_token, Claims, TokenType},
    db::{
        migrations::run_migrations,
        pool::{create_lazy_pool, create_pool, DatabaseConfig},
    },
};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "hunter22";

const OFFLINE_URL: &str = "postgres://focusforge@127.0.0.1:1/focusforge";

pub fn test_config(database_url: &str) -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some(database_url.to_string()),
        "JWT_SECRET" => Some(TEST_SECRET.to_string()),
        "FRONTEND_URL" => Some("http://app.test".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub struct TestApp {
    pub app: Router,
    pub db: PgPool,
    pub config: Config,
}

impl TestApp {
    pub fn offline() -> Self {
        let config = test_config(OFFLINE_URL);
        let db = create_lazy_pool(&DatabaseConfig {
            url: OFFLINE_URL.to_string(),
            ..DatabaseConfig::default()
        })
        .expect("lazy pool");

        Self::assemble(db, config)
    }

    pub async fn with_database() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let config = test_config(&url);

        let db = create_pool(DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 0,
            ..DatabaseConfig::default()
        })
        .await
        .expect("database connection");
        run_migrations(&db).await.expect("migrations");

        Some(Self::assemble(db, config))
    }

    fn assemble(db: PgPool, config: Config) -> Self {
        let app = build_router(AppState::new(db.clone(), config.clone()));
        Self { app, db, config }
    }

    /// Sends a request and returns the status with the parsed JSON body
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Registers a fresh account; returns its id and access token
    pub async fn signup(&self, email: &str, full_name: &str) -> (Uuid, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": TEST_PASSWORD,
                    "full_name": full_name,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");

        let id = body["data"]["user"]["id"].as_str().unwrap().parse().unwrap();
        let token = body["data"]["access_token"].as_str().unwrap().to_string();
        (id, token)
    }
}

/// Access token for an arbitrary user id, no database involved
pub fn access_token(user_id: Uuid) -> String {
    create_token(&Claims::new(user_id, TokenType::Access), TEST_SECRET).unwrap()
}

pub fn refresh_token(user_id: Uuid) -> String {
    create_token(&Claims::new(user_id, TokenType::Refresh), TEST_SECRET).unwrap()
}

pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// Token part of an invitation link
pub fn token_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().to_string()
}
