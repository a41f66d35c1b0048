use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mbee::config::ServerConfig;
use mbee::server::create_router;
use mbee::setup;

pub struct TestServer {
    pub temp_dir: TempDir,
    pub admin_token: String,
    router: Router,
}

impl TestServer {
    /// Initializes a fresh data directory with system admin `bob`.
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };

        let init = setup::initialize(&config, "bob").expect("initialize");
        let state = setup::open_state(&config).expect("open state");

        Self {
            temp_dir,
            admin_token: init.token,
            router: create_router(Arc::new(state)),
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("send request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn admin(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, path, Some(self.admin_token.as_str()), body)
            .await
    }

    /// Creates a user as the admin and mints a token for them.
    pub async fn create_user(&self, username: &str) -> String {
        let (status, _) = self
            .admin(
                Method::POST,
                "/api/v1/users",
                Some(serde_json::json!({ "username": username })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user {username}");

        let (status, body) = self
            .admin(
                Method::POST,
                &format!("/api/v1/users/{username}/tokens"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "mint token for {username}");
        body["data"]["token"].as_str().expect("token").to_string()
    }
}
