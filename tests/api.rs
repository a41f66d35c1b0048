mod common;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use common::TestServer;

fn error_kind(body: &Value) -> &str {
    body["error"]["kind"].as_str().unwrap_or_default()
}

/// Admin `bob` owns org `acme` with project `proj1`.
async fn acme_with_project(server: &TestServer) {
    let (status, _) = server
        .admin(Method::POST, "/api/v1/orgs", Some(json!({"id": "acme", "name": "Acme"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = server
        .admin(
            Method::POST,
            "/api/v1/orgs/acme/projects",
            Some(json!({"id": "proj1", "name": "Project One"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start();
    let (status, body) = server.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let server = TestServer::start();
    let (status, body) = server.request(Method::GET, "/api/v1/orgs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_kind(&body), "AuthenticationError");

    let (status, _) = server
        .request(Method::GET, "/api/v1/orgs", Some("mbee_nope"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_whoami() {
    let server = TestServer::start();
    let (status, body) = server.admin(Method::GET, "/api/v1/users/whoami", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");
    assert_eq!(body["data"]["admin"], true);
    assert!(body["data"].get("token_hash").is_none());
}

#[tokio::test]
async fn test_project_grant_propagates_to_org() {
    let server = TestServer::start();
    let carol = server.create_user("carol").await;
    acme_with_project(&server).await;

    let (status, _) = server
        .request(Method::GET, "/api/v1/orgs/acme", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"permissions": {"carol": "write"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["permissions"]["carol"], json!(["read", "write"]));
    assert!(body.get("warnings").is_none());

    let (status, body) = server
        .request(Method::GET, "/api/v1/orgs/acme", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["permissions"]["carol"], json!(["read"]));

    let (status, body) = server
        .request(Method::GET, "/api/v1/orgs/acme/projects", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "proj1");
}

#[tokio::test]
async fn test_org_removal_blocked_by_project_access() {
    let server = TestServer::start();
    server.create_user("carol").await;
    acme_with_project(&server).await;
    server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"permissions": {"carol": "read"}})),
        )
        .await;

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme",
            Some(json!({"permissions": {"carol": "remove_all"}})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_kind(&body), "DependentPermissionError");
    assert!(body["error"]["message"].as_str().unwrap().contains("acme:proj1"));

    server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"permissions": {"carol": "remove_all"}})),
        )
        .await;
    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme",
            Some(json!({"permissions": {"carol": "remove_all"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["permissions"].get("carol").is_none());
}

#[tokio::test]
async fn test_default_org_is_immutable() {
    let server = TestServer::start();
    let (status, body) = server
        .admin(Method::PATCH, "/api/v1/orgs/default", Some(json!({"name": "Renamed"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "ImmutableFieldError");

    let (status, body) = server
        .admin(Method::DELETE, "/api/v1/orgs/default", None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "ImmutableFieldError");
}

#[tokio::test]
async fn test_archived_project_gating() {
    let server = TestServer::start();
    acme_with_project(&server).await;

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"archived": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["archived"], true);
    assert_eq!(body["data"]["archived_by"], "bob");

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"name": "Renamed"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "ArchivedObjectError");

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects/proj1",
            Some(json!({"archived": false, "name": "New"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "New");
    assert_eq!(body["data"]["archived"], false);
    assert!(body["data"]["archived_by"].is_null());
}

#[tokio::test]
async fn test_invalid_role_rejects_whole_batch() {
    let server = TestServer::start();
    server.create_user("carol").await;
    acme_with_project(&server).await;
    server
        .admin(Method::POST, "/api/v1/orgs/acme/projects", Some(json!({"id": "proj2"})))
        .await;

    let (status, body) = server
        .admin(
            Method::PATCH,
            "/api/v1/orgs/acme/projects",
            Some(json!([
                {"id": "proj1", "name": "Valid"},
                {"id": "proj2", "permissions": {"carol": "owner"}},
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "InvalidPermissionValue");

    let (_, body) = server
        .admin(Method::GET, "/api/v1/orgs/acme/projects/proj1", None)
        .await;
    assert_eq!(body["data"]["name"], "Project One");
}

#[tokio::test]
async fn test_self_permission_change_forbidden() {
    let server = TestServer::start();
    let alice = server.create_user("alice").await;
    server
        .admin(
            Method::POST,
            "/api/v1/orgs",
            Some(json!({"id": "acme", "permissions": {"alice": "admin"}})),
        )
        .await;

    let (status, body) = server
        .request(
            Method::PATCH,
            "/api/v1/orgs/acme",
            Some(alice.as_str()),
            Some(json!({"permissions": {"alice": "read"}})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "AuthorizationError");
}

#[tokio::test]
async fn test_non_admin_cannot_create_orgs() {
    let server = TestServer::start();
    let alice = server.create_user("alice").await;
    let (status, body) = server
        .request(
            Method::POST,
            "/api/v1/orgs",
            Some(alice.as_str()),
            Some(json!({"id": "mine"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "AuthorizationError");
}

#[tokio::test]
async fn test_org_delete_requires_archive_and_cascades() {
    let server = TestServer::start();
    acme_with_project(&server).await;

    let (status, body) = server.admin(Method::DELETE, "/api/v1/orgs/acme", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "ArchivedObjectError");

    server
        .admin(Method::PATCH, "/api/v1/orgs/acme", Some(json!({"archived": true})))
        .await;
    let (status, body) = server.admin(Method::DELETE, "/api/v1/orgs/acme", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["acme"]));

    let (status, _) = server
        .admin(Method::GET, "/api/v1/orgs/acme/projects", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_ids_reported_together() {
    let server = TestServer::start();
    let (status, body) = server
        .admin(Method::GET, "/api/v1/orgs?ids=nope,gone", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("nope") && message.contains("gone"));
}

#[tokio::test]
async fn test_archived_user_cannot_authenticate() {
    let server = TestServer::start();
    let carol = server.create_user("carol").await;

    let (status, _) = server
        .request(Method::GET, "/api/v1/users/whoami", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .admin(Method::PATCH, "/api/v1/users", Some(json!({"id": "carol", "archived": true})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .request(Method::GET, "/api/v1/users/whoami", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_users_cannot_mint_tokens_for_others() {
    let server = TestServer::start();
    let carol = server.create_user("carol").await;
    server.create_user("dave").await;

    let (status, _) = server
        .request(Method::POST, "/api/v1/users/dave/tokens", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .request(Method::POST, "/api/v1/users/carol/tokens", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["token"].as_str().unwrap().starts_with("mbee_"));
}

#[tokio::test]
async fn test_new_users_join_default_org() {
    let server = TestServer::start();
    let carol = server.create_user("carol").await;

    let (status, body) = server
        .request(Method::GET, "/api/v1/orgs/default", Some(carol.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["permissions"]["carol"], json!(["read", "write"]));
}

#[tokio::test]
async fn test_token_expiry_out_of_range_is_rejected() {
    let server = TestServer::start();
    server.create_user("carol").await;

    let (status, body) = server
        .admin(
            Method::POST,
            "/api/v1/users/carol/tokens",
            Some(json!({"expires_in_seconds": i64::MAX})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "ValidationError");

    let (status, body) = server
        .admin(
            Method::POST,
            "/api/v1/users/carol/tokens",
            Some(json!({"expires_in_seconds": 3600})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["expires_at"].is_string());
}
