//! Web API Object Tests
//!
//! Integration tests for object and session endpoints.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{Method, StatusCode};
use axum_test::TestServer;
use bytes::Bytes;
use filedrop::config::{StorageBackend, StorageConfig, WebConfig};
use filedrop::storage::{MemoryStore, ObjectStore};
use filedrop::web::handlers::AppState;
use filedrop::web::router::create_router;
use filedrop::JwtAuthenticator;
use serde_json::{json, Value};
use std::sync::Arc;

const SECRET: &str = "test-secret-key-for-testing-only";

/// Create a test server with an in-memory store and a valid token.
fn create_test_server_with_limit(max_upload_size_mb: u64) -> (TestServer, String) {
    let web = WebConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: SECRET.to_string(),
        api_rate_limit: 100_000,
        ..WebConfig::default()
    };
    let storage = StorageConfig {
        backend: StorageBackend::Memory,
        max_upload_size_mb,
        ..StorageConfig::default()
    };

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let app_state = Arc::new(AppState::new(Some(store), storage.max_upload_size()));
    let authenticator = JwtAuthenticator::new(SECRET, 3600);
    let token = authenticator.issue_token("alice").unwrap();

    let router = create_router(app_state, Arc::new(authenticator), &web, &storage);
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, token)
}

fn create_test_server() -> (TestServer, String) {
    create_test_server_with_limit(100)
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

async fn put_text(server: &TestServer, token: &str, key: &str, text: &'static str) -> Value {
    let response = server
        .put(&format!("/api/objects/{}", key))
        .add_header(AUTHORIZATION, bearer(token))
        .add_header(CONTENT_TYPE, "text/plain".to_string())
        .bytes(Bytes::from_static(text.as_bytes()))
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_objects_require_authentication() {
    let (server, _token) = create_test_server();

    server
        .get("/api/objects")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/api/objects/a.txt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .put("/api/objects/a.txt")
        .bytes(Bytes::from_static(b"hello"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_put_and_download() {
    let (server, token) = create_test_server();

    let body = put_text(&server, &token, "docs/readme.txt", "hello world").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["key"], "docs/readme.txt");
    assert_eq!(body["size"], 11);

    let response = server
        .get("/api/objects/docs/readme.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "hello world");
    assert_eq!(response.header(CONTENT_TYPE), "text/plain");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"readme.txt\""
    );
    let etag = response.header("etag");
    assert_eq!(
        etag.to_str().unwrap(),
        format!("\"{}\"", body["checksum"].as_str().unwrap())
    );
    let last_modified = response.header("last-modified");
    let last_modified = last_modified.to_str().unwrap();
    assert!(last_modified.ends_with(" GMT"), "{last_modified}");
    assert!(!last_modified.contains('+'));
}

#[tokio::test]
async fn test_download_with_cookie_token() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "a.txt", "cookie").await;

    let response = server
        .get("/api/objects/a.txt")
        .add_header(COOKIE, format!("filedrop_session={}", token))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "cookie");
}

#[tokio::test]
async fn test_head_object() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "a.txt", "twelve bytes").await;

    let response = server
        .method(Method::HEAD, "/api/objects/a.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status_ok();
    assert_eq!(response.header("content-length"), "12");

    server
        .method(Method::HEAD, "/api/objects/missing.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_missing() {
    let (server, token) = create_test_server();

    let response = server
        .get("/api/objects/missing.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_objects_with_prefix() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "docs/a.txt", "a").await;
    put_text(&server, &token, "docs/b.txt", "b").await;
    put_text(&server, &token, "images/c.png", "c").await;

    let response = server
        .get("/api/objects")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["objects"].as_array().unwrap().len(), 3);

    let response = server
        .get("/api/objects")
        .add_header(AUTHORIZATION, bearer(&token))
        .add_query_param("prefix", "docs/")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let keys: Vec<&str> = body["objects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["docs/a.txt", "docs/b.txt"]);
}

#[tokio::test]
async fn test_delete_object() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "a.txt", "bye").await;

    let response = server
        .delete("/api/objects/a.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();

    let response = server
        .delete("/api/objects/a.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rename_object() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "old.txt", "content").await;

    let response = server
        .post("/api/objects/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "from": "old.txt", "to": "new/name.txt" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["key"], "new/name.txt");

    server
        .get("/api/objects/old.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = server
        .get("/api/objects/new/name.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    assert_eq!(response.text(), "content");
    assert_eq!(response.header(CONTENT_TYPE), "text/plain");
}

#[tokio::test]
async fn test_rename_conflict_and_overwrite() {
    let (server, token) = create_test_server();
    put_text(&server, &token, "a.txt", "a").await;
    put_text(&server, &token, "b.txt", "b").await;

    let response = server
        .post("/api/objects/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "from": "a.txt", "to": "b.txt" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "CONFLICT");

    let response = server
        .post("/api/objects/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "from": "a.txt", "to": "b.txt", "overwrite": true }))
        .await;
    response.assert_status_ok();

    let response = server
        .get("/api/objects/b.txt")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.text(), "a");
}

#[tokio::test]
async fn test_rename_validation_error() {
    let (server, token) = create_test_server();

    let response = server
        .post("/api/objects/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "from": "", "to": "b.txt" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["details"]["from"].is_array());
}

#[tokio::test]
async fn test_rename_missing_source() {
    let (server, token) = create_test_server();

    let response = server
        .post("/api/objects/rename")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "from": "nope.txt", "to": "b.txt" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_too_large() {
    let (server, token) = create_test_server_with_limit(1);

    let response = server
        .put("/api/objects/big.bin")
        .add_header(AUTHORIZATION, bearer(&token))
        .bytes(Bytes::from(vec![0u8; 1024 * 1024 + 1]))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_session_endpoint() {
    let (server, token) = create_test_server();

    let response = server.get("/api/auth/session").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["authenticated"], false);

    let response = server
        .get("/api/auth/session")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["subject"], "alice");
}
