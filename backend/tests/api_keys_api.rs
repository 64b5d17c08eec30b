mod support;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::json;
use support::TestApp;

#[tokio::test]
async fn api_key_is_shown_once_and_authenticates_to_the_same_realm() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let namespace = app.realm_namespace(&session).await;

    let created = app
        .call(
            Method::POST,
            "/api/v1/api-keys",
            Some(&session),
            Some(json!({ "name": "grafana" })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let key = created.json["key"].as_str().expect("key").to_string();
    assert!(key.starts_with("mrk_"));
    assert!(key.starts_with(created.json["key_prefix"].as_str().expect("prefix")));

    let listed = app.call(Method::GET, "/api/v1/api-keys", Some(&session), None).await;
    assert_eq!(listed.json[0]["name"], "grafana");
    assert!(listed.json[0].get("key").is_none());
    assert!(listed.json[0].get("key_hash").is_none());

    assert_eq!(app.realm_namespace(&key).await, namespace);
}

#[tokio::test]
async fn api_key_header_is_accepted() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let key = app.create_api_key(&session, "cli").await;

    let response = app
        .send(
            Request::builder()
                .method(Method::GET)
                .uri("/api/v1/realm")
                .header("x-api-key", key.as_str())
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn self_endpoint_is_api_key_only() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let key = app.create_api_key(&session, "ci").await;

    let with_key = app
        .call(Method::GET, "/api/v1/api-keys/self", Some(&key), None)
        .await;
    assert_eq!(with_key.status, StatusCode::OK);
    assert_eq!(with_key.json["name"], "ci");

    let with_session = app
        .call(Method::GET, "/api/v1/api-keys/self", Some(&session), None)
        .await;
    assert_eq!(with_session.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_key_cannot_create_api_keys_or_delete_nodes() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let key = app.create_api_key(&session, "ci").await;
    let node = app
        .mesh
        .add_node(&app.realm_namespace(&session).await, "box");

    let create = app
        .call(
            Method::POST,
            "/api/v1/api-keys",
            Some(&key),
            Some(json!({ "name": "escalated" })),
        )
        .await;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);

    let delete = app
        .call(
            Method::DELETE,
            &format!("/api/v1/nodes/{}", node.id),
            Some(&key),
            None,
        )
        .await;
    assert_eq!(delete.status, StatusCode::UNAUTHORIZED);

    let read = app
        .call(
            Method::GET,
            &format!("/api/v1/nodes/{}", node.id),
            Some(&key),
            None,
        )
        .await;
    assert_eq!(read.status, StatusCode::OK);
}

#[tokio::test]
async fn deleted_key_stops_working() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let key = app.create_api_key(&session, "temp").await;
    let current = app
        .call(Method::GET, "/api/v1/api-keys/self", Some(&key), None)
        .await;
    let id = current.json["id"].as_str().expect("id").to_string();

    let deleted = app
        .call(
            Method::DELETE,
            &format!("/api/v1/api-keys/{}", id),
            Some(&session),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let after = app.call(Method::GET, "/api/v1/realm", Some(&key), None).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_key_is_rejected() {
    let app = TestApp::new();
    let session = app.login("alice").await;

    let past = app
        .call(
            Method::POST,
            "/api/v1/api-keys",
            Some(&session),
            Some(json!({ "name": "old", "expires_at": "2000-01-01T00:00:00Z" })),
        )
        .await;
    assert_eq!(past.status, StatusCode::BAD_REQUEST);

    let unknown = app
        .call(Method::GET, "/api/v1/realm", Some("mrk_not-a-real-key"), None)
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let app = TestApp::new();
    let session = app.login("alice").await;
    let response = app
        .call(
            Method::POST,
            "/api/v1/api-keys",
            Some(&session),
            Some(json!({ "name": "" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["code"], "VALIDATION_ERROR");
}
