//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against an
//! in-process store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use chrono::DateTime;
use docstore_cache::api::create_router;
use docstore_cache::cache::{CacheOptions, DocumentCache, ManualClock};
use docstore_cache::store::{MemoryCollectionStore, StoreConfig, StoreContext};
use docstore_cache::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    let context = Arc::new(StoreContext::new(StoreConfig::MemoryCollection));
    let state = AppState::new(DocumentCache::new(context, CacheOptions::default()));
    create_router(state)
}

fn create_clocked_app() -> (Router, Arc<ManualClock>, Arc<MemoryCollectionStore>) {
    let store = Arc::new(MemoryCollectionStore::new());
    let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
    let context = Arc::new(StoreContext::with_store(store.clone()));
    let cache = DocumentCache::new(context, CacheOptions::default()).with_clock(clock.clone());
    (create_router(AppState::new(cache)), clock, store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// == SET / GET Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/set", Some(json!({"key": "test_key", "value": "test_value"}))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].as_str().unwrap().contains("test_key"));
}

#[tokio::test]
async fn test_get_returns_structured_value() {
    let app = create_test_app();
    let value = json!({"user": "ada", "roles": ["admin", "ops"], "age": 36});

    let set_response = send(&app, "PUT", "/set", Some(json!({"key": "profile", "value": value}))).await;
    assert_eq!(set_response.status(), StatusCode::OK);

    let get_response = send(&app, "GET", "/get/profile", None).await;
    assert_eq!(get_response.status(), StatusCode::OK);
    let json = body_to_json(get_response.into_body()).await;
    assert_eq!(json["key"], "profile");
    assert_eq!(json["value"], value);
}

#[tokio::test]
async fn test_get_endpoint_not_found() {
    let app = create_test_app();

    let response = send(&app, "GET", "/get/nonexistent_key", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("nonexistent_key"));
}

#[tokio::test]
async fn test_set_rejects_empty_key() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/set", Some(json!({"key": "", "value": 1}))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_rejects_malformed_body() {
    let app = create_test_app();

    let response = send(&app, "PUT", "/set", Some(json!({"value": 1}))).await;

    assert!(response.status().is_client_error());
}

// == Version Tests ==

#[tokio::test]
async fn test_version_query_selects_entry() {
    let app = create_test_app();

    send(&app, "PUT", "/set", Some(json!({"key": "k", "value": "v2", "version": 2}))).await;

    let default_version = send(&app, "GET", "/get/k", None).await;
    assert_eq!(default_version.status(), StatusCode::NOT_FOUND);

    let second = send(&app, "GET", "/get/k?version=2", None).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_to_json(second.into_body()).await["value"], "v2");
}

// == ADD Endpoint Tests ==

#[tokio::test]
async fn test_add_only_stores_once() {
    let app = create_test_app();

    let first = send(&app, "POST", "/add", Some(json!({"key": "key1", "value": "first"}))).await;
    assert_eq!(body_to_json(first.into_body()).await["added"], true);

    let second = send(&app, "POST", "/add", Some(json!({"key": "key1", "value": "second"}))).await;
    assert_eq!(body_to_json(second.into_body()).await["added"], false);

    let get_response = send(&app, "GET", "/get/key1", None).await;
    assert_eq!(body_to_json(get_response.into_body()).await["value"], "first");
}

// == Expiry Tests ==

#[tokio::test]
async fn test_expired_entry_is_not_found_and_removed() {
    let (app, clock, store) = create_clocked_app();

    send(&app, "PUT", "/set", Some(json!({"key": "short", "value": 1, "timeout": 5}))).await;
    clock.advance(6);

    let response = send(&app, "GET", "/get/short", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_touch_extends_expiry() {
    let (app, clock, _store) = create_clocked_app();

    send(&app, "PUT", "/set", Some(json!({"key": "session", "value": "s", "timeout": 5}))).await;

    let touch = send(&app, "POST", "/touch/session", Some(json!({"timeout": 120}))).await;
    assert_eq!(touch.status(), StatusCode::OK);

    clock.advance(60);

    let response = send(&app, "GET", "/get/session", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response.into_body()).await["value"], "s");
}

#[tokio::test]
async fn test_touch_without_body_uses_default_timeout() {
    let (app, clock, _store) = create_clocked_app();

    send(&app, "PUT", "/set", Some(json!({"key": "k", "value": 1, "timeout": 5}))).await;
    let touch = send(&app, "POST", "/touch/k", None).await;
    assert_eq!(touch.status(), StatusCode::OK);

    clock.advance(299);
    let has = send(&app, "GET", "/has/k", None).await;
    assert_eq!(body_to_json(has.into_body()).await["exists"], true);
}

#[tokio::test]
async fn test_no_expiry_survives_time() {
    let (app, clock, _store) = create_clocked_app();

    send(&app, "PUT", "/set", Some(json!({"key": "forever", "value": 1, "no_expiry": true}))).await;
    clock.advance(100 * 365 * 24 * 3600);

    let response = send(&app, "GET", "/get/forever", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// == DELETE / HAS / CLEAR Endpoint Tests ==

#[tokio::test]
async fn test_delete_endpoint_success() {
    let app = create_test_app();

    send(&app, "PUT", "/set", Some(json!({"key": "delete_key", "value": "delete_value"}))).await;

    let del_response = send(&app, "DELETE", "/del/delete_key", None).await;
    assert_eq!(del_response.status(), StatusCode::OK);

    let get_response = send(&app, "GET", "/get/delete_key", None).await;
    assert_eq!(get_response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_missing_key_is_ok() {
    let app = create_test_app();

    let response = send(&app, "DELETE", "/del/nonexistent_key", None).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_has_endpoint() {
    let app = create_test_app();

    let missing = send(&app, "GET", "/has/k", None).await;
    assert_eq!(body_to_json(missing.into_body()).await["exists"], false);

    send(&app, "PUT", "/set", Some(json!({"key": "k", "value": null}))).await;

    let present = send(&app, "GET", "/has/k", None).await;
    assert_eq!(body_to_json(present.into_body()).await["exists"], true);
}

#[tokio::test]
async fn test_clear_endpoint_removes_everything() {
    let (app, _clock, store) = create_clocked_app();

    send(&app, "POST", "/add", Some(json!({"key": "key1", "value": 1}))).await;
    send(&app, "POST", "/add", Some(json!({"key": "key2", "value": 2}))).await;
    assert_eq!(store.len().await, 2);

    let response = send(&app, "POST", "/clear", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty().await);
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = send(&app, "GET", "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store"], "memory-collection");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_health_reports_unusable_store() {
    let options = docstore_cache::store::RealtimeDatabaseOptions::new("not a url", "cache");
    let context = Arc::new(StoreContext::new(StoreConfig::RealtimeDatabase(options)));
    let app = create_router(AppState::new(DocumentCache::new(context, CacheOptions::default())));

    let response = send(&app, "GET", "/health", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
