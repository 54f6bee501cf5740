//! Exercises the control-plane REST surface (src/api/mod.rs) end to end
//! through the real `axum::Router`, rather than calling
//! `DecisionStore` methods directly - this is what actually catches a
//! handler forgetting to translate between the REST DTOs' plaintext
//! bodies and the store's hex-encoded ones.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mitm_proxy::api::{router, ApiState};
use mitm_proxy::store::memory_store::MemoryStore;
use mitm_proxy::store::{DecisionStore, RequestRecord, Status};
use tower::ServiceExt;

fn pending_request(id: &str) -> RequestRecord {
    RequestRecord {
        id: id.to_string(),
        hostname: "example.test".to_string(),
        method: "POST".to_string(),
        path: "/submit".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: hex::encode(b"original"),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
        status: Status::Pending,
    }
}

#[tokio::test]
async fn allow_request_with_plaintext_body_hex_encodes_before_storing() {
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    store.save_request(pending_request("req-1")).await.unwrap();
    let app = router(ApiState { store: store.clone() });

    let req = Request::builder()
        .method("POST")
        .uri("/api/requests/req-1/allow")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"body":"replaced"}"#))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record = store.get_request("req-1").await.unwrap().expect("record still present");
    assert_eq!(record.status, Status::Allowed);
    // the REST body is plaintext; the store keeps bodies hex-encoded
    // (spec.md §4.3), so the handler must encode it on the way in.
    assert_eq!(record.body, hex::encode(b"replaced"));
    assert_eq!(
        hex::decode(&record.body).unwrap(),
        b"replaced".to_vec(),
        "edit must decode back to the plaintext the client sent"
    );
}

#[tokio::test]
async fn allow_request_without_body_leaves_stored_body_untouched() {
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    store.save_request(pending_request("req-2")).await.unwrap();
    let app = router(ApiState { store: store.clone() });

    let req = Request::builder()
        .method("POST")
        .uri("/api/requests/req-2/allow")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record = store.get_request("req-2").await.unwrap().expect("record still present");
    assert_eq!(record.status, Status::Allowed);
    assert_eq!(record.body, hex::encode(b"original"));
}

#[tokio::test]
async fn get_request_returns_404_for_unknown_id() {
    let store: Arc<dyn DecisionStore> = Arc::new(MemoryStore::new());
    let app = router(ApiState { store });

    let req = Request::builder()
        .method("GET")
        .uri("/api/requests/missing")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}
