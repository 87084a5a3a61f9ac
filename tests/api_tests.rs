//! Integration tests for the upload session HTTP API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use upload_sessions::{
    remote::MemoryRemoteStore,
    routes::routes::routes,
    services::{
        session_store::SessionStore,
        upload_service::{UploadService, UploadSettings},
    },
    state::AppState,
};
use uuid::Uuid;

async fn test_router(expose_error_detail: bool) -> axum::Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    let store = SessionStore::new(Arc::new(pool));
    store.migrate().await.expect("Failed to apply schema");

    let uploads = UploadService::new(
        store,
        Arc::new(MemoryRemoteStore::new("media")),
        UploadSettings {
            key_prefix: "recordings".into(),
            part_size: 5 * 1024 * 1024,
            public_base_url: "https://media.s3.amazonaws.com".into(),
        },
    );
    routes().with_state(AppState::new(uploads, expose_error_detail))
}

/// Helper to make JSON requests.
async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

async fn create_session(router: &axum::Router, filename: &str) -> Value {
    let (status, body) = json_request(
        router,
        "POST",
        "/uploads",
        Some(json!({ "filename": filename, "content_type": "video/mp4", "user_id": "u-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn full_upload_scenario() {
    let router = test_router(false).await;

    let created = create_session(&router, "clip.mp4").await;
    assert_eq!(created["status"], "uploading");
    assert_eq!(created["parts"], json!([]));
    assert_eq!(created["owner_id"], "u-1");
    assert_eq!(created["bucket"], "media");
    assert_eq!(created["part_size"], 5 * 1024 * 1024);
    assert!(created["remote_handle"].as_str().is_some_and(|h| !h.is_empty()));
    assert!(created.get("remote_upload_id").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, auth) =
        json_request(&router, "POST", &format!("/uploads/{id}/parts/1/presign"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(auth["presigned_url"].as_str().unwrap().contains("partNumber=1"));
    assert_eq!(auth["expires_in"], 3600);

    let (status, ack) = json_request(
        &router,
        "PUT",
        &format!("/uploads/{id}/parts/1"),
        Some(json!({ "etag": "etag-a" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ok");

    let (status, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["parts"], json!([{ "part_number": 1, "etag": "etag-a" }]));

    let (status, done) = json_request(
        &router,
        "POST",
        &format!("/uploads/{id}/complete"),
        Some(json!({ "parts": [{ "part_number": 1, "etag": "etag-a" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(done["location"].as_str().is_some_and(|l| !l.is_empty()));

    let (_, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
    assert_eq!(view["status"], "completed");
}

#[tokio::test]
async fn abort_then_register_documents_permissive_behavior() {
    let router = test_router(false).await;
    let id = create_session(&router, "clip.mp4").await["id"]
        .as_str()
        .unwrap()
        .to_string();

    for _ in 0..2 {
        let (status, body) =
            json_request(&router, "POST", &format!("/uploads/{id}/abort"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "aborted" }));
    }

    let (status, _) = json_request(
        &router,
        "PUT",
        &format!("/uploads/{id}/parts/1"),
        Some(json!({ "content_identifier": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
    assert_eq!(view["status"], "aborted");
    assert_eq!(view["parts"][0]["etag"], "x");
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let router = test_router(false).await;
    let unknown = Uuid::new_v4();

    let requests = [
        ("GET", format!("/uploads/{unknown}"), None),
        ("POST", format!("/uploads/{unknown}/parts/1/presign"), None),
        (
            "PUT",
            format!("/uploads/{unknown}/parts/1"),
            Some(json!({ "etag": "e" })),
        ),
        (
            "POST",
            format!("/uploads/{unknown}/complete"),
            Some(json!({ "parts": [] })),
        ),
        ("POST", format!("/uploads/{unknown}/abort"), None),
        ("GET", "/uploads/not-a-uuid".to_string(), None),
        ("POST", "/uploads/42/abort".to_string(), None),
    ];

    for (method, uri, body) in requests {
        let (status, json) = json_request(&router, method, &uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(json["kind"], "not_found", "{method} {uri}");
    }
}

#[tokio::test]
async fn finalize_with_empty_parts_is_bad_request() {
    let router = test_router(false).await;
    let id = create_session(&router, "clip.mp4").await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = json_request(
        &router,
        "POST",
        &format!("/uploads/{id}/complete"),
        Some(json!({ "parts": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");

    let (_, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
    assert_eq!(view["status"], "uploading");
}

#[tokio::test]
async fn upstream_detail_follows_configuration() {
    for expose in [false, true] {
        let router = test_router(expose).await;
        let id = create_session(&router, "clip.mp4").await["id"]
            .as_str()
            .unwrap()
            .to_string();

        // Out-of-order parts are rejected by the store.
        let (status, body) = json_request(
            &router,
            "POST",
            &format!("/uploads/{id}/complete"),
            Some(json!({ "parts": [
                { "part_number": 2, "etag": "b" },
                { "part_number": 1, "etag": "a" }
            ] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "upstream_error");
        assert_eq!(body.get("detail").is_some(), expose);

        let (_, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
        assert_eq!(view["status"], "uploading");
    }
}

#[tokio::test]
async fn create_rejects_missing_filename() {
    let router = test_router(false).await;
    let (status, body) = json_request(
        &router,
        "POST",
        "/uploads",
        Some(json!({ "filename": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");
}

#[tokio::test]
async fn unknown_session_wins_over_malformed_input() {
    let router = test_router(false).await;
    let unknown = Uuid::new_v4();

    let requests = [
        ("PUT", format!("/uploads/{unknown}/parts/1"), Some(json!({}))),
        ("PUT", format!("/uploads/{unknown}/parts/abc"), Some(json!({ "etag": "e" }))),
        ("POST", format!("/uploads/{unknown}/parts/abc/presign"), None),
        ("POST", format!("/uploads/{unknown}/complete"), None),
        (
            "POST",
            format!("/uploads/{unknown}/complete"),
            Some(json!({ "parts": "nope" })),
        ),
    ];

    for (method, uri, body) in requests {
        let (status, json) = json_request(&router, method, &uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(json["kind"], "not_found", "{method} {uri}");
    }
}

#[tokio::test]
async fn malformed_input_is_a_structured_bad_request() {
    let router = test_router(false).await;

    let (status, body) = json_request(&router, "POST", "/uploads", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");
    assert_eq!(body["status"], 400);

    let id = create_session(&router, "clip.mp4").await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let requests = [
        ("PUT", format!("/uploads/{id}/parts/1"), Some(json!({}))),
        ("PUT", format!("/uploads/{id}/parts/1"), None),
        ("PUT", format!("/uploads/{id}/parts/abc"), Some(json!({ "etag": "e" }))),
        ("POST", format!("/uploads/{id}/parts/abc/presign"), None),
        ("POST", format!("/uploads/{id}/parts/99999999999/presign"), None),
        ("POST", format!("/uploads/{id}/complete"), None),
    ];

    for (method, uri, body) in requests {
        let (status, json) = json_request(&router, method, &uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(json["kind"], "invalid_argument", "{method} {uri}");
    }

    let (_, view) = json_request(&router, "GET", &format!("/uploads/{id}"), None).await;
    assert_eq!(view["status"], "uploading");
    assert_eq!(view["parts"], json!([]));
}

#[tokio::test]
async fn health_endpoints_respond() {
    let router = test_router(false).await;

    let (status, body) = json_request(&router, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = json_request(&router, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
}
