//! HTTP adapter smoke tests, driven in-process through the router.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{numbered_text, FailingEmbedder, HashEmbedder};
use semantic_memory::config::{FractalConfig, StoreConfig};
use semantic_memory::services::memory::{router, MemoryServerState};
use semantic_memory::{EmbeddingProvider, SemanticMemory};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn app(embedder: Arc<dyn EmbeddingProvider>) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        max_entries: 3,
        ..StoreConfig::at(dir.path().join("store.json"))
    };
    let memory = SemanticMemory::open(config, FractalConfig::default(), embedder).await;
    (router(Arc::new(MemoryServerState { memory })), dir)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn test_store_endpoints() {
    let (app, _dir) = app(Arc::new(HashEmbedder)).await;

    let (status, body) = call(
        &app,
        "POST",
        "/store/index",
        Some(json!({
            "text": "planner picked the cheap route",
            "metadata": { "agent": "planner" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "indexed");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", "/store/index", Some(json!({ "text": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) =
        call(&app, "POST", "/store/search", Some(json!({ "query": "route", "topK": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["id"], id.as_str());
    assert_eq!(body["results"][0]["metadata"]["agent"], "planner");

    let (status, body) = call(&app, "GET", "/store/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalEntries"], 1);
    assert_eq!(body["maxEntries"], 3);
    assert_eq!(body["embedModel"], "hash-997");

    let (status, body) = call(&app, "POST", "/store/persist", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_fractal_endpoints() {
    let (app, _dir) = app(Arc::new(HashEmbedder)).await;

    let (status, body) = call(
        &app,
        "POST",
        "/fractal/ingest",
        Some(json!({ "sessionId": "sess-1", "text": numbered_text(2000) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "indexed");
    assert_eq!(body["leafCount"], 26);
    assert_eq!(body["embeddingsGenerated"], 26);
    assert_eq!(body["totalNodes"], 59);

    let (status, body) = call(
        &app,
        "POST",
        "/fractal/query",
        Some(json!({ "session_id": "sess-1", "query": "w10", "top_k": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hits = body.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    for hit in hits {
        assert!(hit["start"].as_u64().unwrap() < hit["end"].as_u64().unwrap());
        assert!(hit["level"].is_i64());
    }

    let (status, body) = call(&app, "GET", "/fractal/sessions/sess-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasTree"], true);
    assert_eq!(body["summary"]["leafCount"], 26);

    let (_, body) = call(&app, "GET", "/fractal/sessions/nobody", None).await;
    assert_eq!(body["hasTree"], false);
    assert!(body["summary"].is_null());

    let (status, body) = call(
        &app,
        "POST",
        "/fractal/ingest",
        Some(json!({ "sessionId": "sess-2", "text": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_provider_outage_maps_to_unavailable() {
    let (app, _dir) = app(Arc::new(FailingEmbedder)).await;

    let (status, body) = call(&app, "POST", "/store/index", Some(json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let search = Some(json!({ "query": "hello" }));
    let (status, body) = call(&app, "POST", "/store/search", search).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_storage_failure_maps_to_server_error() {
    let (app, dir) = app(Arc::new(HashEmbedder)).await;
    std::fs::create_dir_all(dir.path().join("store.json").join("blocker")).unwrap();

    let (status, body) = call(&app, "POST", "/store/index", Some(json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(body["id"].is_null());

    let (status, body) = call(&app, "GET", "/store/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalEntries"], 0);
}
