//! HTTP API tests driven through the router with `tower::ServiceExt`.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use moss_llmd::config::Config;
use moss_llmd::llama::stub::StubRuntime;
use moss_llmd::server::api::{build_router, AppState};

fn app(runtime: StubRuntime, models_dir: &Path) -> Router {
    let mut config = Config::default();
    config.model.models_dir = models_dir.to_path_buf();
    let state = Arc::new(AppState::new(Arc::new(runtime), Arc::new(config)));
    build_router(state)
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_json(app: &Router, uri: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_list_models_creates_directory_and_reports_files() {
    let tmp = tempfile::tempdir().unwrap();
    let models_dir = tmp.path().join("models");
    let app = app(StubRuntime::new(), &models_dir);

    // Fresh install: directory is created, catalog is empty.
    let body = get_json(&app, "/v1/models").await;
    assert_eq!(body["models"], json!([]));
    assert!(models_dir.is_dir());

    std::fs::write(models_dir.join("a.gguf"), b"xxxx").unwrap();
    std::fs::write(models_dir.join("skip.txt"), b"x").unwrap();

    let body = get_json(&app, "/v1/models").await;
    assert_eq!(body["models"].as_array().unwrap().len(), 1);
    assert_eq!(body["models"][0]["name"], "a.gguf");
    assert_eq!(body["models"][0]["size"], 4);
}

#[tokio::test]
async fn test_load_missing_file_reports_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(StubRuntime::new(), tmp.path());

    let body = post_json(&app, "/v1/models/load", json!({"path": "/models/x.gguf"})).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let status = get_json(&app, "/v1/models/status").await;
    assert_eq!(status["is_loading"], json!(false));
    assert_eq!(status["is_loaded"], json!(false));
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let tmp = tempfile::tempdir().unwrap();
    let model_path = tmp.path().join("test.gguf");
    std::fs::write(&model_path, b"gguf").unwrap();

    let app = app(
        StubRuntime::new().with_reply("hello").with_usage(2, 1),
        tmp.path(),
    );

    // Load.
    let body = post_json(
        &app,
        "/v1/models/load",
        json!({"path": model_path.to_str().unwrap()}),
    )
    .await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["model"], "test.gguf");

    let status = get_json(&app, "/v1/models/status").await;
    assert_eq!(status["is_loaded"], json!(true));

    let info = get_json(&app, "/v1/models/info").await;
    assert_eq!(info["success"], json!(true));
    assert_eq!(info["info"]["name"], "test.gguf");
    assert_eq!(info["info"]["context_size"], 4096);

    // Loading again without unloading is refused.
    let body = post_json(
        &app,
        "/v1/models/load",
        json!({"path": model_path.to_str().unwrap()}),
    )
    .await;
    assert_eq!(body["success"], json!(false));

    // Chat.
    let body = post_json(&app, "/v1/chat", json!({"message": "hi"})).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["response"], "hello");
    assert_eq!(body["stats"]["prompt_tokens"], 2);
    assert_eq!(body["stats"]["completion_tokens"], 1);
    assert_eq!(body["stats"]["total_tokens"], 3);

    // Session aggregates follow the turn.
    let stats = get_json(&app, "/v1/chat/stats").await;
    assert_eq!(stats["total_messages"], 1);
    assert_eq!(stats["total_tokens"], 3);

    let body = post_json(&app, "/v1/chat/reset", json!({})).await;
    assert_eq!(body["success"], json!(true));
    let stats = get_json(&app, "/v1/chat/stats").await;
    assert_eq!(stats["total_messages"], 0);

    // Unload, twice (idempotent).
    let body = post_json(&app, "/v1/models/unload", json!({})).await;
    assert_eq!(body["success"], json!(true));
    let body = post_json(&app, "/v1/models/unload", json!({})).await;
    assert_eq!(body["success"], json!(true));

    let status = get_json(&app, "/v1/models/status").await;
    assert_eq!(status["is_loaded"], json!(false));

    // Chat without a model degrades to a failure body, not a fault.
    let body = post_json(&app, "/v1/chat", json!({"message": "hi"})).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("No model"));
}

#[tokio::test]
async fn test_models_directory_and_health() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(StubRuntime::new(), tmp.path());

    let body = get_json(&app, "/v1/models/directory").await;
    assert_eq!(body["directory"], tmp.path().display().to_string());

    let health = get_json(&app, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model"]["is_loaded"], json!(false));
}
