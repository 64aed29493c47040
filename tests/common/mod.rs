#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use character_chat::{build_app, AppConfig, AppState};

/// A router over a throwaway data directory. `dir` must outlive the test.
pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn chat_path(&self, character_id: &str, chat_id: &str) -> PathBuf {
        self.state
            .config
            .chats_dir()
            .join(character_id)
            .join(format!("{}.json", chat_id))
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.state.config.characters_dir()
    }
}

/// Build the full application with the completion endpoint pointed at `llm_api_url`.
pub async fn build_test_app(llm_api_url: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::with_data_dir(dir.path().join("data"));
    config.static_dir = dir.path().to_path_buf();
    config.llm_api_url = llm_api_url.to_string();
    config.ensure_data_dirs().await.unwrap();

    let state = Arc::new(AppState::new(config).unwrap());
    TestApp {
        app: build_app(state.clone()),
        state,
        dir,
    }
}

/// App whose completion endpoint is never reached.
pub async fn build_offline_app() -> TestApp {
    build_test_app("http://127.0.0.1:9/v1/chat/completions").await
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

pub async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let (status, bytes) = send(app, request).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send_json(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, Method::POST, uri, Some(body)).await
}

/// Creates a character and one chat for it, returning the chat id.
pub async fn seed_chat(app: &Router, name: &str) -> String {
    let (status, _) = post(
        app,
        "/api/characters",
        serde_json::json!({ "name": name, "description": "A test persona." }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let id = character_chat::utils::slugify(name);
    let (status, body) = send_json(app, Method::POST, &format!("/api/characters/{}/chats", id), None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["chat_id"].as_str().unwrap().to_string()
}

/// JSON payloads of every `data:` line in an SSE body.
pub fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
