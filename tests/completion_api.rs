mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_test_app, get, post, seed_chat, send, sse_events, TestApp};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

async fn app_for(server: &MockServer) -> TestApp {
    build_test_app(&format!("{}{}", server.uri(), COMPLETIONS_PATH)).await
}

fn delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
    )
}

fn stream_body(fragments: &[&str]) -> String {
    let mut body: String = fragments.iter().map(|f| delta(f)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_stream(server: &MockServer, fragments: &[&str]) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(stream_body(fragments), "text/event-stream"))
        .expect(1)
        .mount(server)
        .await;
}

async fn stream(test: &TestApp, body: Value) -> (StatusCode, Vec<Value>) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat/stream")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(&test.app, request).await;
    (status, sse_events(&bytes))
}

fn write_history(test: &TestApp, chat: &str, history: Value) {
    std::fs::write(
        test.chat_path("nova", chat),
        serde_json::to_vec_pretty(&history).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn streamed_reply_is_relayed_and_committed() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;

    let (status, events) = stream(
        &test,
        json!({ "character_id": "nova", "chat_id": chat, "message": "Hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        events,
        vec![
            json!({ "type": "content", "content": "Hel" }),
            json!({ "type": "content", "content": "lo" }),
            json!({ "type": "done" }),
        ]
    );

    let (_, history) = get(&test.app, &format!("/api/chats/nova/{}", chat)).await;
    assert_eq!(
        history,
        json!([
            { "role": "user", "content": "Hi" },
            { "role": "assistant", "content": "Hello" }
        ])
    );
}

#[tokio::test]
async fn upstream_sees_system_history_and_user_message() {
    let server = MockServer::start().await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;
    write_history(&test, &chat, json!([{ "role": "user", "content": "Earlier" }]));

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({
            "model": "local-model",
            "stream": true,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": "Stay in character." },
                { "role": "user", "content": "Earlier" },
                { "role": "user", "content": "Now" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(stream_body(&["ok"]), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let (status, events) = stream(
        &test,
        json!({
            "character_id": "nova",
            "chat_id": chat.parse::<u64>().unwrap(),
            "message": "Now",
            "system_prompt": "Stay in character.",
            "llm_settings": { "temperature": 0.2 }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.last(), Some(&json!({ "type": "done" })));
}

#[tokio::test]
async fn regenerate_overwrites_reply_at_override_length() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;
    write_history(
        &test,
        &chat,
        json!([
            { "role": "user", "content": "a" },
            { "role": "assistant", "content": "b" },
            { "role": "user", "content": "c" },
            { "role": "assistant", "content": "old reply" }
        ]),
    );

    let (_, events) = stream(
        &test,
        json!({
            "character_id": "nova",
            "chat_id": chat,
            "message": "c",
            "history_override": [
                { "role": "user", "content": "a" },
                { "role": "assistant", "content": "b" },
                { "role": "user", "content": "c" }
            ]
        }),
    )
    .await;
    assert_eq!(events.last(), Some(&json!({ "type": "done" })));

    let (_, history) = get(&test.app, &format!("/api/chats/nova/{}", chat)).await;
    let history = history.as_array().unwrap().clone();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], json!({ "role": "assistant", "content": "Hello" }));
}

#[tokio::test]
async fn regenerate_appends_when_transcript_is_shorter() {
    let server = MockServer::start().await;
    mount_stream(&server, &["again"]).await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;
    let override_history = json!([
        { "role": "user", "content": "a" },
        { "role": "assistant", "content": "b" },
        { "role": "user", "content": "c" }
    ]);
    write_history(&test, &chat, override_history.clone());

    stream(
        &test,
        json!({
            "character_id": "nova",
            "chat_id": chat,
            "message": "c",
            "history_override": override_history
        }),
    )
    .await;

    let (_, history) = get(&test.app, &format!("/api/chats/nova/{}", chat)).await;
    let history = history.as_array().unwrap().clone();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], json!({ "role": "assistant", "content": "again" }));
}

#[tokio::test]
async fn upstream_failure_yields_single_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;
    let before = std::fs::read(test.chat_path("nova", &chat)).unwrap();

    let (status, events) = stream(
        &test,
        json!({ "character_id": "nova", "chat_id": chat, "message": "Hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert!(events[0]["content"].as_str().unwrap().contains("500"));
    assert_eq!(std::fs::read(test.chat_path("nova", &chat)).unwrap(), before);
}

#[tokio::test]
async fn stream_rejects_incomplete_requests_before_streaming() {
    let server = MockServer::start().await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;

    let (status, body) = post(
        &test.app,
        "/api/chat/stream",
        json!({ "character_id": "nova", "chat_id": chat }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Character ID, Chat ID, and message are required");

    let (status, _) = post(
        &test.app,
        "/api/chat/stream",
        json!({ "character_id": "ghost", "chat_id": chat, "message": "Hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &test.app,
        "/api/chat/stream",
        json!({ "character_id": "nova", "chat_id": "1", "message": "Hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn buffered_chat_returns_reply_and_commits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({ "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "Greetings." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;

    let (status, body) = post(
        &test.app,
        "/api/chat",
        json!({ "character_id": "nova", "chat_id": chat, "message": "Hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "reply": "Greetings." }));

    let (_, history) = get(&test.app, &format!("/api/chats/nova/{}", chat)).await;
    assert_eq!(
        history,
        json!([
            { "role": "user", "content": "Hello" },
            { "role": "assistant", "content": "Greetings." }
        ])
    );
}

#[tokio::test]
async fn buffered_chat_surfaces_upstream_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;

    let (status, body) = post(
        &test.app,
        "/api/chat",
        json!({ "character_id": "nova", "chat_id": chat, "message": "Hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "API Error: 503");

    let (_, history) = get(&test.app, &format!("/api/chats/nova/{}", chat)).await;
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn reply_is_saved_when_client_disconnects_mid_stream() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;
    let test = app_for(&server).await;
    let chat = seed_chat(&test.app, "Nova").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat/stream")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "character_id": "nova", "chat_id": chat, "message": "Hi" }).to_string(),
        ))
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap();
    assert!(first.is_data());
    drop(body);

    let mut history = Value::Null;
    for _ in 0..50 {
        history = get(&test.app, &format!("/api/chats/nova/{}", chat)).await.1;
        if history.as_array().map_or(false, |h| h.len() == 2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        history,
        json!([
            { "role": "user", "content": "Hi" },
            { "role": "assistant", "content": "Hello" }
        ])
    );
}
