//! # Gateway Integration Tests
//!
//! End-to-end tests through the axum router with a wiremock backend
//! serving canned SSE streams: streaming and aggregate modes, validation
//! and configuration errors, and signed-header authentication.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chat_conduit::{create_router, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

const HELLO_WORLD_SSE: &str =
    "event: content\ndata: Hello \n\nevent: content\ndata: world\n\nevent: done\n\n";

fn test_app(backend_url: String) -> Router {
    let mut config = Config::for_test();
    config.backend_url = backend_url;
    let state = AppState::new(config).unwrap();
    create_router(state)
}

fn signed_test_app(backend_url: String) -> Router {
    let mut config = Config::for_test();
    config.backend_url = backend_url;
    config.auth_scheme = "signed".to_string();
    config.backend_credential = Some("shared-signing-secret".to_string());
    config.device_id = "it-device".to_string();
    let state = AppState::new(config).unwrap();
    create_router(state)
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Pull the JSON payloads out of an SSE body, stopping at the sentinel.
fn data_frames(body: &str) -> (Vec<Value>, bool) {
    let mut frames = Vec::new();
    let mut saw_done = false;
    for line in body.lines() {
        if let Some(payload) = line.strip_prefix("data: ") {
            if payload == "[DONE]" {
                saw_done = true;
            } else if !payload.trim().is_empty() {
                frames.push(serde_json::from_str(payload).unwrap());
            }
        }
    }
    (frames, saw_done)
}

async fn mock_backend(sse_body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn streaming_end_to_end() {
    let server = mock_backend(HELLO_WORLD_SSE).await;
    let app = test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "Say hello"}],
            "stream": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/event-stream"));

    let body = body_string(response).await;
    let (frames, saw_done) = data_frames(&body);
    assert!(saw_done, "missing [DONE] sentinel: {}", body);

    // role-init, two deltas, finish
    assert_eq!(frames[0]["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(frames[1]["choices"][0]["delta"]["content"], "Hello ");
    assert_eq!(frames[2]["choices"][0]["delta"]["content"], "world");
    let finish = frames.last().unwrap();
    assert_eq!(finish["choices"][0]["finish_reason"], "stop");

    // every frame carries the canonical shape
    for frame in &frames {
        assert_eq!(frame["object"], "chat.completion.chunk");
        assert_eq!(frame["model"], "standard");
        assert!(frame["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }
}

#[tokio::test]
async fn aggregate_end_to_end() {
    let server = mock_backend(HELLO_WORLD_SSE).await;
    let app = test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "Say hello"}],
            "stream": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();

    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert!(body["usage"]["total_tokens"].is_number());
}

#[tokio::test]
async fn missing_model_is_rejected_before_any_backend_call() {
    // No mock backend mounted: a backend call would fail the test anyway.
    let app = test_app("http://127.0.0.1:1/api/chat".to_string());

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let app = test_app("http://127.0.0.1:1/api/chat".to_string());

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": []
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_provider_is_a_configuration_error() {
    let app = test_app("http://127.0.0.1:1/api/chat".to_string());

    let response = app
        .oneshot(chat_request(json!({
            "model": "nonexistent/model",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "configuration_error");
}

#[tokio::test]
async fn backend_error_status_is_forwarded_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    let app = test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    // Reported before any client-visible chunk: a clean JSON error, not a
    // half-open event stream.
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "upstream_error");
}

#[tokio::test]
async fn backend_error_event_still_ends_with_sentinel() {
    let sse = "event: content\ndata: partial\n\nevent: error\ndata: backend gave up\n\n";
    let server = mock_backend(sse).await;
    let app = test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    let (frames, saw_done) = data_frames(&body);
    assert!(saw_done);

    let error_frames: Vec<_> = frames.iter().filter(|f| !f["error"].is_null()).collect();
    assert_eq!(error_frames.len(), 1);
    assert_eq!(error_frames[0]["error"]["message"], "backend gave up");

    let finish = frames.last().unwrap();
    assert_eq!(finish["choices"][0]["finish_reason"], "error");
}

#[tokio::test]
async fn signed_provider_sends_signed_header_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header_exists("nonce"))
        .and(header_exists("timestamp"))
        .and(header_exists("sign"))
        .and(header("device-id", "it-device"))
        .and(header("os-type", "linux"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(HELLO_WORLD_SSE, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let app = signed_test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "sign me"}],
            "stream": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
}

#[tokio::test]
async fn sources_are_forwarded_once_as_function_call_payload() {
    let sse = "event: sources\ndata: [{\"title\": \"doc\", \"url\": \"https://a\"}]\n\n\
               event: content\ndata: cited answer\n\nevent: done\n\n";
    let server = mock_backend(sse).await;
    let app = test_app(format!("{}/api/chat", server.uri()));

    let response = app
        .oneshot(chat_request(json!({
            "model": "standard",
            "messages": [{"role": "user", "content": "cite"}],
            "stream": true
        })))
        .await
        .unwrap();

    let body = body_string(response).await;
    let (frames, _) = data_frames(&body);

    let call_frames: Vec<_> = frames
        .iter()
        .filter(|f| !f["choices"][0]["delta"]["function_call"].is_null())
        .collect();
    assert_eq!(call_frames.len(), 1);
    assert_eq!(
        call_frames[0]["choices"][0]["delta"]["function_call"]["name"],
        "sources"
    );
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = test_app("http://127.0.0.1:1/api/chat".to_string());

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "chatconduit");
}
