//! Integration test: Gemini client and session against a local generateContent stand-in.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use relay::llm::{ChatProvider, GeminiClient, ProviderError};
use relay::session::{Session, Turn, SEED_ACKNOWLEDGMENT};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KEY: &str = "test-key";

#[derive(Clone, Default)]
struct MockGemini {
    requests: Arc<Mutex<Vec<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) == Some(KEY)
}

fn denied() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": { "code": 403, "message": "API key not valid" } })),
    )
}

async fn get_model(Path(model): Path<String>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return denied();
    }
    if model != "gemini-test" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "model not found" } })),
        );
    }
    (StatusCode::OK, Json(json!({ "name": "models/gemini-test" })))
}

/// `POST /v1beta/models/{model}:generateContent`. The route captures "gemini-test:generateContent".
async fn generate(
    State(mock): State<MockGemini>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return denied();
    }
    mock.requests.lock().unwrap().push(body.clone());
    if call != "gemini-test:generateContent" {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }
    let last = body["contents"]
        .as_array()
        .and_then(|c| c.last())
        .and_then(|c| c["parts"][0]["text"].as_str())
        .unwrap_or_default()
        .to_string();
    match last.as_str() {
        "explode" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": 500, "message": "internal" } })),
        ),
        "silence" => (StatusCode::OK, Json(json!({ "candidates": [] }))),
        "stall" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, Json(json!({})))
        }
        _ => (
            StatusCode::OK,
            Json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": format!("you said {}", last) }] },
                    "finishReason": "STOP"
                }]
            })),
        ),
    }
}

async fn start_mock() -> (String, MockGemini) {
    let mock = MockGemini::default();
    let app = Router::new()
        .route("/v1beta/models/:model", get(get_model).post(generate))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/v1beta", addr), mock)
}

#[tokio::test]
async fn check_model_accepts_known_model() {
    let (base, _) = start_mock().await;
    let client = GeminiClient::new(KEY, Some(base));
    client.check_model("gemini-test").await.expect("model ok");
    client.check_model("models/gemini-test").await.expect("prefixed model ok");
}

#[tokio::test]
async fn check_model_rejects_unknown_model_and_bad_key() {
    let (base, _) = start_mock().await;
    let client = GeminiClient::new(KEY, Some(base.clone()));
    let err = client.check_model("gemini-nope").await.unwrap_err();
    assert!(matches!(err, ProviderError::Api { status: 404, .. }));

    let client = GeminiClient::new("wrong", Some(base));
    let err = client.check_model("gemini-test").await.unwrap_err();
    assert!(matches!(err, ProviderError::Api { status: 403, .. }));
}

#[tokio::test]
async fn session_open_fails_on_bad_credentials() {
    let (base, _) = start_mock().await;
    let client = Arc::new(GeminiClient::new("wrong", Some(base)));
    assert!(Session::open(client, "gemini-test", "p", "s").await.is_err());
}

#[tokio::test]
async fn exchange_sends_seeded_history() {
    let (base, mock) = start_mock().await;
    let client = Arc::new(GeminiClient::new(KEY, Some(base)));
    let mut session = Session::open(client, "gemini-test", "Talk like a pirate.", "s")
        .await
        .expect("open");

    let reply = session
        .send_turn("hello", Duration::from_secs(5))
        .await
        .expect("reply");
    assert_eq!(reply, "you said hello");
    assert_eq!(session.history()[3], Turn::model("you said hello"));

    let requests = mock.requests.lock().unwrap().clone();
    assert_eq!(
        requests[0],
        json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "Talk like a pirate." }] },
                { "role": "model", "parts": [{ "text": SEED_ACKNOWLEDGMENT }] },
                { "role": "user", "parts": [{ "text": "hello" }] }
            ]
        })
    );
}

#[tokio::test]
async fn failed_exchanges_leave_history_untouched() {
    let (base, _) = start_mock().await;
    let client = Arc::new(GeminiClient::new(KEY, Some(base)));
    let mut session = Session::open(client, "gemini-test", "p", "s").await.expect("open");

    for text in ["explode", "silence"] {
        assert!(session.send_turn(text, Duration::from_secs(5)).await.is_err());
        assert_eq!(session.len(), 2);
    }
    let err = session
        .send_turn("stall", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no reply within"));
    assert_eq!(session.len(), 2);

    session
        .send_turn("again", Duration::from_secs(5))
        .await
        .expect("recovers");
    assert_eq!(session.len(), 4);
}
