//! Integration tests for chat-relay HTTP endpoints
//!
//! Every test serves the real router on an ephemeral port and points it at mock
//! local and cloud backends, also served on ephemeral ports. The mocks count hits
//! and keep the bodies they received so tests can check what reached upstream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use chat_relay::Config;
use chat_relay::ratelimit::RateLimiter;
use chat_relay::server::AppState;

/* --- harness --------------------------------------------------------------------------------- */

/// Hit counter plus the JSON bodies a mock endpoint received
#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    fn record(&self, body: Value) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body);
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().expect("no body recorded")
    }
}

/// One server-sent event as seen by the client
#[derive(Debug, PartialEq)]
struct SseEvent {
    kind: String,
    data: Value,
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn serve_relay(config: Config, limiter: RateLimiter) -> String {
    let state = AppState::with_rate_limiter(config, limiter).unwrap();
    let app = chat_relay::build_router(Arc::new(state)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

fn relay_config(local_host: &str) -> Config {
    let mut config = Config::default();
    config.local.host = local_host.to_string();
    config.rate_limit.window_ms = 0;
    config
}

fn ndjson(lines: &[Value]) -> Response {
    let body: String = lines.iter().map(|line| format!("{}\n", line)).collect();
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

/// Mock local service: `/api/chat` answers `chat`, `/api/generate` answers `generate`
fn mock_local(
    chat: Recorder,
    chat_reply: fn(&Value) -> Response,
    generate: Recorder,
    generate_reply: fn(&Value) -> Response,
) -> Router {
    Router::new()
        .route(
            "/api/chat",
            post(move |Json(body): Json<Value>| async move {
                let reply = chat_reply(&body);
                chat.record(body);
                reply
            }),
        )
        .route(
            "/api/generate",
            post(move |Json(body): Json<Value>| async move {
                let reply = generate_reply(&body);
                generate.record(body);
                reply
            }),
        )
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({ "models": [{ "name": "errl-ai" }, { "name": "llama3" }] }))
            }),
        )
}

/// Local mock that records only chat hits
fn chat_local(chat: Recorder) -> Router {
    mock_local(chat, streamed_chat, Recorder::default(), streamed_generate)
}

/// Local mock whose hits nobody inspects
fn idle_local() -> Router {
    mock_local(Recorder::default(), streamed_chat, Recorder::default(), streamed_generate)
}

fn not_found(_: &Value) -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

fn streamed_chat(body: &Value) -> Response {
    if body["stream"] == json!(false) {
        return Json(json!({
            "model": "errl-ai",
            "message": { "role": "assistant", "content": "Hello there" },
            "done": true
        }))
        .into_response();
    }
    ndjson(&[
        json!({ "message": { "role": "assistant", "content": "Hel" }, "done": false }),
        json!({ "message": { "role": "assistant", "content": "lo" }, "done": false }),
        json!({ "message": { "role": "assistant", "content": "" }, "done": true }),
    ])
}

fn streamed_generate(_: &Value) -> Response {
    ndjson(&[
        json!({ "response": "Hi", "done": false }),
        json!({ "response": "!", "done": true }),
    ])
}

fn failing_generate(_: &Value) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "model 'nope' not found").into_response()
}

/// Mock cloud API capturing the request body and the `key` query parameter
fn mock_cloud(recorder: Recorder, keys: Arc<Mutex<Vec<String>>>) -> Router {
    Router::new().route(
        "/v1beta/models/{*rest}",
        post(
            move |Query(query): Query<HashMap<String, String>>,
                  Json(body): Json<Value>| async move {
                recorder.record(body);
                keys.lock().unwrap().extend(query.get("key").cloned());
                Json(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{ "text": "Bon" }, { "text": "jour" }]
                        }
                    }]
                }))
            },
        ),
    )
}

async fn post_chat(relay: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new().post(format!("{}/v1/chat", relay)).json(&body).send().await.unwrap()
}

/// Parse an event-stream body, skipping comment lines
async fn get_json(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

fn parse_events(text: &str) -> anyhow::Result<Vec<SseEvent>> {
    let mut events = Vec::new();
    for block in text.split("\n\n") {
        let mut kind = None;
        let mut data = None;
        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                kind = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data = Some(
                    serde_json::from_str(rest.trim())
                        .with_context(|| format!("data line is not JSON: {}", rest))?,
                );
            }
        }
        if let (Some(kind), Some(data)) = (kind, data) {
            events.push(SseEvent { kind, data });
        }
    }
    Ok(events)
}

async fn read_events(response: reqwest::Response) -> Vec<SseEvent> {
    parse_events(&response.text().await.unwrap()).unwrap()
}

fn event(kind: &str, data: Value) -> SseEvent {
    SseEvent { kind: kind.to_string(), data }
}

/* --- chat ------------------------------------------------------------------------------------ */

/// An empty conversation is rejected before any backend is contacted
#[tokio::test]
async fn test_empty_messages_rejected_without_backend_contact() {
    let chat = Recorder::default();
    let generate = Recorder::default();
    let local =
        serve(mock_local(chat.clone(), streamed_chat, generate.clone(), streamed_generate)).await;
    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;

    for body in [json!({ "messages": [] }), json!({ "model": "errl-ai" })] {
        let response = post_chat(&relay, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "messages array required" }));
    }

    assert_eq!(chat.hits() + generate.hits(), 0);
}

/// Incremental records arrive as meta, tokens in order, then one done
#[tokio::test]
async fn test_local_stream_event_order() {
    let chat = Recorder::default();
    let local = serve(chat_local(chat.clone())).await;
    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({ "messages": [{ "role": "user", "content": "hello" }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            event("meta", json!({ "model": "errl-ai" })),
            event("token", json!({ "token": "Hel" })),
            event("token", json!({ "token": "lo" })),
            event("done", json!({ "done": true })),
        ]
    );

    let sent = chat.last_body();
    assert_eq!(sent["model"], "errl-ai");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["messages"], json!([{ "role": "user", "content": "hello" }]));
    assert_eq!(sent["options"], json!({ "num_ctx": 1024, "num_predict": 128 }));
}

/// A 404 from the chat endpoint is retried once against the legacy endpoint
#[tokio::test]
async fn test_fallback_to_generate_on_not_found() {
    let chat = Recorder::default();
    let generate = Recorder::default();
    let local =
        serve(mock_local(chat.clone(), not_found, generate.clone(), streamed_generate)).await;
    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({
            "model": "llama3",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" }
            ]
        }),
    )
    .await;

    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            event("meta", json!({ "model": "llama3" })),
            event("token", json!({ "token": "Hi" })),
            event("token", json!({ "token": "!" })),
            event("done", json!({ "done": true })),
        ]
    );

    assert_eq!(chat.hits(), 1);
    assert_eq!(generate.hits(), 1);
    let sent = generate.last_body();
    assert_eq!(sent["prompt"], "system: be brief\nuser: hello");
    assert_eq!(sent["model"], "llama3");
    assert_eq!(sent["stream"], true);
}

/// When the fallback also fails the client sees meta then exactly one error
#[tokio::test]
async fn test_failed_fallback_yields_single_error() {
    let chat = Recorder::default();
    let generate = Recorder::default();
    let local =
        serve(mock_local(chat.clone(), not_found, generate.clone(), failing_generate)).await;
    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;

    let response =
        post_chat(&relay, json!({ "messages": [{ "role": "user", "content": "hi" }] })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_events(response).await;
    assert_eq!(events.len(), 2, "unexpected events: {:?}", events);
    assert_eq!(events[0], event("meta", json!({ "model": "errl-ai" })));
    assert_eq!(events[1].kind, "error");
    let message = events[1].data["error"].as_str().unwrap();
    assert!(message.contains("ollama upstream failed: 500"), "got: {}", message);
    assert!(message.contains("not found"), "got: {}", message);

    assert_eq!(chat.hits(), 1);
    assert_eq!(generate.hits(), 1);
}

/// `stream: false` answers with one JSON body carrying the raw backend reply
#[tokio::test]
async fn test_non_streaming_local_completion() {
    let chat = Recorder::default();
    let local = serve(chat_local(chat.clone())).await;
    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({ "stream": false, "messages": [{ "role": "user", "content": "hello" }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["model"], "errl-ai");
    assert_eq!(body["content"], "Hello there");
    assert_eq!(body["raw"]["done"], true);
    assert_eq!(chat.last_body()["stream"], false);
}

/// A backend that outlives the deadline surfaces as a 502 timeout
#[tokio::test]
async fn test_non_streaming_timeout_is_bad_gateway() {
    let slow = Router::new().route(
        "/api/chat",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "message": { "content": "late" }, "done": true }))
        }),
    );
    let local = serve(slow).await;
    let mut config = relay_config(&local);
    config.local.timeout_ms = 200;
    let relay = serve_relay(config, RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({ "stream": false, "messages": [{ "role": "user", "content": "hello" }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream timed out after 200ms");
}

/// A cloud model without a credential is a configuration error, no call made
#[tokio::test]
async fn test_cloud_without_key_is_configuration_error() {
    let recorder = Recorder::default();
    let cloud = serve(mock_cloud(recorder.clone(), Arc::default())).await;
    let mut config = relay_config("http://127.0.0.1:9");
    config.cloud.api_base = format!("{}/v1beta", cloud);
    let relay = serve_relay(config, RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({ "model": "gemini:", "messages": [{ "role": "user", "content": "hi" }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
    assert_eq!(recorder.hits(), 0);
}

/// The single-shot cloud answer is presented with the same events as a local stream
#[tokio::test]
async fn test_cloud_stream_uses_uniform_events() {
    let recorder = Recorder::default();
    let keys = Arc::new(Mutex::new(Vec::new()));
    let cloud = serve(mock_cloud(recorder.clone(), keys.clone())).await;

    let mut config = relay_config("http://127.0.0.1:9");
    config.cloud.api_key = Some("test-key".to_string());
    config.cloud.api_base = format!("{}/v1beta", cloud);
    let relay = serve_relay(config, RateLimiter::disabled()).await;

    let response = post_chat(
        &relay,
        json!({
            "model": "gemini:",
            "messages": [
                { "role": "user", "content": "hello" },
                { "role": "assistant", "content": "hi" },
                { "role": "user", "content": "in french?" }
            ]
        }),
    )
    .await;

    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            event("meta", json!({ "model": "gemini:gemini-2.0-flash" })),
            event("token", json!({ "token": "Bonjour" })),
            event("done", json!({ "done": true })),
        ]
    );

    assert_eq!(recorder.hits(), 1);
    assert_eq!(keys.lock().unwrap().as_slice(), ["test-key"]);
    let sent = recorder.last_body();
    assert_eq!(
        sent["contents"][0]["parts"][0]["text"],
        "user: hello\nassistant: hi\nuser: in french?"
    );
    assert_eq!(sent["generationConfig"]["maxOutputTokens"], 128);
}

/// The limiter gates chat routes and reports when to come back
#[tokio::test]
async fn test_rate_limit_denies_with_retry_after() {
    let relay = serve_relay(relay_config("http://127.0.0.1:9"), RateLimiter::new(60_000, 2)).await;

    for _ in 0..2 {
        let response = post_chat(&relay, json!({ "messages": [] })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = post_chat(&relay, json!({ "messages": [] })).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 =
        response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");

    // non-chat routes are not counted
    let health = reqwest::get(format!("{}/", relay)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

/* --- models and health ---------------------------------------------------------------------- */

/// The cloud model is listed first when its credential is configured
#[tokio::test]
async fn test_models_lists_cloud_first() {
    let local = serve(idle_local()).await;
    let mut config = relay_config(&local);
    config.cloud.api_key = Some("test-key".to_string());
    let relay = serve_relay(config, RateLimiter::disabled()).await;

    let body = get_json(&format!("{}/v1/models", relay)).await;
    assert_eq!(
        body["models"],
        json!([{ "name": "gemini:gemini-2.0-flash" }, { "name": "errl-ai" }, { "name": "llama3" }])
    );
    assert_eq!(body["default"], "errl-ai");
}

/// Listing fails with 502 when the local service is down
#[tokio::test]
async fn test_models_unreachable_backend() {
    let relay = serve_relay(relay_config("http://127.0.0.1:9"), RateLimiter::disabled()).await;

    let response = reqwest::get(format!("{}/v1/models", relay)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

/// Health answers ok in both cases and reports whether the backend answered
#[tokio::test]
async fn test_health_reports_backend_reachability() {
    let local = serve(idle_local()).await;

    let relay = serve_relay(relay_config(&local), RateLimiter::disabled()).await;
    let body = get_json(&format!("{}/health", relay)).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["service"], "chat-relay");
    assert_eq!(body["ollamaHost"], local);
    assert_eq!(body["localBackend"], "reachable");
    assert!(body["timestamp"].is_string());

    let relay = serve_relay(relay_config("http://127.0.0.1:9"), RateLimiter::disabled()).await;
    let body = get_json(&format!("{}/health", relay)).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["localBackend"], "unreachable");
}

/// CORS preflight is answered for allowed origins only
#[tokio::test]
async fn test_cors_allow_list() {
    let mut config = relay_config("http://127.0.0.1:9");
    config.server.allowed_origins = vec!["https://chat.example".to_string()];
    let relay = serve_relay(config, RateLimiter::disabled()).await;

    let client = reqwest::Client::new();
    let preflight = |origin: &'static str| {
        client
            .request(reqwest::Method::OPTIONS, format!("{}/v1/chat", relay))
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .send()
    };

    let allowed = preflight("https://chat.example").await.unwrap();
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://chat.example");
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let denied = preflight("https://evil.example").await.unwrap();
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
