//!
//! HTTP server implementation and request handlers.
//!
//! Orchestrates one chat request: validation, backend classification, then either
//! the non-streaming answer or a push-event stream. Also serves the index, health
//! and model-listing endpoints.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use futures::Stream;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::protocol::{ChatCompletion, ChatRequest, ProxyEvent};
use crate::provider::{ChatBackend, CloudBackend, LocalBackend};
use crate::ratelimit::RateLimiter;
use crate::relay::{self, FRAME_CHANNEL_CAPACITY, Frame};
use crate::router::{self, BackendKind, CLOUD_MODEL_PREFIX, Route};
use crate::upstream::{Deadline, UpstreamClient};

/* --- constants ------------------------------------------------------------------------------ */

/** service name reported by the index and health endpoints */
const SERVICE_NAME: &str = "chat-relay";

/** upper bound for the health probe */
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/* --- types ----------------------------------------------------------------------------------- */

///
/// Shared application state, constructed once at startup.
pub struct AppState {
    /** effective configuration */
    pub config: Config,
    /** local incremental backend */
    pub local: Arc<LocalBackend>,
    /** cloud single-shot backend */
    pub cloud: Arc<CloudBackend>,
    /** per-client request gate */
    pub rate_limiter: Arc<RateLimiter>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create application state with a limiter built from the configuration.
    ///
    /// # Returns
    ///  * Application state with initialized dependencies
    ///  * `ProxyError::Http` if the HTTP client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        let limiter = RateLimiter::from_config(&config.rate_limit);
        Self::with_rate_limiter(config, limiter)
    }

    ///
    /// Create application state around an existing limiter.
    pub fn with_rate_limiter(config: Config, rate_limiter: RateLimiter) -> Result<Self> {
        let client = UpstreamClient::new()?;
        let local = Arc::new(LocalBackend::new(&config.local, client.clone()));
        let cloud = Arc::new(CloudBackend::new(&config, client));

        Ok(Self { config, local, cloud, rate_limiter: Arc::new(rate_limiter) })
    }

    fn backend(&self, kind: BackendKind) -> &dyn ChatBackend {
        match kind {
            BackendKind::Local => self.local.as_ref(),
            BackendKind::Cloud => self.cloud.as_ref(),
        }
    }
}

///
/// Handle the chat endpoint.
///
/// Validates before any backend contact, then answers with `{model, content, raw}`
/// or a push-event stream depending on `stream`.
///
/// # Arguments
///  * `state` - shared application state
///  * `body` - JSON body, or the reason it could not be read
///
/// # Returns
///  * JSON answer, event stream, or `{error}` with the matching status
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return rejection.into_response();
        }
        Err(rejection) => {
            return create_error_response(&ProxyError::Validation(rejection.body_text()));
        }
    };

    let request = match ChatRequest::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejected chat request: {}", e);
            return create_error_response(&e);
        }
    };

    let route = router::classify(
        request.model.as_deref(),
        &state.config.local.default_model,
        &state.config.cloud.model,
    );
    log_incoming_request(&route, &request);

    match (route.kind, request.stream) {
        (_, false) => complete_response(state, route, request).await,
        (BackendKind::Cloud, true) => cloud_stream_response(state, route, request).await,
        (BackendKind::Local, true) => local_stream_response(state, route, request),
    }
}

fn log_incoming_request(route: &Route, request: &ChatRequest) {
    tracing::debug!(
        backend = route.kind.as_str(),
        model = %route.display_model,
        stream = request.stream,
        turns = request.messages.len(),
        "chat request"
    );
}

///
/// Non-streaming path: wait for the full answer.
async fn complete_response(state: Arc<AppState>, route: Route, request: ChatRequest) -> Response {
    let backend = state.backend(route.kind);
    let deadline = backend.deadline();

    match backend.complete(&route.backend_model, &request.messages, &deadline).await {
        Ok(completion) => Json(ChatCompletion {
            model: route.display_model,
            content: completion.content,
            raw: completion.raw,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("{} request failed: {}", backend.id(), e);
            create_error_response(&e)
        }
    }
}

///
/// Cloud streaming path. The single-shot call finishes before the stream is
/// committed, so its failures still answer with a JSON error.
async fn cloud_stream_response(
    state: Arc<AppState>,
    route: Route,
    request: ChatRequest,
) -> Response {
    let deadline = state.cloud.deadline();
    let completion =
        match state.cloud.complete(&route.backend_model, &request.messages, &deadline).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!("{} request failed: {}", state.cloud.id(), e);
                return create_error_response(&e);
            }
        };

    tracing::info!(
        model = %route.display_model,
        tokens = usize::from(!completion.content.is_empty()),
        "relay completed"
    );

    let mut events = vec![ProxyEvent::Meta { model: route.display_model }];
    events.extend(relay::single_shot_events(completion.content));

    let frames = events.into_iter().map(|e| Ok(Event::from(Frame::Event(e))));
    event_stream_response(tokio_stream::iter(frames))
}

///
/// Local streaming path: commit the stream now and relay from a spawned task.
fn local_stream_response(state: Arc<AppState>, route: Route, request: ChatRequest) -> Response {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let deadline = state.local.deadline();
    let heartbeat = state.config.heartbeat_interval();

    tokio::spawn(async move {
        let Route { display_model, backend_model, .. } = route;
        let local = Arc::clone(&state.local);
        let open = async { local.open_stream(&backend_model, &request.messages, &deadline).await };
        relay::run_relay(display_model, open, deadline, heartbeat, tx).await;
    });

    event_stream_response(ReceiverStream::new(rx).map(|frame| Ok(Event::from(frame))))
}

///
/// Wrap an event stream with the push-protocol headers.
fn event_stream_response<S>(stream: S) -> Response
where
    S: Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static,
{
    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

///
/// Create a flat `{error}` response for `error`.
///
/// Rate-limit denials also carry `Retry-After` in seconds.
pub fn create_error_response(error: &ProxyError) -> Response {
    let status = error.status_code();
    let mut response = (status, Json(json!({ "error": error.to_string() }))).into_response();

    if let ProxyError::RateLimited { retry_after_secs } = error {
        response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }

    response
}

///
/// Handle the model-listing endpoint.
///
/// Lists the models installed on the local service; the configured cloud model is
/// listed first when the cloud credential is present.
pub async fn models(State(state): State<Arc<AppState>>) -> Response {
    let deadline = state.local.deadline();
    let names = match state.local.list_models(&deadline).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!("Model listing failed: {}", e);
            return create_error_response(&e);
        }
    };

    let mut models: Vec<Value> = names.into_iter().map(|name| json!({ "name": name })).collect();
    if state.cloud.is_configured() {
        let cloud_model = format!("{}{}", CLOUD_MODEL_PREFIX, state.config.cloud.model);
        models.insert(0, json!({ "name": cloud_model }));
    }

    Json(json!({ "models": models, "default": state.config.local.default_model })).into_response()
}

///
/// Handle the health check endpoint, probing the local backend.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let deadline = Deadline::after(HEALTH_PROBE_TIMEOUT.min(state.config.local_timeout()));
    let reachable = state.local.probe(&deadline).await;

    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "ollamaHost": state.local.host(),
        "localBackend": if reachable { "reachable" } else { "unreachable" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

///
/// Handle the index endpoint.
pub async fn index() -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "endpoints": { "health": "/health", "models": "/v1/models", "chat": "/v1/chat" },
    }))
}
