//! # chat-relay - streaming chat proxy library
//!
//! Relays a frontend's chat requests to a local Ollama service or the Gemini API and
//! normalizes both into one server-sent-events protocol (`meta`, `token`, `done`,
//! `error`). The binary is the main consumer; the router is exposed so it can be
//! embedded or driven from tests.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use chat_relay::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let app = create_app(config)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3033").await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Layered configuration, validation and CLI commands
//! - [`protocol`] - Chat request, completion and push-event types
//! - [`ratelimit`] - Per-client fixed-window limiter and its middleware gate
//! - [`router`] - Backend classification by model identifier
//! - [`converter`] - Backend wire formats
//! - [`upstream`] - Deadline-bounded HTTP calls
//! - [`provider`] - Backend capability trait ([`provider::ChatBackend`]) and both backends
//! - [`relay`] - Line-buffered stream relay with heartbeat and cancellation
//! - [`server`] - Route handlers
//! - [`error`] - Error types and handling

pub mod config;
pub mod converter;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod ratelimit;
pub mod relay;
pub mod router;
pub mod server;
pub mod upstream;

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

// Re-export commonly used types
pub use config::{Config, ValidationIssue, ValidationSeverity};
pub use error::ProxyError;

use crate::server::AppState;

/* --- start of code -------------------------------------------------------------------------- */

/// Creates the chat-relay application with the given configuration.
///
/// # Arguments
///
/// * `config` - Application configuration
///
/// # Returns
///
/// An Axum Router. Serve it with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the rate limiter can fall back to the peer address.
///
/// # Errors
///
/// Returns a `ProxyError` if the HTTP client cannot be built or an allowed origin is
/// not a valid header value.
pub fn create_app(config: Config) -> Result<Router, ProxyError> {
    build_router(Arc::new(AppState::new(config)?))
}

/// Assemble routes and middleware around an existing state
pub fn build_router(state: Arc<AppState>) -> Result<Router, ProxyError> {
    let cors = cors_layer(&state.config.server.allowed_origins)?;

    let chat_routes = Router::new()
        .route("/v1/chat", post(server::chat))
        .route("/chat", post(server::chat))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.rate_limiter),
            ratelimit::enforce,
        ));

    Ok(Router::new()
        .route("/", get(server::index))
        .route("/health", get(server::health))
        .route("/v1/models", get(server::models))
        .merge(chat_routes)
        .layer(DefaultBodyLimit::max(state.config.server.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Origin allow-list with credentials; an empty list grants no cross-origin access
fn cors_layer(origins: &[String]) -> Result<CorsLayer, ProxyError> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| {
                ProxyError::Config(format!("Invalid allowed origin '{}': {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}
