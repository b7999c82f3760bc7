//!
//! Error handling for the chat relay.
//!
//! Defines the error taxonomy shared by the request handler, the backends and the
//! upstream client. Client disconnects are not errors and never show up here; they
//! are reported as a relay outcome instead.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types.
///
/// `Validation` and `Config` are raised before any backend is contacted. The
/// `Upstream*` variants come from the upstream client and all surface to the
/// frontend as the same "upstream failed" family.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Config(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("upstream timed out after {}ms", .0.as_millis())]
    UpstreamTimeout(Duration),

    #[error("{0}")]
    UpstreamProtocol(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/* --- start of code -------------------------------------------------------------------------- */

impl ProxyError {
    ///
    /// Whether the error belongs to the upstream-failure family.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamUnavailable(_)
                | ProxyError::UpstreamTimeout(_)
                | ProxyError::UpstreamProtocol(_)
        )
    }

    ///
    /// HTTP status used when the error is answered before a stream was committed.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) | ProxyError::Config(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamUnavailable(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Http(_) | ProxyError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, ProxyError>;
