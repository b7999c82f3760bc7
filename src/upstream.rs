//!
//! Bounded-time HTTP calls to the backends.
//!
//! Every call runs under a `Deadline` armed when the request starts. The timer
//! lives inside `timeout_at` and is dropped with the call on every exit path.
//! Transport failures, timeouts, non-success statuses and malformed bodies map to
//! distinct `ProxyError` variants.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, timeout_at};

use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** characters of a failed upstream body carried into the error message */
pub const ERROR_BODY_LIMIT: usize = 500;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/* --- types ----------------------------------------------------------------------------------- */

/// Incremental upstream body
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

///
/// Absolute point in time after which an upstream call is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

///
/// Shared HTTP client for both backends.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
}

/* --- start of code -------------------------------------------------------------------------- */

impl Deadline {
    /// Arm a deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self { at: Instant::now() + budget, budget }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    ///
    /// Run `fut`, abandoning it when the deadline passes.
    ///
    /// # Returns
    ///  * the future's own result when it settles in time
    ///  * `ProxyError::UpstreamTimeout` carrying the budget otherwise
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::UpstreamTimeout(self.budget)),
        }
    }
}

impl UpstreamClient {
    ///
    /// Create the client. Per-call deadlines bound each request, so only the
    /// connect phase carries a client-level timeout.
    ///
    /// # Returns
    ///  * Configured client
    ///  * `ProxyError::Http` if client creation fails
    pub fn new() -> Result<Self> {
        Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map(Self::with_client)
            .map_err(|e| ProxyError::Http(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    ///
    /// POST a JSON body and wait for the response head.
    ///
    /// The response is returned whatever its status; callers decide on fallback
    /// before calling [`ensure_success`].
    pub async fn post_json<B>(&self, url: &str, body: &B, deadline: &Deadline) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        deadline
            .run(async { self.http.post(url).json(body).send().await.map_err(transport_error) })
            .await
    }

    /// GET `url` and wait for the response head
    pub async fn get(&self, url: &str, deadline: &Deadline) -> Result<Response> {
        deadline.run(async { self.http.get(url).send().await.map_err(transport_error) }).await
    }
}

///
/// Turn a non-success response into `ProxyError::UpstreamProtocol`.
///
/// # Arguments
///  * `response` - response head from the backend
///  * `label` - backend name used in the error message
///  * `deadline` - bounds reading the error body
pub async fn ensure_success(
    response: Response,
    label: &str,
    deadline: &Deadline,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = deadline
        .run(async { Ok(response.text().await.unwrap_or_default()) })
        .await
        .unwrap_or_default();
    let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();

    tracing::warn!("{} upstream answered {}", label, status);

    let message = format!("{} upstream failed: {} {}", label, status.as_u16(), snippet.trim());
    Err(ProxyError::UpstreamProtocol(message.trim_end().to_string()))
}

///
/// Read and parse a complete JSON body under the deadline.
pub async fn read_json<T>(response: Response, deadline: &Deadline) -> Result<T>
where
    T: DeserializeOwned,
{
    let body = deadline.run(async { response.bytes().await.map_err(transport_error) }).await?;
    serde_json::from_slice(&body)
        .map_err(|e| ProxyError::UpstreamProtocol(format!("malformed upstream body: {}", e)))
}

/// Body of `response` as an incremental byte stream
pub fn byte_stream(response: Response) -> ByteStream {
    response.bytes_stream().map(|chunk| chunk.map_err(transport_error)).boxed()
}

/// Classify a reqwest failure; the URL is stripped because it may carry a credential
fn transport_error(e: reqwest::Error) -> ProxyError {
    let e = e.without_url();
    if e.is_decode() {
        ProxyError::UpstreamProtocol(format!("malformed upstream body: {}", e))
    } else if e.is_connect() {
        ProxyError::UpstreamUnavailable(format!("upstream unreachable: {}", e))
    } else {
        ProxyError::UpstreamUnavailable(format!("upstream request failed: {}", e))
    }
}
