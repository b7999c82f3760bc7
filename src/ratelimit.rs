//!
//! Per-client fixed-window rate limiting.
//!
//! One `RateBucket` per client identity, created lazily and replaced once its window
//! has passed. The limiter is owned by the application state and handed to the
//! middleware gate in front of the chat routes; tests build isolated instances.
//!
//! Requests whose identity cannot be determined share the `"unknown"` bucket.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::server::create_error_response;

/* --- constants ------------------------------------------------------------------------------ */

/** bucket count above which expired buckets are swept */
pub const SWEEP_THRESHOLD: usize = 5_000;

/** identity shared by every request without a determinable address */
pub const UNKNOWN_IDENTITY: &str = "unknown";

/** client address set by a trusted edge proxy */
const TRUSTED_CLIENT_IP_HEADER: &str = "cf-connecting-ip";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Counter for one identity inside one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBucket {
    /** instant after which the bucket is replaced */
    pub reset_at: Instant,
    /** requests seen since the bucket was created */
    pub count: u64,
}

///
/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny { retry_after_secs: u64 },
}

///
/// Fixed-window limiter. A single mutex serializes every counter update so
/// concurrent arrivals for one identity never lose an increment.
#[derive(Debug)]
pub struct RateLimiter {
    window: Option<Duration>,
    max_requests: u64,
    buckets: Mutex<HashMap<String, RateBucket>>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl RateLimiter {
    ///
    /// Create a limiter allowing `max_requests` per `window_ms`.
    ///
    /// # Arguments
    ///  * `window_ms` - window length; `<= 0` disables limiting
    ///  * `max_requests` - requests allowed per window; `<= 0` disables limiting
    pub fn new(window_ms: i64, max_requests: i64) -> Self {
        let enabled = window_ms > 0 && max_requests > 0;
        Self {
            window: enabled.then(|| Duration::from_millis(window_ms.unsigned_abs())),
            max_requests: if enabled { max_requests.unsigned_abs() } else { 0 },
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window_ms, config.max_requests)
    }

    /// Limiter that allows everything
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.window.is_some()
    }

    /// Check and count one request at the current instant
    pub fn check(&self, identity: &str) -> RateDecision {
        self.check_at(identity, Instant::now())
    }

    ///
    /// Check and count one request at `now`.
    ///
    /// # Returns
    ///  * `RateDecision::Allow` while the bucket's count is within the limit
    ///  * `RateDecision::Deny` with whole seconds left until the bucket resets
    pub fn check_at(&self, identity: &str, now: Instant) -> RateDecision {
        let Some(window) = self.window else {
            return RateDecision::Allow;
        };

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let bucket = buckets
            .entry(identity.to_string())
            .and_modify(|bucket| {
                if now > bucket.reset_at {
                    *bucket = RateBucket { reset_at: now + window, count: 0 };
                }
            })
            .or_insert(RateBucket { reset_at: now + window, count: 0 });

        bucket.count += 1;

        if bucket.count > self.max_requests {
            let remaining = bucket.reset_at.saturating_duration_since(now);
            let retry_after_secs =
                u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);
            return RateDecision::Deny { retry_after_secs };
        }

        if buckets.len() > SWEEP_THRESHOLD {
            sweep(&mut buckets, now);
        }

        RateDecision::Allow
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Current bucket for `identity`, if any
    pub fn bucket(&self, identity: &str) -> Option<RateBucket> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).get(identity).copied()
    }
}

/// Drop every bucket whose window has passed
fn sweep(buckets: &mut HashMap<String, RateBucket>, now: Instant) {
    let before = buckets.len();
    buckets.retain(|_, bucket| bucket.reset_at >= now);
    tracing::debug!("Rate limiter swept {} expired bucket(s)", before - buckets.len());
}

///
/// Resolve the key a request is counted under.
///
/// Order: trusted client-IP header, first forwarded-for entry, transport peer,
/// then `"unknown"`.
pub fn client_identity(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let header = |name: &str| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
    };

    if let Some(ip) = header(TRUSTED_CLIENT_IP_HEADER) {
        return ip.to_string();
    }

    if let Some(first) = header(FORWARDED_FOR_HEADER)
        .and_then(|list| list.split(',').map(str::trim).find(|s| !s.is_empty()))
    {
        return first.to_string();
    }

    peer.map(|ip| ip.to_string()).unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

///
/// Middleware gate: counts the request and answers 429 with `Retry-After` when the
/// caller's window is exhausted.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }

    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let identity = client_identity(req.headers(), peer);

    match limiter.check(&identity) {
        RateDecision::Allow => next.run(req).await,
        RateDecision::Deny { retry_after_secs } => {
            tracing::warn!("Rate limit exceeded for {}, retry in {}s", identity, retry_after_secs);
            create_error_response(&ProxyError::RateLimited { retry_after_secs })
        }
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
