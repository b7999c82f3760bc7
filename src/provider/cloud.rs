//!
//! Cloud backend (Gemini).
//!
//! Always one non-streaming `generateContent` call. The credential is checked before
//! any I/O; a missing credential is a configuration error.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::config::Config;
use crate::config::mask_secret;
use crate::converter::{CloudConverter, CloudResponse};
use crate::error::{ProxyError, Result};
use crate::protocol::ChatMessage;
use crate::provider::{ChatBackend, Completion, UpstreamReply};
use crate::upstream::{self, Deadline, UpstreamClient};

/* --- constants ------------------------------------------------------------------------------ */

const BACKEND_ID: &str = "gemini";

/* --- types ----------------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct CloudBackend {
    client: UpstreamClient,
    api_key: Option<String>,
    api_base: String,
    timeout: Duration,
    converter: CloudConverter,
}

/* --- start of code -------------------------------------------------------------------------- */

impl CloudBackend {
    pub fn new(config: &Config, client: UpstreamClient) -> Self {
        Self {
            client,
            api_key: config.cloud.api_key.clone().filter(|k| !k.is_empty()),
            api_base: config.cloud.api_base.trim_end_matches('/').to_string(),
            timeout: config.cloud_timeout(),
            converter: CloudConverter::new(config.local.num_predict),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn credential(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ProxyError::Config("gemini not configured (missing GEMINI_API_KEY)".to_string())
        })
    }

    ///
    /// `{api_base}/models/{model}:generateContent?key={key}` with both values encoded.
    fn generate_url(&self, model: &str, key: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ProxyError::Config(format!("invalid cloud.api_base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProxyError::Config("cloud.api_base cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:generateContent", model));
        url.query_pairs_mut().append_pair("key", key);
        Ok(url)
    }
}

impl fmt::Debug for CloudBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudBackend")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ChatBackend for CloudBackend {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        deadline: &Deadline,
    ) -> Result<Completion> {
        let key = self.credential()?;
        let url = self.generate_url(model, key)?;
        let body = self.converter.request(messages);

        let response = self.client.post_json(url.as_str(), &body, deadline).await?;
        let response = upstream::ensure_success(response, BACKEND_ID, deadline).await?;
        let raw: Value = upstream::read_json(response, deadline).await?;

        let parsed: CloudResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ProxyError::UpstreamProtocol(format!("unexpected {} response: {}", BACKEND_ID, e))
        })?;
        Ok(Completion { content: parsed.text(), raw })
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        deadline: &Deadline,
    ) -> Result<UpstreamReply> {
        self.complete(model, messages, deadline).await.map(UpstreamReply::SingleShot)
    }
}
