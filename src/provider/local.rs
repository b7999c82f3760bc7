//!
//! Local backend (Ollama).
//!
//! Calls the structured `/api/chat` endpoint and, when that endpoint does not exist
//! on the running version (404), reissues the same request once against the
//! legacy `/api/generate` endpoint with the conversation flattened to a prompt.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::LocalBackendConfig;
use crate::converter::{LocalConverter, LocalRecord};
use crate::error::{ProxyError, Result};
use crate::protocol::ChatMessage;
use crate::provider::{ChatBackend, Completion, UpstreamReply};
use crate::upstream::{self, Deadline, UpstreamClient};

/* --- constants ------------------------------------------------------------------------------ */

const CHAT_PATH: &str = "/api/chat";
const GENERATE_PATH: &str = "/api/generate";
const TAGS_PATH: &str = "/api/tags";

const BACKEND_ID: &str = "ollama";

/* --- types ----------------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct LocalBackend {
    client: UpstreamClient,
    /** base URL without trailing slash */
    host: String,
    timeout: Duration,
    converter: LocalConverter,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/* --- start of code -------------------------------------------------------------------------- */

impl LocalBackend {
    pub fn new(config: &LocalBackendConfig, client: UpstreamClient) -> Self {
        Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            converter: LocalConverter::new(config),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    ///
    /// Issue the request, falling back to the legacy endpoint at most once.
    ///
    /// # Returns
    ///  * a success response from whichever endpoint answered
    ///  * `ProxyError::UpstreamProtocol` when the final answer is not a success
    async fn post_with_fallback(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
        deadline: &Deadline,
    ) -> Result<Response> {
        let chat = self.converter.chat_request(model, messages, stream);
        let response = self.client.post_json(&self.endpoint(CHAT_PATH), &chat, deadline).await?;

        let response = if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("{} not found on {}, retrying {}", CHAT_PATH, self.host, GENERATE_PATH);
            let generate = self.converter.generate_request(model, messages, stream);
            self.client.post_json(&self.endpoint(GENERATE_PATH), &generate, deadline).await?
        } else {
            response
        };

        upstream::ensure_success(response, BACKEND_ID, deadline).await
    }

    ///
    /// Names of the models installed on the local service.
    pub async fn list_models(&self, deadline: &Deadline) -> Result<Vec<String>> {
        let response = self.client.get(&self.endpoint(TAGS_PATH), deadline).await?;
        let response = upstream::ensure_success(response, BACKEND_ID, deadline).await?;
        let tags: TagList = upstream::read_json(response, deadline).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the service answers its model listing in time
    pub async fn probe(&self, deadline: &Deadline) -> bool {
        match self.client.get(&self.endpoint(TAGS_PATH), deadline).await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Local backend probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
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
        let response = self.post_with_fallback(model, messages, false, deadline).await?;
        let raw: Value = upstream::read_json(response, deadline).await?;
        let record: LocalRecord = serde_json::from_value(raw.clone()).map_err(|e| {
            ProxyError::UpstreamProtocol(format!("unexpected {} response: {}", BACKEND_ID, e))
        })?;
        Ok(Completion { content: record.into_fragment(), raw })
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        deadline: &Deadline,
    ) -> Result<UpstreamReply> {
        let response = self.post_with_fallback(model, messages, true, deadline).await?;
        Ok(UpstreamReply::Incremental(upstream::byte_stream(response)))
    }
}
