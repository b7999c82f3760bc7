//!
//! Local backend (Ollama) wire types.
//!
//! Builds the structured `/api/chat` body and the legacy `/api/generate` body, and
//! parses the newline-delimited records both endpoints answer with.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Serialize};

use crate::config::LocalBackendConfig;
use crate::converter::flatten_prompt;
use crate::protocol::ChatMessage;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Generation-shaping options; a field is present only when configured positive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u64>,
}

///
/// Body for the structured chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LocalChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

///
/// Body for the legacy single-prompt endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LocalGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordMessage {
    #[serde(default)]
    pub content: Option<String>,
}

///
/// One record from either local endpoint: the chat shape carries `message.content`,
/// the generate shape carries `response`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalRecord {
    #[serde(default)]
    pub message: Option<RecordMessage>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
}

///
/// Builds local request bodies from the configured generation options.
#[derive(Debug, Clone, Default)]
pub struct LocalConverter {
    options: Option<GenerationOptions>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl LocalConverter {
    pub fn new(config: &LocalBackendConfig) -> Self {
        Self::with_options(config.num_ctx, config.num_predict)
    }

    /// Options from raw settings; non-positive values are left out
    pub fn with_options(num_ctx: i64, num_predict: i64) -> Self {
        let positive = |v: i64| u64::try_from(v).ok().filter(|v| *v > 0);
        let options =
            GenerationOptions { num_ctx: positive(num_ctx), num_predict: positive(num_predict) };
        let options = (options != GenerationOptions::default()).then_some(options);
        Self { options }
    }

    pub fn chat_request<'a>(
        &self,
        model: &'a str,
        messages: &'a [ChatMessage],
        stream: bool,
    ) -> LocalChatRequest<'a> {
        LocalChatRequest { model, messages, stream, options: self.options.clone() }
    }

    /// Same logical request for the legacy endpoint, conversation flattened to one prompt
    pub fn generate_request<'a>(
        &self,
        model: &'a str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> LocalGenerateRequest<'a> {
        LocalGenerateRequest {
            model,
            prompt: flatten_prompt(messages),
            stream,
            options: self.options.clone(),
        }
    }
}

impl LocalRecord {
    ///
    /// Parse one line of a local response; blank or unparseable lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping unparseable local record: {}", e);
                None
            }
        }
    }

    /// Text fragment: `message.content`, else `response`, else empty
    pub fn into_fragment(self) -> String {
        match (self.message.and_then(|m| m.content), self.response) {
            (Some(content), _) => content,
            (None, Some(response)) => response,
            (None, None) => String::new(),
        }
    }
}
