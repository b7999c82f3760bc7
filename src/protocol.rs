//!
//! Frontend-facing protocol types.
//!
//! The chat request accepted on `/v1/chat`, the non-streaming completion answer and
//! the uniform push events emitted while streaming. These shapes are identical for
//! both backends.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

///
/// One turn of the conversation. Turn order is significant and preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /** who produced the turn */
    pub role: Role,
    /** the turn text */
    pub content: String,
}

///
/// Validated inbound chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /** requested model identifier; `None` resolves to the configured default */
    pub model: Option<String>,
    /** non-empty ordered conversation */
    pub messages: Vec<ChatMessage>,
    /** whether the client wants the push-event protocol */
    pub stream: bool,
}

///
/// Non-streaming answer body: `{model, content, raw}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub model: String,
    pub content: String,
    pub raw: Value,
}

///
/// Uniform push event sent to the frontend, whatever backend produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /** active model, sent before any upstream byte */
    Meta { model: String },
    /** incremental text fragment */
    Token { text: String },
    /** the backend signalled completion */
    Done,
    /** the stream failed; nothing follows */
    Error { message: String },
}

/* --- start of code -------------------------------------------------------------------------- */

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl ChatRequest {
    ///
    /// Build a request from an already-parsed JSON body.
    ///
    /// Only a literal `false` disables streaming and an empty `model` counts as absent.
    ///
    /// # Returns
    ///  * the validated request
    ///  * `ProxyError::Validation` when `messages` is missing, not an array, empty,
    ///    or holds a malformed turn
    pub fn from_value(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(ProxyError::Validation("request body must be a JSON object".to_string()));
        };

        let messages = match body.remove("messages") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Err(ProxyError::Validation("messages array required".to_string())),
        };

        let messages = messages
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<ChatMessage>(item).map_err(|e| {
                    ProxyError::Validation(format!("invalid message at index {}: {}", i, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let model = match body.remove("model") {
            Some(Value::String(m)) if !m.is_empty() => Some(m),
            Some(Value::String(_)) | Some(Value::Null) | None => None,
            Some(_) => return Err(ProxyError::Validation("model must be a string".to_string())),
        };

        let stream = body.get("stream").and_then(Value::as_bool) != Some(false);

        Ok(Self { model, messages, stream })
    }
}

impl ProxyEvent {
    ///
    /// Event name written on the `event:` line.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyEvent::Meta { .. } => "meta",
            ProxyEvent::Token { .. } => "token",
            ProxyEvent::Done => "done",
            ProxyEvent::Error { .. } => "error",
        }
    }

    ///
    /// JSON payload written on the `data:` line.
    pub fn payload(&self) -> Value {
        match self {
            ProxyEvent::Meta { model } => json!({ "model": model }),
            ProxyEvent::Token { text } => json!({ "token": text }),
            ProxyEvent::Done => json!({ "done": true }),
            ProxyEvent::Error { message } => json!({ "error": message }),
        }
    }
}
