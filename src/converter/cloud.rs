//!
//! Cloud backend (Gemini `generateContent`) wire types.
//!
//! The cloud backend is always called single-shot; the conversation is flattened
//! into one user turn.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Serialize};

use crate::converter::flatten_prompt;
use crate::protocol::ChatMessage;

/* --- constants ------------------------------------------------------------------------------ */

/** output cap used when no positive local `num_predict` is configured */
pub const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 256;

/* --- types ----------------------------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRequest {
    pub contents: Vec<CloudContent>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<CloudPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u64,
}

///
/// The slice of the response this relay depends on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudResponse {
    #[serde(default)]
    pub candidates: Vec<CloudCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudCandidate {
    #[serde(default)]
    pub content: Option<CloudContent>,
}

///
/// Builds cloud request bodies.
#[derive(Debug, Clone)]
pub struct CloudConverter {
    max_output_tokens: u64,
}

/* --- start of code -------------------------------------------------------------------------- */

impl CloudConverter {
    ///
    /// # Arguments
    ///  * `num_predict` - local output cap, reused when positive
    pub fn new(num_predict: i64) -> Self {
        let max_output_tokens =
            u64::try_from(num_predict).ok().filter(|v| *v > 0).unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);
        Self { max_output_tokens }
    }

    pub fn request(&self, messages: &[ChatMessage]) -> CloudRequest {
        CloudRequest {
            contents: vec![CloudContent {
                role: Some("user".to_string()),
                parts: vec![CloudPart { text: Some(flatten_prompt(messages)) }],
            }],
            generation_config: GenerationConfig { max_output_tokens: self.max_output_tokens },
        }
    }
}

impl CloudResponse {
    /// Text of every part of the first candidate, concatenated; empty when absent
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}
