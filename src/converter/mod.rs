//!
//! Request and response translation between the uniform chat protocol and each
//! backend's native schema.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cloud;
pub mod local;

/* --- uses ------------------------------------------------------------------------------------ */

use crate::protocol::ChatMessage;

pub use cloud::{CloudConverter, CloudRequest, CloudResponse};
pub use local::{LocalChatRequest, LocalConverter, LocalGenerateRequest, LocalRecord};

/* --- start of code -------------------------------------------------------------------------- */

///
/// Flatten a conversation into one prompt: `"{role}: {content}"` lines in turn order,
/// joined by `\n`.
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
