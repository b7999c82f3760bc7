//!
//! Chat backend abstraction.
//!
//! Each backend implements [ChatBackend]. The local backend streams incrementally;
//! the cloud backend only answers single-shot. `open_stream` reports which of the
//! two shapes came back so the relay never branches on the backend itself.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cloud;
pub mod local;

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::ChatMessage;
use crate::upstream::{ByteStream, Deadline};

pub use cloud::CloudBackend;
pub use local::LocalBackend;

/* --- types ----------------------------------------------------------------------------------- */

///
/// A finished single-shot answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /** extracted text payload */
    pub content: String,
    /** the backend's unmodified response body */
    pub raw: Value,
}

///
/// What a backend hands to the relay once a streaming call is open.
pub enum UpstreamReply {
    /** newline-delimited records still arriving */
    Incremental(ByteStream),
    /** the whole answer, already complete */
    SingleShot(Completion),
}

/* --- provider trait -------------------------------------------------------------------------- */

///
/// Trait every chat backend implements.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    ///
    /// Backend identifier used in logs (e.g. `"ollama"`, `"gemini"`).
    fn id(&self) -> &'static str;

    ///
    /// Budget for one chat request against this backend.
    fn timeout(&self) -> Duration;

    /// Deadline armed now with this backend's budget
    fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout())
    }

    ///
    /// Non-streaming call: wait for the complete answer.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        deadline: &Deadline,
    ) -> Result<Completion>;

    ///
    /// Streaming call: return once the response head has arrived.
    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        deadline: &Deadline,
    ) -> Result<UpstreamReply>;
}

impl fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamReply::Incremental(_) => f.write_str("Incremental(..)"),
            UpstreamReply::SingleShot(completion) => {
                f.debug_tuple("SingleShot").field(completion).finish()
            }
        }
    }
}
