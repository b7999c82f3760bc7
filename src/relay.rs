//!
//! Stream relay.
//!
//! Turns an upstream reply into the uniform push-event sequence on an mpsc channel
//! read by the response body. Owns the heartbeat and both cancellation sources:
//! the client going away (the receiver is dropped) and the request deadline.
//!
//! Event order on one relay is `meta`, then `token`s in upstream record order,
//! then at most one `done`, or a single `error` after which nothing is sent.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::future::Future;
use std::time::Duration;

use axum::response::sse::Event;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};

use crate::converter::LocalRecord;
use crate::error::{ProxyError, Result};
use crate::protocol::ProxyEvent;
use crate::provider::{Completion, UpstreamReply};
use crate::upstream::{ByteStream, Deadline};

/* --- constants ------------------------------------------------------------------------------ */

/** frames buffered between the relay task and the response body */
pub const FRAME_CHANNEL_CAPACITY: usize = 32;

/** longest unterminated record kept while waiting for its newline */
pub const MAX_LINE_BYTES: usize = 1 << 20;

/* --- types ----------------------------------------------------------------------------------- */

///
/// One write to the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(ProxyEvent),
    /** keep-alive filler line with no event semantics */
    Heartbeat,
}

///
/// Why a relay stopped before the upstream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    ClientDisconnected,
    DeadlineExceeded,
}

///
/// How one relay pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /** upstream body exhausted */
    Completed { tokens: usize, done: bool },
    /** upstream failed; an `error` event was sent */
    Failed { tokens: usize, message: String },
    Cancelled { tokens: usize, cause: CancelCause },
}

///
/// Splits an incremental byte body into complete lines. The trailing fragment
/// stays buffered until its newline arrives, so multi-byte characters split
/// across chunks decode intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /** prefix of `pending` already known to hold no newline */
    scanned: usize,
}

struct Relay {
    tx: mpsc::Sender<Frame>,
    heartbeat: Option<Interval>,
    deadline: Deadline,
    tokens: usize,
    done_sent: bool,
}

enum Wake<T> {
    Ready(T),
    Disconnected,
    Expired,
}

/** whether an event reached the channel, or why the relay must stop */
type Delivery = std::result::Result<(), CancelCause>;

enum Step<T> {
    Ready(T),
    Beat,
    Disconnected,
    Expired,
}

/* --- start of code -------------------------------------------------------------------------- */

impl From<Frame> for Event {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Event(event) => {
                Event::default().event(event.kind()).data(event.payload().to_string())
            }
            Frame::Heartbeat => Event::default().comment("ping"),
        }
    }
}

impl RelayOutcome {
    pub fn tokens(&self) -> usize {
        match self {
            RelayOutcome::Completed { tokens, .. }
            | RelayOutcome::Failed { tokens, .. }
            | RelayOutcome::Cancelled { tokens, .. } => *tokens,
        }
    }

    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            RelayOutcome::Cancelled { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    fn log(&self, model: &str) {
        match self {
            RelayOutcome::Completed { tokens, done } => {
                tracing::info!(model, tokens, done, "relay completed")
            }
            RelayOutcome::Failed { tokens, message } => {
                tracing::warn!(model, tokens, error = %message, "relay failed")
            }
            RelayOutcome::Cancelled { tokens, cause: CancelCause::ClientDisconnected } => {
                tracing::info!(model, tokens, "relay cancelled by client")
            }
            RelayOutcome::Cancelled { tokens, cause: CancelCause::DeadlineExceeded } => {
                tracing::warn!(model, tokens, "relay cancelled by deadline")
            }
        }
    }
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, without the newline
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_LINE_BYTES {
            tracing::debug!("Dropping {} buffered bytes without a newline", self.pending.len());
            self.pending.clear();
        }
        self.scanned = self.pending.len();
        lines
    }

    /// Take the unterminated remainder once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        self.scanned = 0;
        let line = String::from_utf8_lossy(&rest).into_owned();
        (!line.trim().is_empty()).then_some(line)
    }
}

///
/// Events for a single-shot answer: the whole text as one `token` (none when
/// empty) followed by `done`.
pub fn single_shot_events(content: String) -> Vec<ProxyEvent> {
    let mut events = Vec::with_capacity(2);
    if !content.is_empty() {
        events.push(ProxyEvent::Token { text: content });
    }
    events.push(ProxyEvent::Done);
    events
}

///
/// Relay one streaming request onto `tx`.
///
/// `meta` goes out before `open` is polled. The heartbeat runs from then on until
/// the relay returns. Dropping the receiver aborts the upstream call or body read
/// at the next wake-up and nothing more is written.
///
/// # Arguments
///  * `model` - display identifier for `meta`
///  * `open` - the upstream call, resolving once the response head arrived
///  * `deadline` - request deadline covering the call and the body read
///  * `heartbeat_every` - filler interval; zero disables the heartbeat
///  * `tx` - frames for the client transport
///
/// # Returns
///  * how the relay ended; also logged once
pub async fn run_relay<F>(
    model: String,
    open: F,
    deadline: Deadline,
    heartbeat_every: Duration,
    tx: mpsc::Sender<Frame>,
) -> RelayOutcome
where
    F: Future<Output = Result<UpstreamReply>>,
{
    let mut relay = Relay::new(tx, deadline, heartbeat_every);
    let outcome = relay.drive(model.clone(), open).await;
    outcome.log(&model);
    outcome
}

impl Relay {
    fn new(tx: mpsc::Sender<Frame>, deadline: Deadline, heartbeat_every: Duration) -> Self {
        let heartbeat = (!heartbeat_every.is_zero()).then(|| {
            let mut interval = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { tx, heartbeat, deadline, tokens: 0, done_sent: false }
    }

    async fn drive<F>(&mut self, model: String, open: F) -> RelayOutcome
    where
        F: Future<Output = Result<UpstreamReply>>,
    {
        if let Err(cause) = self.emit(ProxyEvent::Meta { model }).await {
            return self.stop(cause);
        }

        let reply = match self.wait(open).await {
            Wake::Ready(Ok(reply)) => reply,
            Wake::Ready(Err(e)) => return self.fail(e).await,
            Wake::Disconnected => return self.stop(CancelCause::ClientDisconnected),
            Wake::Expired => return self.stop(CancelCause::DeadlineExceeded),
        };

        match reply {
            UpstreamReply::Incremental(body) => self.pump(body).await,
            UpstreamReply::SingleShot(completion) => self.single_shot(completion).await,
        }
    }

    /// Forward records until the body ends, fails, or a cancellation fires
    async fn pump(&mut self, mut body: ByteStream) -> RelayOutcome {
        let mut lines = LineBuffer::default();

        loop {
            match self.wait(body.next()).await {
                Wake::Ready(Some(Ok(chunk))) => {
                    for line in lines.push(&chunk) {
                        if let Err(cause) = self.forward(&line).await {
                            return self.stop(cause);
                        }
                    }
                }
                Wake::Ready(Some(Err(e))) => return self.fail(e).await,
                Wake::Ready(None) => break,
                Wake::Disconnected => return self.stop(CancelCause::ClientDisconnected),
                Wake::Expired => return self.stop(CancelCause::DeadlineExceeded),
            }
        }

        if let Some(line) = lines.finish()
            && let Err(cause) = self.forward(&line).await
        {
            return self.stop(cause);
        }

        RelayOutcome::Completed { tokens: self.tokens, done: self.done_sent }
    }

    async fn single_shot(&mut self, completion: Completion) -> RelayOutcome {
        for event in single_shot_events(completion.content) {
            if matches!(event, ProxyEvent::Token { .. }) {
                self.tokens += 1;
            }
            if matches!(event, ProxyEvent::Done) {
                self.done_sent = true;
            }
            if let Err(cause) = self.emit(event).await {
                return self.stop(cause);
            }
        }
        RelayOutcome::Completed { tokens: self.tokens, done: self.done_sent }
    }

    /// Translate one line into at most one token and one `done`
    async fn forward(&mut self, line: &str) -> Delivery {
        let Some(record) = LocalRecord::parse(line) else {
            return Ok(());
        };
        let done = record.done;
        let text = record.into_fragment();

        if !text.is_empty() {
            self.tokens += 1;
            self.emit(ProxyEvent::Token { text }).await?;
        }

        if done && !self.done_sent {
            self.done_sent = true;
            self.emit(ProxyEvent::Done).await?;
        }

        Ok(())
    }

    async fn fail(&mut self, error: ProxyError) -> RelayOutcome {
        let message = error.to_string();
        if let Err(cause) = self.emit(ProxyEvent::Error { message: message.clone() }).await {
            return self.stop(cause);
        }
        RelayOutcome::Failed { tokens: self.tokens, message }
    }

    ///
    /// End the relay for `cause`. A deadline is reported with one `error` event when
    /// the channel has room; the client may have stopped reading.
    fn stop(&self, cause: CancelCause) -> RelayOutcome {
        if cause == CancelCause::DeadlineExceeded {
            let message = ProxyError::UpstreamTimeout(self.deadline.budget()).to_string();
            let _ = self.tx.try_send(Frame::Event(ProxyEvent::Error { message }));
        }
        RelayOutcome::Cancelled { tokens: self.tokens, cause }
    }

    ///
    /// Send one event, waiting for channel space no longer than the deadline.
    async fn emit(&self, event: ProxyEvent) -> Delivery {
        let permit = tokio::select! {
            biased;
            permit = self.tx.reserve() => permit,
            _ = sleep_until(self.deadline.at()) => return Err(CancelCause::DeadlineExceeded),
        };
        let permit = permit.map_err(|_| CancelCause::ClientDisconnected)?;
        permit.send(Frame::Event(event));
        Ok(())
    }

    ///
    /// Drive `fut` while keeping the heartbeat going, until it settles or a
    /// cancellation fires. Disconnect wins over every other wake-up.
    async fn wait<F: Future>(&mut self, fut: F) -> Wake<F::Output> {
        tokio::pin!(fut);

        loop {
            let step = tokio::select! {
                biased;
                _ = self.tx.closed() => Step::Disconnected,
                _ = sleep_until(self.deadline.at()) => Step::Expired,
                out = &mut fut => Step::Ready(out),
                _ = tick(&mut self.heartbeat) => Step::Beat,
            };

            match step {
                Step::Ready(out) => return Wake::Ready(out),
                Step::Disconnected => return Wake::Disconnected,
                Step::Expired => return Wake::Expired,
                Step::Beat => match self.tx.try_send(Frame::Heartbeat) {
                    Ok(()) => {}
                    // a full channel already keeps the connection busy
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => return Wake::Disconnected,
                },
            }
        }
    }
}

/// Next heartbeat tick; never resolves when the heartbeat is off
async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
