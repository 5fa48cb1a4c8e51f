//! Receiving side: drive a byte stream through an [`SseFrameParser`].
//!
//! The pull loop is bounded by the stream itself and by a cancellation
//! token. It stops on the first terminal event; an `error` frame is final
//! even if a `done` frame were to follow.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use turnstream_core::StepEvent;

use crate::parser::SseFrameParser;

/// How a consumed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `done` frame arrived.
    Completed,
    /// An `error` frame arrived; carries its message.
    Failed(String),
    /// The connection closed without `done` or `error`.
    Incomplete,
    /// The caller cancelled before the run finished.
    Cancelled,
}

/// Feed `stream` into a fresh parser and hand every decoded event to
/// `handler`, in order, until the run ends.
///
/// Transport errors from `stream` are returned as-is.
pub async fn consume<S, E, F>(
    stream: S,
    cancel: &CancellationToken,
    mut handler: F,
) -> Result<StreamOutcome, E>
where
    S: Stream<Item = Result<Bytes, E>>,
    F: FnMut(&StepEvent),
{
    let mut parser = SseFrameParser::new();
    tokio::pin!(stream);

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else {
            debug!(
                pending = parser.pending().len(),
                frames = parser.frames_seen(),
                "Stream ended without a terminal frame"
            );
            return Ok(StreamOutcome::Incomplete);
        };

        for event in parser.feed(&chunk?) {
            handler(&event);
            if event.is_terminal() {
                return Ok(match event {
                    StepEvent::Error { error } => StreamOutcome::Failed(error),
                    _ => StreamOutcome::Completed,
                });
            }
        }
    }
}
