//! SseFrameParser: rebuilds step events from arbitrarily chunked bytes.
//!
//! Bytes are appended to a carry-over buffer; every time a `\n\n`
//! terminator is found, the bytes before it form one frame. A frame that
//! fails to decode is skipped and counted. It never poisons the rest of
//! the stream.

use thiserror::Error;
use tracing::warn;
use turnstream_core::StepEvent;

use crate::encoder::{DATA_PREFIX, FRAME_DELIMITER};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame does not start with the data prefix")]
    MissingPrefix,

    #[error("frame payload is not a known event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One parser per stream.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
    /// Offset in `buffer` up to which no delimiter can start.
    scanned: usize,
    frames_seen: usize,
    decode_errors: usize,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every event completed by them, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StepEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some(pos) = find(&self.buffer[search_from..], FRAME_DELIMITER) {
            let end = search_from + pos;
            self.frames_seen += 1;
            match decode_frame(&self.buffer[start..end]) {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.decode_errors += 1;
                    warn!(error = %e, frame = self.frames_seen, "Skipping undecodable frame");
                }
            }
            start = end + FRAME_DELIMITER.len();
            search_from = start;
        }

        self.buffer.drain(..start);
        // A delimiter may straddle the next chunk boundary, so leave its
        // first byte(s) unscanned.
        self.scanned = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        events
    }

    /// Bytes received that do not yet form a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Whether the stream ended cleanly on a frame boundary.
    pub fn is_idle(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    pub fn decode_errors(&self) -> usize {
        self.decode_errors
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }
}

/// Decode the bytes of one frame (delimiter excluded).
///
/// Leading blank lines left over from a peer that pads frames are
/// tolerated.
pub fn decode_frame(frame: &[u8]) -> Result<StepEvent, FrameError> {
    let frame = trim_leading_newlines(frame);
    let payload = frame
        .strip_prefix(DATA_PREFIX)
        .ok_or(FrameError::MissingPrefix)?;
    Ok(serde_json::from_slice(payload)?)
}

fn trim_leading_newlines(mut bytes: &[u8]) -> &[u8] {
    while let [b'\n' | b'\r', rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
