//! Event-stream framing for turnstream.
//!
//! Frames are text-event-stream style: the literal prefix `data: `, one
//! JSON object, then a blank line (`\n\n`).
//!
//! - [`EventStreamEncoder`] turns a [`StepEvent`] into one frame
//! - [`StreamTransportWriter`] pushes frames through a bounded channel
//! - [`SseFrameParser`] rebuilds events from arbitrarily chunked bytes
//! - [`client::consume`] drives a byte stream through the parser

pub mod client;
pub mod encoder;
pub mod parser;
pub mod writer;

pub use client::{StreamOutcome, consume};
pub use encoder::{DATA_PREFIX, EventStreamEncoder, FRAME_DELIMITER};
pub use parser::{FrameError, SseFrameParser, decode_frame};
pub use writer::{FrameStream, StreamTransportWriter};

pub use turnstream_core::StepEvent;
