//! StreamTransportWriter: the single outbound frame channel of a run.
//!
//! The writer owns the sending half of a bounded channel; the receiving
//! half is a [`FrameStream`] that an HTTP response body (or a test) drains.
//! A full buffer suspends `write` until the reader catches up, and frames
//! come out in the order they were written.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use turnstream_core::{EventSink, StepEvent, TransportError};

use crate::encoder::EventStreamEncoder;

pub struct StreamTransportWriter {
    tx: Option<mpsc::Sender<Bytes>>,
    encoder: EventStreamEncoder,
    frames_written: usize,
    close_error: Option<TransportError>,
}

impl StreamTransportWriter {
    /// Create a writer with room for `capacity` buffered frames, plus the
    /// stream that yields them.
    pub fn channel(capacity: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = Self {
            tx: Some(tx),
            encoder: EventStreamEncoder,
            frames_written: 0,
            close_error: None,
        };
        (
            writer,
            FrameStream {
                inner: ReceiverStream::new(rx),
                _guard: None,
            },
        )
    }

    /// Write one frame, waiting for buffer space if necessary.
    pub async fn write(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Whether the reader is still attached and the writer not closed.
    pub fn is_writable(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Close the channel. Idempotent; never fails.
    ///
    /// If the reader is already gone the condition is recorded (see
    /// [`close_error`](Self::close_error)) and logged instead of returned.
    pub fn close(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if tx.is_closed() {
            warn!(
                frames = self.frames_written,
                "Peer went away before the stream was closed"
            );
            self.close_error = Some(TransportError::Closed);
        } else {
            debug!(frames = self.frames_written, "Stream closed");
        }
    }

    /// The error observed while closing, if any.
    pub fn close_error(&self) -> Option<&TransportError> {
        self.close_error.as_ref()
    }
}

impl Drop for StreamTransportWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl EventSink for StreamTransportWriter {
    async fn emit(&mut self, event: StepEvent) -> Result<(), TransportError> {
        let frame = self.encoder.encode(&event).map_err(|e| {
            warn!(error = %e, event = event.event_type(), "Failed to encode event");
            TransportError::from(e)
        })?;
        self.write(frame).await
    }

    fn is_open(&self) -> bool {
        self.is_writable()
    }
}

/// Frames written by a [`StreamTransportWriter`], in write order.
///
/// Items are `Result<Bytes, Infallible>` so the stream can back an HTTP
/// body directly.
pub struct FrameStream {
    inner: ReceiverStream<Bytes>,
    _guard: Option<DropGuard>,
}

impl FrameStream {
    /// Cancel `token` when this stream is dropped, e.g. when the HTTP
    /// client disconnects and the response body is discarded.
    pub fn cancel_on_drop(mut self, token: CancellationToken) -> Self {
        self._guard = Some(token.drop_guard());
        self
    }
}

impl Stream for FrameStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|opt| opt.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    async fn collect(stream: FrameStream) -> Vec<Bytes> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn frames_arrive_in_write_order() {
        let (mut writer, stream) = StreamTransportWriter::channel(8);
        for i in 0..5 {
            writer.write(Bytes::from(format!("frame-{i}"))).await.unwrap();
        }
        writer.close();

        let frames = collect(stream).await;
        let expected: Vec<Bytes> = (0..5).map(|i| Bytes::from(format!("frame-{i}"))).collect();
        assert_eq!(frames, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn write_suspends_while_buffer_is_full() {
        let (mut writer, mut stream) = StreamTransportWriter::channel(1);
        writer.write(Bytes::from_static(b"a")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            writer.write(Bytes::from_static(b"b")),
        )
        .await;
        assert!(blocked.is_err(), "second write should wait for the reader");

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        writer.write(Bytes::from_static(b"c")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"c"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_the_stream() {
        let (mut writer, stream) = StreamTransportWriter::channel(4);
        writer.emit(StepEvent::Done).await.unwrap();
        writer.close();
        writer.close();
        assert!(writer.close_error().is_none());
        assert_eq!(
            writer.write(Bytes::from_static(b"late")).await,
            Err(TransportError::Closed)
        );

        let frames = collect(stream).await;
        assert_eq!(frames, vec![Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")]);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_token() {
        let (_writer, stream) = StreamTransportWriter::channel(4);
        let token = CancellationToken::new();
        let stream = stream.cancel_on_drop(token.clone());
        assert!(!token.is_cancelled());
        drop(stream);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_reader_fails_writes_and_is_recorded_on_close() {
        let (mut writer, stream) = StreamTransportWriter::channel(4);
        drop(stream);
        assert!(!writer.is_writable());
        assert_eq!(
            writer.emit(StepEvent::Connected).await,
            Err(TransportError::Closed)
        );
        writer.close();
        assert_eq!(writer.close_error(), Some(&TransportError::Closed));
    }
}
