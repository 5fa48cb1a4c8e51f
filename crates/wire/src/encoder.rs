//! StepEvent → wire frame.

use bytes::{BufMut, Bytes, BytesMut};
use turnstream_core::StepEvent;

/// Literal prefix of every frame.
pub const DATA_PREFIX: &[u8] = b"data: ";

/// Terminator of every frame.
pub const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Serializes step events into frames. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStreamEncoder;

impl EventStreamEncoder {
    /// Encode one event as `data: <json>\n\n`.
    ///
    /// Compact JSON never contains a raw newline, so the delimiter cannot
    /// occur inside the payload.
    pub fn encode(&self, event: &StepEvent) -> Result<Bytes, serde_json::Error> {
        let json = serde_json::to_vec(event)?;
        let mut frame = BytesMut::with_capacity(DATA_PREFIX.len() + json.len() + FRAME_DELIMITER.len());
        frame.put_slice(DATA_PREFIX);
        frame.put_slice(&json);
        frame.put_slice(FRAME_DELIMITER);
        Ok(frame.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_connected_frame() {
        let frame = EventStreamEncoder.encode(&StepEvent::Connected).unwrap();
        assert_eq!(&frame[..], b"data: {\"type\":\"connected\"}\n\n");
    }

    #[test]
    fn encodes_token_frame() {
        let frame = EventStreamEncoder
            .encode(&StepEvent::Token {
                token: "Hello".into(),
            })
            .unwrap();
        assert_eq!(&frame[..], b"data: {\"type\":\"token\",\"token\":\"Hello\"}\n\n");
    }

    #[test]
    fn newlines_in_payload_are_escaped() {
        let frame = EventStreamEncoder
            .encode(&StepEvent::Token {
                token: "line one\n\nline two".into(),
            })
            .unwrap();
        let body = &frame[DATA_PREFIX.len()..frame.len() - FRAME_DELIMITER.len()];
        assert!(!body.windows(2).any(|w| w == FRAME_DELIMITER));
        assert!(frame.ends_with(FRAME_DELIMITER));
    }

    #[test]
    fn encodes_error_frame() {
        let frame = EventStreamEncoder
            .encode(&StepEvent::Error {
                error: "model unavailable".into(),
            })
            .unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains(r#""type":"error""#));
        assert!(text.contains(r#""error":"model unavailable""#));
    }
}
