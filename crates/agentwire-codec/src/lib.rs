//! Wire codecs for the agentwire event stream.
//!
//! Two encodings of the same logical [`Event`] model sit behind the
//! [`EventCodec`] interface: [`SseCodec`] frames one compact-JSON event per
//! server-sent-events record, [`BinaryCodec`] writes length-prefixed,
//! type-tagged binary frames. The two are independent implementations tied
//! together only by the round-trip equivalence property: decoding either
//! encoding of a sequence yields field-for-field equal events.

mod binary;
mod sse;

pub use binary::BinaryCodec;
pub use sse::SseCodec;

use agentwire_event::Event;
use bytes::Bytes;
use thiserror::Error;

/// Hard ceiling on a single frame, shared by both codecs.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Decode or encode failure. Always fatal to the run that owns the stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A frame arrived that cannot be interpreted.
    #[error("malformed frame: {detail}")]
    MalformedFrame {
        /// What was wrong with it.
        detail: String,
    },

    /// A frame announced a length above [`MAX_FRAME_LEN`].
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// A frame payload ended before its declared fields.
    #[error("truncated frame payload while reading {reading}")]
    TruncatedPayload { reading: &'static str },

    /// Frame text was not valid UTF-8.
    #[error("invalid utf-8 in frame: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedFrame {
            detail: detail.into(),
        }
    }
}

/// One wire representation of the event stream.
///
/// An encoder instance may be reused across events; a decoder instance owns
/// the partial-frame buffer for one connection and must see the byte stream
/// in order.
pub trait EventCodec: Send {
    /// Encode one event as a complete wire frame.
    fn encode(&mut self, event: &Event) -> Result<Bytes, CodecError>;

    /// Feed arbitrary bytes, draining every frame completed so far.
    ///
    /// Incomplete trailing bytes are buffered for the next call.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>, CodecError>;

    /// Bytes currently buffered awaiting frame completion.
    fn buffered(&self) -> usize;
}

/// Selects which codec a connection negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// Human-readable SSE text frames.
    #[default]
    Sse,
    /// Compact length-prefixed binary frames.
    Binary,
}

impl CodecKind {
    /// Media type used during transport negotiation.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Sse => "text/event-stream",
            Self::Binary => "application/vnd.agentwire.binary",
        }
    }

    /// Instantiate the codec for a new connection.
    pub fn codec(&self) -> Box<dyn EventCodec> {
        match self {
            Self::Sse => Box::new(SseCodec::new()),
            Self::Binary => Box::new(BinaryCodec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_event::Event;
    use serde_json::json;

    fn sample_sequence() -> Vec<Event> {
        vec![
            Event::run_started("t1", "r1").with_timestamp(1_723_000_000_001),
            Event::state_snapshot(json!({"count": 0, "items": []})),
            Event::step_started("plan"),
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "Hello "),
            Event::text_message_content("m1", "world — ünïcødé ✓"),
            Event::text_message_end("m1"),
            Event::tool_call_start("c1", "search", Some("m1".into())),
            Event::tool_call_args("c1", r#"{"query":"rust"}"#),
            Event::tool_call_end("c1"),
            Event::tool_call_result("m2", "c1", "3 results"),
            Event::state_delta(vec![json!({"op": "replace", "path": "/count", "value": 1})]),
            Event::messages_snapshot(vec![json!({"id": "m1", "role": "assistant"})]),
            Event::step_finished("plan"),
            Event::raw(json!({"vendor": true}), Some("upstream".into())),
            Event::custom("metric", json!({"latency_ms": 12.5}))
                .with_raw_event(json!({"origin": "upstream"})),
            Event::run_error("late failure", Some("E_PROVIDER".into())),
        ]
    }

    // The equivalence law: both codecs round-trip the same logical sequence
    // to identical model values.
    #[test]
    fn both_codecs_round_trip_identically() {
        let events = sample_sequence();
        for kind in [CodecKind::Sse, CodecKind::Binary] {
            let mut codec = kind.codec();
            let mut wire = Vec::new();
            for event in &events {
                wire.extend_from_slice(&codec.encode(event).unwrap());
            }
            let mut decoder = kind.codec();
            let decoded = decoder.feed(&wire).unwrap();
            assert_eq!(decoded, events, "{kind:?} round trip diverged");
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn byte_at_a_time_feeding_reassembles_frames() {
        let events = sample_sequence();
        for kind in [CodecKind::Sse, CodecKind::Binary] {
            let mut codec = kind.codec();
            let mut wire = Vec::new();
            for event in &events {
                wire.extend_from_slice(&codec.encode(event).unwrap());
            }
            let mut decoder = kind.codec();
            let mut decoded = Vec::new();
            for byte in wire {
                decoded.extend(decoder.feed(&[byte]).unwrap());
            }
            assert_eq!(decoded, events, "{kind:?} dribble decode diverged");
        }
    }

    #[test]
    fn content_types_differ() {
        assert_ne!(
            CodecKind::Sse.content_type(),
            CodecKind::Binary.content_type()
        );
    }
}
