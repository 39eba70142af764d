//! Text codec: one event per SSE frame, `data: <json>` records.

use agentwire_event::Event;
use bytes::Bytes;
use serde_json::Value;
use tracing::warn;

use crate::{CodecError, EventCodec, MAX_FRAME_LEN};

/// Server-sent-events codec.
///
/// Encoding writes one `data: <compact json>\n\n` record per event. Decoding
/// is an incremental parser: bytes accumulate until a blank line completes a
/// frame. Comment lines (leading `:`) and `[DONE]` sentinels are skipped.
/// Frames whose `type` is not a known event tag are preserved as raw
/// passthrough events instead of failing the stream.
#[derive(Debug, Default)]
pub struct SseCodec {
    // Raw bytes, validated as UTF-8 per complete frame: a chunk boundary
    // may fall inside a multi-byte character.
    buffer: Vec<u8>,
}

impl SseCodec {
    /// Create a codec with an empty decode buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_frame(&self, frame: &str) -> Result<Option<Event>, CodecError> {
        let Some(payload) = extract_data_payload(frame) else {
            // Comment-only or fieldless frame; SSE keepalives look like this.
            return Ok(None);
        };
        if payload.is_empty() || payload == "[DONE]" {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| CodecError::malformed(format!("frame body is not JSON: {e}")))?;

        match serde_json::from_value::<Event>(value.clone()) {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                // Only unknown/future event types stay on the stream as raw
                // passthrough. A known type that fails to parse is a corrupt
                // frame, and anything without a type discriminator is junk.
                match value.get("type").and_then(Value::as_str) {
                    Some(tag) if is_known_type(tag) => Err(CodecError::malformed(format!(
                        "invalid {tag} frame: {e}"
                    ))),
                    Some(tag) => {
                        warn!(tag, "unknown event type on SSE stream, passing through as RAW");
                        Ok(Some(Event::raw(value, Some("sse".to_string()))))
                    }
                    None => Err(CodecError::malformed(format!(
                        "frame has no type discriminator: {e}"
                    ))),
                }
            }
        }
    }
}

impl EventCodec for SseCodec {
    fn encode(&mut self, event: &Event) -> Result<Bytes, CodecError> {
        let json = serde_json::to_string(event)?;
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>, CodecError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(split) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame_bytes: Vec<u8> = self.buffer.drain(0..split + 2).collect();
            let frame = std::str::from_utf8(&frame_bytes[..split])?;
            if let Some(event) = self.decode_frame(frame)? {
                events.push(event);
            }
        }

        // The cap binds per frame: only what is still waiting for its
        // terminator counts, never an aggregate of already-drained frames.
        if self.buffer.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                len: self.buffer.len(),
                max: MAX_FRAME_LEN,
            });
        }
        Ok(events)
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn is_known_type(tag: &str) -> bool {
    serde_json::from_value::<agentwire_event::EventType>(Value::String(tag.to_string())).is_ok()
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
