//! Binary codec: length-prefixed, type-tagged compact frames.
//!
//! Frame layout:
//!
//! ```text
//! +---------------------+----------------------------+
//! | length (u32, BE)    | payload                    |
//! +---------------------+----------------------------+
//! ```
//!
//! The payload is `[tag: u8][flags: u8][base fields][variant fields]`.
//! `flags` bit 0 marks a present timestamp (u64 unix ms), bit 1 a present
//! raw-event attachment. Strings and embedded JSON documents are u32
//! length-prefixed UTF-8. Unknown tags decode into raw passthrough events
//! with the payload preserved base64-encoded, so future producers never
//! break the stream.

use agentwire_event::{Event, EventType, Role};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::{json, Value};
use tracing::warn;

use crate::{CodecError, EventCodec, MAX_FRAME_LEN};

const FLAG_TIMESTAMP: u8 = 0b0000_0001;
const FLAG_RAW_EVENT: u8 = 0b0000_0010;

const TAG_RUN_STARTED: u8 = 0x01;
const TAG_RUN_FINISHED: u8 = 0x02;
const TAG_RUN_ERROR: u8 = 0x03;
const TAG_STEP_STARTED: u8 = 0x04;
const TAG_STEP_FINISHED: u8 = 0x05;
const TAG_TEXT_MESSAGE_START: u8 = 0x10;
const TAG_TEXT_MESSAGE_CONTENT: u8 = 0x11;
const TAG_TEXT_MESSAGE_END: u8 = 0x12;
const TAG_TOOL_CALL_START: u8 = 0x20;
const TAG_TOOL_CALL_ARGS: u8 = 0x21;
const TAG_TOOL_CALL_END: u8 = 0x22;
const TAG_TOOL_CALL_RESULT: u8 = 0x23;
const TAG_STATE_SNAPSHOT: u8 = 0x30;
const TAG_STATE_DELTA: u8 = 0x31;
const TAG_MESSAGES_SNAPSHOT: u8 = 0x32;
const TAG_RAW: u8 = 0x40;
const TAG_CUSTOM: u8 = 0x41;

fn tag_for(event_type: EventType) -> u8 {
    match event_type {
        EventType::RunStarted => TAG_RUN_STARTED,
        EventType::RunFinished => TAG_RUN_FINISHED,
        EventType::RunError => TAG_RUN_ERROR,
        EventType::StepStarted => TAG_STEP_STARTED,
        EventType::StepFinished => TAG_STEP_FINISHED,
        EventType::TextMessageStart => TAG_TEXT_MESSAGE_START,
        EventType::TextMessageContent => TAG_TEXT_MESSAGE_CONTENT,
        EventType::TextMessageEnd => TAG_TEXT_MESSAGE_END,
        EventType::ToolCallStart => TAG_TOOL_CALL_START,
        EventType::ToolCallArgs => TAG_TOOL_CALL_ARGS,
        EventType::ToolCallEnd => TAG_TOOL_CALL_END,
        EventType::ToolCallResult => TAG_TOOL_CALL_RESULT,
        EventType::StateSnapshot => TAG_STATE_SNAPSHOT,
        EventType::StateDelta => TAG_STATE_DELTA,
        EventType::MessagesSnapshot => TAG_MESSAGES_SNAPSHOT,
        EventType::Raw => TAG_RAW,
        EventType::Custom => TAG_CUSTOM,
    }
}

/// Length-prefixed binary codec.
#[derive(Debug, Default)]
pub struct BinaryCodec {
    buffer: BytesMut,
}

impl BinaryCodec {
    /// Create a codec with an empty decode buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventCodec for BinaryCodec {
    fn encode(&mut self, event: &Event) -> Result<Bytes, CodecError> {
        let mut payload = BytesMut::with_capacity(64);
        payload.put_u8(tag_for(event.event_type()));

        let base = event.base();
        let mut flags = 0u8;
        if base.timestamp.is_some() {
            flags |= FLAG_TIMESTAMP;
        }
        if base.raw_event.is_some() {
            flags |= FLAG_RAW_EVENT;
        }
        payload.put_u8(flags);
        if let Some(ts) = base.timestamp {
            payload.put_u64(ts);
        }
        if let Some(raw) = &base.raw_event {
            put_json(&mut payload, raw)?;
        }

        encode_variant_fields(&mut payload, event)?;

        if payload.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_u32(payload.len() as u32);
        frame.put_slice(&payload);
        Ok(frame.freeze())
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>, CodecError> {
        self.buffer.put_slice(bytes);

        let mut events = Vec::new();
        loop {
            if self.buffer.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;
            if len > MAX_FRAME_LEN {
                return Err(CodecError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }
            if self.buffer.len() < 4 + len {
                break;
            }
            self.buffer.advance(4);
            let payload = self.buffer.split_to(len).freeze();
            events.push(decode_payload(&payload)?);
        }
        Ok(events)
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn encode_variant_fields(buf: &mut BytesMut, event: &Event) -> Result<(), CodecError> {
    match event {
        Event::RunStarted {
            thread_id, run_id, ..
        } => {
            put_str(buf, thread_id);
            put_str(buf, run_id);
        }
        Event::RunFinished {
            thread_id,
            run_id,
            result,
            ..
        } => {
            put_str(buf, thread_id);
            put_str(buf, run_id);
            put_opt_json(buf, result.as_ref())?;
        }
        Event::RunError { message, code, .. } => {
            put_str(buf, message);
            put_opt_str(buf, code.as_deref());
        }
        Event::StepStarted { step_name, .. } | Event::StepFinished { step_name, .. } => {
            put_str(buf, step_name);
        }
        Event::TextMessageStart {
            message_id, role, ..
        } => {
            put_str(buf, message_id);
            buf.put_u8(role_byte(*role));
        }
        Event::TextMessageContent {
            message_id, delta, ..
        } => {
            put_str(buf, message_id);
            put_str(buf, delta);
        }
        Event::TextMessageEnd { message_id, .. } => {
            put_str(buf, message_id);
        }
        Event::ToolCallStart {
            tool_call_id,
            tool_call_name,
            parent_message_id,
            ..
        } => {
            put_str(buf, tool_call_id);
            put_str(buf, tool_call_name);
            put_opt_str(buf, parent_message_id.as_deref());
        }
        Event::ToolCallArgs {
            tool_call_id,
            delta,
            ..
        } => {
            put_str(buf, tool_call_id);
            put_str(buf, delta);
        }
        Event::ToolCallEnd { tool_call_id, .. } => {
            put_str(buf, tool_call_id);
        }
        Event::ToolCallResult {
            message_id,
            tool_call_id,
            content,
            role,
            ..
        } => {
            put_str(buf, message_id);
            put_str(buf, tool_call_id);
            put_str(buf, content);
            match role {
                Some(role) => {
                    buf.put_u8(1);
                    buf.put_u8(role_byte(*role));
                }
                None => buf.put_u8(0),
            }
        }
        Event::StateSnapshot { snapshot, .. } => {
            put_json(buf, snapshot)?;
        }
        Event::StateDelta { delta, .. } => {
            put_json(buf, &Value::Array(delta.clone()))?;
        }
        Event::MessagesSnapshot { messages, .. } => {
            put_json(buf, &Value::Array(messages.clone()))?;
        }
        Event::Raw { event, source, .. } => {
            put_json(buf, event)?;
            put_opt_str(buf, source.as_deref());
        }
        Event::Custom { name, value, .. } => {
            put_str(buf, name);
            put_json(buf, value)?;
        }
    }
    Ok(())
}

fn decode_payload(payload: &Bytes) -> Result<Event, CodecError> {
    let mut reader = Reader::new(payload);
    let tag = reader.get_u8("tag")?;

    if !is_known_tag(tag) {
        // Preserve the payload verbatim so nothing is lost across hops.
        warn!(tag, "unknown binary event tag, passing through as RAW");
        return Ok(Event::raw(
            json!({
                "tag": tag,
                "payload": BASE64.encode(reader.rest()),
            }),
            Some("binary".to_string()),
        ));
    }

    let flags = reader.get_u8("flags")?;
    let timestamp = if flags & FLAG_TIMESTAMP != 0 {
        Some(reader.get_u64("timestamp")?)
    } else {
        None
    };
    let raw_event = if flags & FLAG_RAW_EVENT != 0 {
        Some(reader.get_json("rawEvent")?)
    } else {
        None
    };

    let mut event = decode_variant_fields(tag, &mut reader)?;
    if reader.remaining() != 0 {
        return Err(CodecError::malformed(format!(
            "{} trailing bytes after frame fields",
            reader.remaining()
        )));
    }
    if let Some(ts) = timestamp {
        event = event.with_timestamp(ts);
    }
    if let Some(raw) = raw_event {
        event = event.with_raw_event(raw);
    }
    Ok(event)
}

fn decode_variant_fields(tag: u8, reader: &mut Reader<'_>) -> Result<Event, CodecError> {
    let event = match tag {
        TAG_RUN_STARTED => {
            let thread_id = reader.get_str("threadId")?;
            let run_id = reader.get_str("runId")?;
            Event::run_started(thread_id, run_id)
        }
        TAG_RUN_FINISHED => {
            let thread_id = reader.get_str("threadId")?;
            let run_id = reader.get_str("runId")?;
            let result = reader.get_opt_json("result")?;
            Event::run_finished(thread_id, run_id, result)
        }
        TAG_RUN_ERROR => {
            let message = reader.get_str("message")?;
            let code = reader.get_opt_str("code")?;
            Event::run_error(message, code)
        }
        TAG_STEP_STARTED => Event::step_started(reader.get_str("stepName")?),
        TAG_STEP_FINISHED => Event::step_finished(reader.get_str("stepName")?),
        TAG_TEXT_MESSAGE_START => {
            let message_id = reader.get_str("messageId")?;
            let role = role_from_byte(reader.get_u8("role")?)?;
            Event::TextMessageStart {
                message_id,
                role,
                base: Default::default(),
            }
        }
        TAG_TEXT_MESSAGE_CONTENT => {
            let message_id = reader.get_str("messageId")?;
            let delta = reader.get_str("delta")?;
            Event::text_message_content(message_id, delta)
        }
        TAG_TEXT_MESSAGE_END => Event::text_message_end(reader.get_str("messageId")?),
        TAG_TOOL_CALL_START => {
            let tool_call_id = reader.get_str("toolCallId")?;
            let tool_call_name = reader.get_str("toolCallName")?;
            let parent_message_id = reader.get_opt_str("parentMessageId")?;
            Event::tool_call_start(tool_call_id, tool_call_name, parent_message_id)
        }
        TAG_TOOL_CALL_ARGS => {
            let tool_call_id = reader.get_str("toolCallId")?;
            let delta = reader.get_str("delta")?;
            Event::tool_call_args(tool_call_id, delta)
        }
        TAG_TOOL_CALL_END => Event::tool_call_end(reader.get_str("toolCallId")?),
        TAG_TOOL_CALL_RESULT => {
            let message_id = reader.get_str("messageId")?;
            let tool_call_id = reader.get_str("toolCallId")?;
            let content = reader.get_str("content")?;
            let role = if reader.get_u8("role presence")? != 0 {
                Some(role_from_byte(reader.get_u8("role")?)?)
            } else {
                None
            };
            Event::ToolCallResult {
                message_id,
                tool_call_id,
                content,
                role,
                base: Default::default(),
            }
        }
        TAG_STATE_SNAPSHOT => Event::state_snapshot(reader.get_json("snapshot")?),
        TAG_STATE_DELTA => Event::state_delta(reader.get_json_array("delta")?),
        TAG_MESSAGES_SNAPSHOT => Event::messages_snapshot(reader.get_json_array("messages")?),
        TAG_RAW => {
            let event = reader.get_json("event")?;
            let source = reader.get_opt_str("source")?;
            Event::raw(event, source)
        }
        TAG_CUSTOM => {
            let name = reader.get_str("name")?;
            let value = reader.get_json("value")?;
            Event::custom(name, value)
        }
        _ => unreachable!("tag checked by is_known_tag"),
    };
    Ok(event)
}

fn is_known_tag(tag: u8) -> bool {
    matches!(
        tag,
        TAG_RUN_STARTED
            | TAG_RUN_FINISHED
            | TAG_RUN_ERROR
            | TAG_STEP_STARTED
            | TAG_STEP_FINISHED
            | TAG_TEXT_MESSAGE_START
            | TAG_TEXT_MESSAGE_CONTENT
            | TAG_TEXT_MESSAGE_END
            | TAG_TOOL_CALL_START
            | TAG_TOOL_CALL_ARGS
            | TAG_TOOL_CALL_END
            | TAG_TOOL_CALL_RESULT
            | TAG_STATE_SNAPSHOT
            | TAG_STATE_DELTA
            | TAG_MESSAGES_SNAPSHOT
            | TAG_RAW
            | TAG_CUSTOM
    )
}

fn role_byte(role: Role) -> u8 {
    match role {
        Role::System => 0,
        Role::Assistant => 1,
        Role::User => 2,
        Role::Tool => 3,
    }
}

fn role_from_byte(byte: u8) -> Result<Role, CodecError> {
    match byte {
        0 => Ok(Role::System),
        1 => Ok(Role::Assistant),
        2 => Ok(Role::User),
        3 => Ok(Role::Tool),
        other => Err(CodecError::malformed(format!("unknown role byte {other}"))),
    }
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_opt_str(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.put_u8(1);
            put_str(buf, s);
        }
        None => buf.put_u8(0),
    }
}

fn put_json(buf: &mut BytesMut, value: &Value) -> Result<(), CodecError> {
    let bytes = serde_json::to_vec(value)?;
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(&bytes);
    Ok(())
}

fn put_opt_json(buf: &mut BytesMut, value: Option<&Value>) -> Result<(), CodecError> {
    match value {
        Some(value) => {
            buf.put_u8(1);
            put_json(buf, value)
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

/// Bounds-checked cursor over one frame payload.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, n: usize, reading: &'static str) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::TruncatedPayload { reading });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn get_u8(&mut self, reading: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, reading)?[0])
    }

    fn get_u64(&mut self, reading: &'static str) -> Result<u64, CodecError> {
        let mut bytes = self.take(8, reading)?;
        Ok(bytes.get_u64())
    }

    fn get_str(&mut self, reading: &'static str) -> Result<String, CodecError> {
        let len = self.get_len(reading)?;
        let bytes = self.take(len, reading)?;
        Ok(std::str::from_utf8(bytes)?.to_string())
    }

    fn get_opt_str(&mut self, reading: &'static str) -> Result<Option<String>, CodecError> {
        if self.get_u8(reading)? != 0 {
            Ok(Some(self.get_str(reading)?))
        } else {
            Ok(None)
        }
    }

    fn get_json(&mut self, reading: &'static str) -> Result<Value, CodecError> {
        let len = self.get_len(reading)?;
        let bytes = self.take(len, reading)?;
        Ok(serde_json::from_slice(bytes)?)
    }

    fn get_opt_json(&mut self, reading: &'static str) -> Result<Option<Value>, CodecError> {
        if self.get_u8(reading)? != 0 {
            Ok(Some(self.get_json(reading)?))
        } else {
            Ok(None)
        }
    }

    fn get_json_array(&mut self, reading: &'static str) -> Result<Vec<Value>, CodecError> {
        match self.get_json(reading)? {
            Value::Array(items) => Ok(items),
            other => Err(CodecError::malformed(format!(
                "expected JSON array for {reading}, got {other}"
            ))),
        }
    }

    fn get_len(&mut self, reading: &'static str) -> Result<usize, CodecError> {
        let mut bytes = self.take(4, reading)?;
        let len = bytes.get_u32() as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(event: Event) -> Event {
        let mut codec = BinaryCodec::new();
        let frame = codec.encode(&event).unwrap();
        let mut decoded = codec.feed(&frame).unwrap();
        assert_eq!(decoded.len(), 1);
        decoded.pop().unwrap()
    }

    #[test]
    fn frame_is_length_prefixed_and_tagged() {
        let mut codec = BinaryCodec::new();
        let frame = codec.encode(&Event::step_started("plan")).unwrap();
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(frame[4], TAG_STEP_STARTED);
        assert_eq!(frame[5], 0); // no base flags
    }

    #[test]
    fn optional_fields_round_trip_in_both_states() {
        let with = Event::tool_call_start("c1", "search", Some("m1".into()))
            .with_timestamp(1_723_456_789_012);
        let without = Event::tool_call_start("c1", "search", None);
        assert_eq!(round_trip(with.clone()), with);
        assert_eq!(round_trip(without.clone()), without);
    }

    #[test]
    fn timestamp_keeps_millisecond_precision() {
        let event = Event::text_message_end("m1").with_timestamp(1_723_456_789_999);
        assert_eq!(round_trip(event).base().timestamp, Some(1_723_456_789_999));
    }

    #[test]
    fn unknown_tag_decodes_to_raw_with_payload_preserved() {
        let mut frame = BytesMut::new();
        let payload = [0x7Fu8, 0xDE, 0xAD, 0xBE, 0xEF];
        frame.put_u32(payload.len() as u32);
        frame.put_slice(&payload);

        let mut codec = BinaryCodec::new();
        let events = codec.feed(&frame).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Raw { event, source, .. } => {
                assert_eq!(event["tag"], 0x7F);
                assert_eq!(event["payload"], BASE64.encode([0xDEu8, 0xAD, 0xBE, 0xEF]));
                assert_eq!(source.as_deref(), Some("binary"));
            }
            other => panic!("expected RAW, got {:?}", other.event_type()),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        // Announces a 10-byte string but provides 2.
        let mut payload = BytesMut::new();
        payload.put_u8(TAG_STEP_STARTED);
        payload.put_u8(0);
        payload.put_u32(10);
        payload.put_slice(b"ab");

        let mut frame = BytesMut::new();
        frame.put_u32(payload.len() as u32);
        frame.put_slice(&payload);

        let mut codec = BinaryCodec::new();
        let err = codec.feed(&frame).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedPayload { .. }));
    }

    #[test]
    fn trailing_garbage_in_frame_is_rejected() {
        let mut codec = BinaryCodec::new();
        let good = codec.encode(&Event::text_message_end("m1")).unwrap();
        let mut payload = good[4..].to_vec();
        payload.push(0xFF);

        let mut frame = BytesMut::new();
        frame.put_u32(payload.len() as u32);
        frame.put_slice(&payload);

        let err = codec.feed(&frame).unwrap_err();
        assert!(matches!(err, CodecError::MalformedFrame { .. }));
    }

    #[test]
    fn oversized_length_prefix_fails_fast() {
        let mut frame = BytesMut::new();
        frame.put_u32((MAX_FRAME_LEN + 1) as u32);
        let mut codec = BinaryCodec::new();
        let err = codec.feed(&frame).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn incomplete_frame_waits_without_error() {
        let mut codec = BinaryCodec::new();
        let frame = codec.encode(&Event::run_started("t", "r")).unwrap();
        assert!(codec.feed(&frame[..frame.len() - 1]).unwrap().is_empty());
        assert!(codec.buffered() > 0);
        let events = codec.feed(&frame[frame.len() - 1..]).unwrap();
        assert_eq!(events, vec![Event::run_started("t", "r")]);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut codec = BinaryCodec::new();
        let mut wire = Vec::new();
        let events = vec![
            Event::run_started("t", "r"),
            Event::state_snapshot(serde_json::json!({"k": [1, 2, 3]})),
            Event::run_finished("t", "r", Some(serde_json::json!({"ok": true}))),
        ];
        for event in &events {
            wire.extend_from_slice(&codec.encode(event).unwrap());
        }
        assert_eq!(codec.feed(&wire).unwrap(), events);
    }
}
