//! Typed event model for the agentwire streaming protocol.
//!
//! The [`Event`] enum is the single logical representation shared by every
//! transport encoding: a closed tagged union over the known protocol events
//! plus the `RAW`/`CUSTOM` escape hatches for forward-compatible signaling.
//! [`RunAgentInput`] is the producer-side invocation payload.

mod event;
mod id;
mod input;

pub use event::{BaseEvent, Event, EventType};
pub use id::{gen_message_id, gen_run_id, gen_thread_id, gen_tool_call_id};
pub use input::{ContextEntry, InputError, Message, Role, RunAgentInput, ToolDef};
