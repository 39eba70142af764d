//! Identifier helpers for runs, threads, messages, and tool calls.

use uuid::Uuid;

fn gen_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Generate a run identifier.
pub fn gen_run_id() -> String {
    gen_id("run")
}

/// Generate a thread identifier.
pub fn gen_thread_id() -> String {
    gen_id("thread")
}

/// Generate a message identifier.
pub fn gen_message_id() -> String {
    gen_id("msg")
}

/// Generate a tool-call identifier.
pub fn gen_tool_call_id() -> String {
    gen_id("call")
}
