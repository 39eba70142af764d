//! Umbrella crate for the agentwire protocol runtime.
//!
//! A run streams typed events from a producer (an agent endpoint or an
//! in-process closure) to a consumer. The runtime verifies event order,
//! mirrors shared state from snapshots and deltas, and delivers everything
//! strictly in order with bounded buffering.
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentwire::event::RunAgentInput;
//! use agentwire::{run_agent, HttpAgent, RunConfig};
//!
//! # async fn demo() {
//! let agent = Arc::new(HttpAgent::new("https://example.com/agent"));
//! let input = RunAgentInput::new("thread_1", "run_1");
//! let handle = run_agent(agent, input, RunConfig::default());
//! # }
//! ```

pub use agentwire_client as client;
pub use agentwire_codec as codec;
pub use agentwire_event as event;
pub use agentwire_sync as sync;
pub use agentwire_verify as verify;

pub use agentwire_client::{
    run_agent, Agent, AgentError, HttpAgent, LocalAgent, RunConfig, RunHandle, RunItem,
    RunOutcome, Subscriber,
};
pub use agentwire_codec::{CodecKind, EventCodec};
pub use agentwire_event::{Event, EventType, RunAgentInput};
pub use agentwire_sync::SyncEngine;
pub use agentwire_verify::RunVerifier;
