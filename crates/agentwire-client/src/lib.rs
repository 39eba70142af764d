//! Client runtime for agentwire runs.
//!
//! A [`RunHandle`] wraps one run of an [`Agent`] producer. The runtime
//! verifies every decoded event against the protocol state machine, folds
//! state events into a per-run [`SyncEngine`](agentwire_sync::SyncEngine)
//! mirror, and delivers events strictly in order through a bounded channel.
//! Producers can live in-process ([`LocalAgent`]) or behind an HTTP endpoint
//! ([`HttpAgent`]).

mod agent;
mod error;
mod http;
mod run;
mod subscriber;

pub use agent::{Agent, EventStream, LocalAgent};
pub use error::AgentError;
pub use http::HttpAgent;
pub use run::{run_agent, RunConfig, RunErrorInfo, RunHandle, RunItem, RunOutcome};
pub use subscriber::Subscriber;
