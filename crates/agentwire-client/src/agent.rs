//! The producer contract and an in-process implementation.

use std::pin::Pin;
use std::sync::Arc;

use agentwire_event::{Event, RunAgentInput};
use async_trait::async_trait;
use futures::Stream;

use crate::AgentError;

/// The ordered event stream a producer yields for one run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, AgentError>> + Send>>;

/// A producer of agent runs.
///
/// Each call to [`Agent::run`] starts a fresh run and returns its event
/// stream. Implementations must not share run state across calls.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Start a run for the given input.
    async fn run(&self, input: RunAgentInput) -> Result<EventStream, AgentError>;
}

/// An in-process producer backed by a closure.
///
/// Useful for tests and for embedding an agent in the same process as
/// its consumer, with no transport in between.
#[derive(Clone)]
pub struct LocalAgent {
    produce: Arc<dyn Fn(RunAgentInput) -> EventStream + Send + Sync>,
}

impl LocalAgent {
    /// Wrap a closure that builds the event stream for each run.
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn(RunAgentInput) -> EventStream + Send + Sync + 'static,
    {
        Self {
            produce: Arc::new(produce),
        }
    }

    /// A producer that replays the same fixed event sequence on every run.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self::new(move |_input| {
            let events = events.clone();
            Box::pin(futures::stream::iter(events.into_iter().map(Ok)))
        })
    }
}

#[async_trait]
impl Agent for LocalAgent {
    async fn run(&self, input: RunAgentInput) -> Result<EventStream, AgentError> {
        Ok((self.produce)(input))
    }
}
