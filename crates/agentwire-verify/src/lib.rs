//! Run state machine: enforces which event sequences are legal for one run.
//!
//! One [`RunVerifier`] instance covers exactly one run. Every decoded event
//! is passed through [`RunVerifier::observe`] in arrival order; the first
//! illegal event produces a [`ProtocolViolation`] describing what arrived,
//! what was expected, and the verifier state at that point. Verifiers share
//! nothing between runs.

use agentwire_event::{Event, EventType};
use thiserror::Error;
use tracing::trace;

/// Where a run currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// No event observed yet; only `RUN_STARTED` is legal.
    #[default]
    Pending,
    /// Between `RUN_STARTED` and a terminal event.
    Active,
    /// A terminal event was observed; nothing further is legal.
    Finished,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Active => f.write_str("active"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

/// An event arrived in a position the run state machine disallows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("protocol violation ({phase} run): received {received}, expected {expected}")]
pub struct ProtocolViolation {
    /// Type of the offending event.
    pub received: EventType,
    /// What would have been legal instead.
    pub expected: String,
    /// Verifier phase when the event arrived.
    pub phase: RunPhase,
}

impl ProtocolViolation {
    fn new(received: EventType, expected: impl Into<String>, phase: RunPhase) -> Self {
        Self {
            received,
            expected: expected.into(),
            phase,
        }
    }
}

/// Finite-state validator for one run's event stream.
#[derive(Debug, Default)]
pub struct RunVerifier {
    phase: RunPhase,
    run_id: Option<String>,
    open_step: Option<String>,
    open_message: Option<String>,
    open_tool_call: Option<String>,
}

impl RunVerifier {
    /// Create a verifier awaiting a run's first event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    /// True once a terminal event has been observed.
    pub fn is_finished(&self) -> bool {
        self.phase == RunPhase::Finished
    }

    /// Run id captured from `RUN_STARTED`, if observed.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Validate one event against the current state, advancing on success.
    ///
    /// On violation the verifier does not advance; the caller decides whether
    /// to terminate the run (the client runtime always does).
    pub fn observe(&mut self, event: &Event) -> Result<(), ProtocolViolation> {
        let received = event.event_type();
        trace!(
            phase = %self.phase,
            event_type = %received,
            "verifier observing event"
        );

        match self.phase {
            RunPhase::Pending => self.observe_pending(event, received),
            RunPhase::Active => self.observe_active(event, received),
            RunPhase::Finished => Err(ProtocolViolation::new(
                received,
                "no events after the terminal event",
                RunPhase::Finished,
            )),
        }
    }

    fn observe_pending(
        &mut self,
        event: &Event,
        received: EventType,
    ) -> Result<(), ProtocolViolation> {
        match event {
            Event::RunStarted { run_id, .. } => {
                self.run_id = Some(run_id.clone());
                self.phase = RunPhase::Active;
                Ok(())
            }
            _ => Err(ProtocolViolation::new(
                received,
                "RUN_STARTED as the first event of the run",
                RunPhase::Pending,
            )),
        }
    }

    fn observe_active(
        &mut self,
        event: &Event,
        received: EventType,
    ) -> Result<(), ProtocolViolation> {
        match event {
            Event::RunStarted { .. } => Err(self.violation(
                received,
                "RUN_STARTED only once, as the first event",
            )),

            // RUN_ERROR may interrupt anything; RUN_FINISHED requires all
            // streamed entities to be closed first.
            Event::RunError { .. } => {
                self.phase = RunPhase::Finished;
                Ok(())
            }
            Event::RunFinished { .. } => {
                if let Some(id) = &self.open_message {
                    return Err(self.violation(
                        received,
                        format!("TEXT_MESSAGE_END for open message {id} before RUN_FINISHED"),
                    ));
                }
                if let Some(id) = &self.open_tool_call {
                    return Err(self.violation(
                        received,
                        format!("TOOL_CALL_END for open tool call {id} before RUN_FINISHED"),
                    ));
                }
                if let Some(name) = &self.open_step {
                    return Err(self.violation(
                        received,
                        format!("STEP_FINISHED for open step {name} before RUN_FINISHED"),
                    ));
                }
                self.phase = RunPhase::Finished;
                Ok(())
            }

            Event::StepStarted { step_name, .. } => match &self.open_step {
                Some(open) => Err(self.violation(
                    received,
                    format!("STEP_FINISHED for step {open} before another STEP_STARTED"),
                )),
                None => {
                    self.open_step = Some(step_name.clone());
                    Ok(())
                }
            },
            Event::StepFinished { step_name, .. } => match self.open_step.as_deref() {
                Some(open) if open == step_name => {
                    self.open_step = None;
                    Ok(())
                }
                Some(open) => Err(self.violation(
                    received,
                    format!("STEP_FINISHED for the open step {open}, not {step_name}"),
                )),
                None => Err(self.violation(received, "STEP_STARTED before STEP_FINISHED")),
            },

            Event::TextMessageStart { message_id, .. } => match &self.open_message {
                Some(open) => Err(self.violation(
                    received,
                    format!("TEXT_MESSAGE_END for message {open} before a new TEXT_MESSAGE_START"),
                )),
                None => {
                    self.open_message = Some(message_id.clone());
                    Ok(())
                }
            },
            Event::TextMessageContent { message_id, .. } => {
                self.require_open_message(received, message_id)
            }
            Event::TextMessageEnd { message_id, .. } => {
                self.require_open_message(received, message_id)?;
                self.open_message = None;
                Ok(())
            }

            Event::ToolCallStart { tool_call_id, .. } => match &self.open_tool_call {
                Some(open) => Err(self.violation(
                    received,
                    format!("TOOL_CALL_END for tool call {open} before a new TOOL_CALL_START"),
                )),
                None => {
                    self.open_tool_call = Some(tool_call_id.clone());
                    Ok(())
                }
            },
            Event::ToolCallArgs { tool_call_id, .. } => {
                self.require_open_tool_call(received, tool_call_id)
            }
            Event::ToolCallEnd { tool_call_id, .. } => {
                self.require_open_tool_call(received, tool_call_id)?;
                self.open_tool_call = None;
                Ok(())
            }

            // Results, state events, and the escape hatches are legal at any
            // point in an active run and do not touch streamed openness.
            Event::ToolCallResult { .. }
            | Event::StateSnapshot { .. }
            | Event::StateDelta { .. }
            | Event::MessagesSnapshot { .. }
            | Event::Raw { .. }
            | Event::Custom { .. } => Ok(()),
        }
    }

    fn require_open_message(
        &self,
        received: EventType,
        message_id: &str,
    ) -> Result<(), ProtocolViolation> {
        match self.open_message.as_deref() {
            Some(open) if open == message_id => Ok(()),
            Some(open) => Err(self.violation(
                received,
                format!("an event for the open message {open}, not {message_id}"),
            )),
            None => Err(self.violation(
                received,
                format!("TEXT_MESSAGE_START for message {message_id} first"),
            )),
        }
    }

    fn require_open_tool_call(
        &self,
        received: EventType,
        tool_call_id: &str,
    ) -> Result<(), ProtocolViolation> {
        match self.open_tool_call.as_deref() {
            Some(open) if open == tool_call_id => Ok(()),
            Some(open) => Err(self.violation(
                received,
                format!("an event for the open tool call {open}, not {tool_call_id}"),
            )),
            None => Err(self.violation(
                received,
                format!("TOOL_CALL_START for tool call {tool_call_id} first"),
            )),
        }
    }

    fn violation(&self, received: EventType, expected: impl Into<String>) -> ProtocolViolation {
        ProtocolViolation::new(received, expected, self.phase.clone())
    }
}
