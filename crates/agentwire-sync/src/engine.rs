//! Run-scoped snapshot/delta state engine.

use agentwire_event::Event;
use serde_json::Value;
use tracing::trace;

use crate::{apply_patch, PatchOp, SyncError};

/// What a call to [`SyncEngine::apply`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The shared state document was replaced or patched.
    State,
    /// The message log was replaced.
    Messages,
    /// The event carried no state, nothing changed.
    Ignored,
}

/// Mirrors one run's shared state and message log on the client side.
///
/// Deltas are applied atomically: a failing patch leaves the committed
/// state exactly as it was, and the caller decides whether to keep
/// consuming the run or tear it down.
#[derive(Debug, Default)]
pub struct SyncEngine {
    state: Option<Value>,
    messages: Vec<Value>,
}

impl SyncEngine {
    /// Create an engine with no state and an empty message log.
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed state document, if any snapshot has arrived.
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    /// The committed message log.
    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    /// Fold one event into the mirrored state.
    ///
    /// Only the three state-carrying events do anything; every other event
    /// returns [`Applied::Ignored`].
    pub fn apply(&mut self, event: &Event) -> Result<Applied, SyncError> {
        match event {
            Event::StateSnapshot { snapshot, .. } => {
                trace!("state snapshot replaces committed state");
                self.state = Some(snapshot.clone());
                Ok(Applied::State)
            }
            Event::StateDelta { delta, .. } => {
                let Some(state) = &self.state else {
                    return Err(SyncError::NoState);
                };
                let ops: Vec<PatchOp> =
                    serde_json::from_value(Value::Array(delta.clone())).map_err(SyncError::from)?;
                let next = apply_patch(state, &ops)?;
                trace!(ops = ops.len(), "state delta committed");
                self.state = Some(next);
                Ok(Applied::State)
            }
            Event::MessagesSnapshot { messages, .. } => {
                trace!(count = messages.len(), "messages snapshot replaces log");
                self.messages = messages.clone();
                Ok(Applied::Messages)
            }
            _ => Ok(Applied::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_then_delta_builds_state() {
        let mut engine = SyncEngine::new();
        engine
            .apply(&Event::state_snapshot(json!({"count": 0, "items": []})))
            .unwrap();
        let applied = engine
            .apply(&Event::state_delta(vec![
                json!({"op": "replace", "path": "/count", "value": 1}),
                json!({"op": "add", "path": "/items/-", "value": "first"}),
            ]))
            .unwrap();
        assert_eq!(applied, Applied::State);
        assert_eq!(engine.state(), Some(&json!({"count": 1, "items": ["first"]})));
    }

    #[test]
    fn delta_before_snapshot_is_rejected() {
        let mut engine = SyncEngine::new();
        let err = engine
            .apply(&Event::state_delta(vec![
                json!({"op": "add", "path": "/x", "value": 1}),
            ]))
            .unwrap_err();
        assert!(matches!(err, SyncError::NoState));
        assert!(engine.state().is_none());
    }

    #[test]
    fn failed_delta_leaves_committed_state_untouched() {
        let mut engine = SyncEngine::new();
        engine
            .apply(&Event::state_snapshot(json!({"a": 1})))
            .unwrap();
        let err = engine
            .apply(&Event::state_delta(vec![
                json!({"op": "replace", "path": "/a", "value": 2}),
                json!({"op": "remove", "path": "/missing"}),
            ]))
            .unwrap_err();
        assert!(matches!(err, SyncError::PathNotFound { .. }));
        // Neither op of the failed delta is visible.
        assert_eq!(engine.state(), Some(&json!({"a": 1})));
    }

    #[test]
    fn later_snapshot_replaces_wholesale() {
        let mut engine = SyncEngine::new();
        engine
            .apply(&Event::state_snapshot(json!({"a": 1, "b": 2})))
            .unwrap();
        engine
            .apply(&Event::state_snapshot(json!({"c": 3})))
            .unwrap();
        assert_eq!(engine.state(), Some(&json!({"c": 3})));
    }

    #[test]
    fn messages_snapshot_replaces_log() {
        let mut engine = SyncEngine::new();
        engine
            .apply(&Event::messages_snapshot(vec![json!({"id": "m1"})]))
            .unwrap();
        engine
            .apply(&Event::messages_snapshot(vec![
                json!({"id": "m1"}),
                json!({"id": "m2"}),
            ]))
            .unwrap();
        assert_eq!(engine.messages().len(), 2);
    }

    #[test]
    fn non_state_events_are_ignored() {
        let mut engine = SyncEngine::new();
        let applied = engine
            .apply(&Event::text_message_content("m1", "hello"))
            .unwrap();
        assert_eq!(applied, Applied::Ignored);
        assert!(engine.state().is_none());
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn malformed_delta_entry_is_a_sync_error() {
        let mut engine = SyncEngine::new();
        engine.apply(&Event::state_snapshot(json!({}))).unwrap();
        let err = engine
            .apply(&Event::state_delta(vec![json!({"op": "squash", "path": "/x"})]))
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedPatch(_)));
    }
}
