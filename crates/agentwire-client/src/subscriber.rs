//! Consumer-side callbacks for a run.

use agentwire_event::Event;
use agentwire_sync::SyncError;
use serde_json::Value;

use crate::RunErrorInfo;

/// Callbacks invoked while a run is consumed via [`RunHandle::subscribe`].
///
/// `on_event` fires for every delivered event, terminals included. The
/// terminal callbacks fire at most once each and are mutually exclusive:
/// a run either completes, errors, or is cancelled.
///
/// [`RunHandle::subscribe`]: crate::RunHandle::subscribe
pub trait Subscriber: Send {
    /// A verified event was delivered.
    fn on_event(&mut self, event: &Event);

    /// A state delta could not be applied; committed state is unchanged
    /// and the run keeps going.
    fn on_sync_error(&mut self, _error: &SyncError) {}

    /// The run ended with an error, producer-sent or synthesized.
    fn on_error(&mut self, _error: &RunErrorInfo) {}

    /// The run finished successfully.
    fn on_complete(&mut self, _result: Option<&Value>) {}

    /// The consumer's cancellation was acknowledged.
    fn on_cancelled(&mut self) {}
}
