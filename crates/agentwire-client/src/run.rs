//! Driving a run: verification, state sync, ordered delivery, cancellation.

use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use agentwire_event::{Event, RunAgentInput};
use agentwire_sync::{Applied, SyncEngine, SyncError};
use agentwire_verify::RunVerifier;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{Agent, Subscriber};

/// Tuning for a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Delivery channel capacity. The default of 1 keeps at most one event
    /// in flight, so wire reads pause while the consumer is busy.
    pub buffer: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { buffer: 1 }
    }
}

/// One delivery to the consumer.
#[derive(Debug)]
pub enum RunItem {
    /// A verified protocol event, in arrival order.
    Event(Event),
    /// A state delta was rejected; the run continues on last committed state.
    SyncError(SyncError),
    /// Acknowledgment that [`RunHandle::cancel`] took effect. Always the
    /// final delivery of a cancelled run.
    Cancelled,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunErrorInfo {
    /// Human-readable diagnosis.
    pub message: String,
    /// Machine-readable code, e.g. `protocol_violation`.
    pub code: Option<String>,
}

/// How a run ended. Resolved exactly once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// `RUN_FINISHED` arrived, with its optional result payload.
    Finished(Option<Value>),
    /// The run ended in an error, producer-sent or synthesized.
    Failed(RunErrorInfo),
    /// The consumer cancelled the run.
    Cancelled,
}

/// Committed state shared between the worker task and handle readers.
#[derive(Debug, Default)]
struct Mirror {
    engine: RwLock<SyncEngine>,
}

impl Mirror {
    fn apply(&self, event: &Event) -> Result<Applied, SyncError> {
        self.engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(event)
    }

    fn state(&self) -> Option<Value> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
            .cloned()
    }

    fn messages(&self) -> Vec<Value> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages()
            .to_vec()
    }
}

/// Start a run and return its handle.
///
/// A single worker task consumes the producer's stream: every event passes
/// the verifier, then the sync engine, then is delivered in order. A
/// protocol violation or transport failure turns into one synthetic
/// `RUN_ERROR` delivery, after which nothing else is delivered.
pub fn run_agent(agent: Arc<dyn Agent>, input: RunAgentInput, config: RunConfig) -> RunHandle {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let mirror = Arc::new(Mirror::default());

    let worker_cancel = cancel.clone();
    let worker_mirror = Arc::clone(&mirror);
    tokio::spawn(async move {
        let outcome = drive(agent, input, &tx, &worker_cancel, &worker_mirror).await;
        let _ = outcome_tx.send(outcome);
    });

    RunHandle {
        receiver: Some(rx),
        outcome: Some(outcome_rx),
        cancel,
        mirror,
    }
}

/// A live run.
///
/// Consume deliveries through [`events`](Self::events) or
/// [`subscribe`](Self::subscribe); read committed state at any point via
/// [`state`](Self::state) and [`messages`](Self::messages).
pub struct RunHandle {
    receiver: Option<mpsc::Receiver<RunItem>>,
    outcome: Option<oneshot::Receiver<RunOutcome>>,
    cancel: CancellationToken,
    mirror: Arc<Mirror>,
}

impl RunHandle {
    /// Stop the run: no further wire reads, the connection is dropped, and
    /// undelivered frames are discarded. The consumer receives a single
    /// [`RunItem::Cancelled`] acknowledgment, never a `RUN_ERROR`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The committed state document, if any snapshot has been applied.
    pub fn state(&self) -> Option<Value> {
        self.mirror.state()
    }

    /// The committed message log.
    pub fn messages(&self) -> Vec<Value> {
        self.mirror.messages()
    }

    /// Take the delivery stream. Subsequent calls yield an empty stream.
    pub fn events(&mut self) -> Pin<Box<dyn Stream<Item = RunItem> + Send>> {
        let receiver = self.receiver.take();
        Box::pin(async_stream::stream! {
            let Some(mut receiver) = receiver else { return };
            while let Some(item) = receiver.recv().await {
                yield item;
            }
        })
    }

    /// Drive the run to completion, dispatching every delivery to the
    /// subscriber's callbacks.
    pub async fn subscribe<S: Subscriber>(mut self, subscriber: &mut S) -> RunOutcome {
        let mut events = self.events();
        while let Some(item) = events.next().await {
            match item {
                RunItem::Event(event) => {
                    subscriber.on_event(&event);
                    match &event {
                        Event::RunFinished { result, .. } => subscriber.on_complete(result.as_ref()),
                        Event::RunError { message, code, .. } => subscriber.on_error(&RunErrorInfo {
                            message: message.clone(),
                            code: code.clone(),
                        }),
                        _ => {}
                    }
                }
                RunItem::SyncError(error) => subscriber.on_sync_error(&error),
                RunItem::Cancelled => subscriber.on_cancelled(),
            }
        }
        self.wait_outcome().await
    }

    /// Discard remaining deliveries and wait for the run's outcome.
    pub async fn finished(mut self) -> RunOutcome {
        let mut events = self.events();
        while events.next().await.is_some() {}
        self.wait_outcome().await
    }

    async fn wait_outcome(&mut self) -> RunOutcome {
        match self.outcome.take() {
            Some(receiver) => receiver.await.unwrap_or(RunOutcome::Cancelled),
            None => RunOutcome::Cancelled,
        }
    }
}

async fn drive(
    agent: Arc<dyn Agent>,
    input: RunAgentInput,
    tx: &mpsc::Sender<RunItem>,
    cancel: &CancellationToken,
    mirror: &Mirror,
) -> RunOutcome {
    let stream = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = tx.send(RunItem::Cancelled).await;
            return RunOutcome::Cancelled;
        }
        result = agent.run(input) => result,
    };
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            return fail(
                tx,
                cancel,
                RunErrorInfo {
                    message: err.to_string(),
                    code: Some("transport_error".to_string()),
                },
            )
            .await;
        }
    };

    let mut verifier = RunVerifier::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                // Dropping the stream drops the connection; whatever it had
                // buffered is discarded with it.
                drop(stream);
                let _ = tx.send(RunItem::Cancelled).await;
                return RunOutcome::Cancelled;
            }
            next = stream.next() => next,
        };

        match next {
            None => {
                return fail(
                    tx,
                    cancel,
                    RunErrorInfo {
                        message: "stream closed before a terminal event (incomplete run)"
                            .to_string(),
                        code: Some("incomplete_run".to_string()),
                    },
                )
                .await;
            }
            Some(Err(err)) => {
                return fail(
                    tx,
                    cancel,
                    RunErrorInfo {
                        message: err.to_string(),
                        code: Some("transport_error".to_string()),
                    },
                )
                .await;
            }
            Some(Ok(event)) => {
                if let Err(violation) = verifier.observe(&event) {
                    warn!(%violation, "terminating run");
                    return fail(
                        tx,
                        cancel,
                        RunErrorInfo {
                            message: violation.to_string(),
                            code: Some("protocol_violation".to_string()),
                        },
                    )
                    .await;
                }

                match mirror.apply(&event) {
                    Ok(_) => {
                        let terminal = match &event {
                            Event::RunFinished { result, .. } => {
                                Some(RunOutcome::Finished(result.clone()))
                            }
                            Event::RunError { message, code, .. } => {
                                Some(RunOutcome::Failed(RunErrorInfo {
                                    message: message.clone(),
                                    code: code.clone(),
                                }))
                            }
                            _ => None,
                        };
                        if !send(tx, cancel, RunItem::Event(event)).await {
                            return acknowledge_cancel(tx, cancel).await;
                        }
                        if let Some(outcome) = terminal {
                            return outcome;
                        }
                    }
                    Err(error) => {
                        warn!(%error, "state delta rejected, keeping last committed state");
                        if !send(tx, cancel, RunItem::SyncError(error)).await {
                            return acknowledge_cancel(tx, cancel).await;
                        }
                    }
                }
            }
        }
    }
}

/// The delivery that lost the race to cancellation is discarded, but the
/// consumer still gets its acknowledgment.
async fn acknowledge_cancel(tx: &mpsc::Sender<RunItem>, cancel: &CancellationToken) -> RunOutcome {
    if cancel.is_cancelled() {
        let _ = tx.send(RunItem::Cancelled).await;
    }
    RunOutcome::Cancelled
}

/// Deliver one synthetic `RUN_ERROR`, then close.
async fn fail(
    tx: &mpsc::Sender<RunItem>,
    cancel: &CancellationToken,
    info: RunErrorInfo,
) -> RunOutcome {
    let event = Event::run_error(info.message.clone(), info.code.clone());
    let _ = send(tx, cancel, RunItem::Event(event)).await;
    RunOutcome::Failed(info)
}

/// Bounded, cancellation-aware delivery. Returns false when the consumer
/// is gone or the run was cancelled while waiting for channel capacity.
async fn send(tx: &mpsc::Sender<RunItem>, cancel: &CancellationToken, item: RunItem) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        result = tx.send(item) => result.is_ok(),
    }
}
