//! End-to-end runtime behavior against in-process producers.

use std::sync::Arc;

use agentwire_client::{
    run_agent, Agent, AgentError, EventStream, LocalAgent, RunConfig, RunErrorInfo, RunItem,
    RunOutcome, Subscriber,
};
use agentwire_event::{Event, EventType, RunAgentInput};
use agentwire_sync::SyncError;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

fn input() -> RunAgentInput {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    RunAgentInput::new("t1", "r1")
}

fn happy_sequence() -> Vec<Event> {
    vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("m1"),
        Event::text_message_content("m1", "hello"),
        Event::text_message_content("m1", " world"),
        Event::text_message_end("m1"),
        Event::run_finished("t1", "r1", Some(json!({"answer": 42}))),
    ]
}

#[derive(Default)]
struct Recording {
    events: Vec<EventType>,
    completed: Vec<Option<Value>>,
    errors: Vec<RunErrorInfo>,
    sync_errors: Vec<String>,
    cancelled: bool,
}

impl Subscriber for Recording {
    fn on_event(&mut self, event: &Event) {
        self.events.push(event.event_type());
    }

    fn on_sync_error(&mut self, error: &SyncError) {
        self.sync_errors.push(error.to_string());
    }

    fn on_error(&mut self, error: &RunErrorInfo) {
        self.errors.push(error.clone());
    }

    fn on_complete(&mut self, result: Option<&Value>) {
        self.completed.push(result.cloned());
    }

    fn on_cancelled(&mut self) {
        self.cancelled = true;
    }
}

#[tokio::test]
async fn happy_path_delivers_in_order_and_completes_once() {
    let agent = Arc::new(LocalAgent::from_events(happy_sequence()));
    let handle = run_agent(agent, input(), RunConfig::default());

    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    assert_eq!(
        recording.events,
        vec![
            EventType::RunStarted,
            EventType::TextMessageStart,
            EventType::TextMessageContent,
            EventType::TextMessageContent,
            EventType::TextMessageEnd,
            EventType::RunFinished,
        ]
    );
    assert_eq!(recording.completed, vec![Some(json!({"answer": 42}))]);
    assert!(recording.errors.is_empty());
    assert!(!recording.cancelled);
    assert_eq!(outcome, RunOutcome::Finished(Some(json!({"answer": 42}))));
}

#[tokio::test]
async fn protocol_violation_yields_one_synthetic_run_error() {
    // Content for a message that was never started.
    let agent = Arc::new(LocalAgent::from_events(vec![
        Event::run_started("t1", "r1"),
        Event::text_message_content("m1", "orphan"),
        Event::text_message_end("m1"),
        Event::run_finished("t1", "r1", None),
    ]));
    let handle = run_agent(agent, input(), RunConfig::default());

    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    // The offending event and everything after it are withheld.
    assert_eq!(
        recording.events,
        vec![EventType::RunStarted, EventType::RunError]
    );
    assert_eq!(recording.errors.len(), 1);
    assert_eq!(
        recording.errors[0].code.as_deref(),
        Some("protocol_violation")
    );
    assert!(recording.completed.is_empty());
    assert!(matches!(outcome, RunOutcome::Failed(_)));
}

#[tokio::test]
async fn first_event_other_than_run_started_fails_immediately() {
    let agent = Arc::new(LocalAgent::from_events(vec![
        Event::text_message_start("m1"),
        Event::run_started("t1", "r1"),
    ]));
    let handle = run_agent(agent, input(), RunConfig::default());

    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    // Only the synthetic terminal is ever delivered.
    assert_eq!(recording.events, vec![EventType::RunError]);
    assert_eq!(recording.errors.len(), 1);
    assert!(matches!(outcome, RunOutcome::Failed(_)));
}

#[tokio::test]
async fn stream_ending_without_terminal_is_an_incomplete_run() {
    let agent = Arc::new(LocalAgent::from_events(vec![
        Event::run_started("t1", "r1"),
        Event::step_started("s1"),
    ]));
    let handle = run_agent(agent, input(), RunConfig::default());

    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    assert_eq!(recording.errors.len(), 1);
    assert_eq!(recording.errors[0].code.as_deref(), Some("incomplete_run"));
    match outcome {
        RunOutcome::Failed(info) => assert!(info.message.contains("incomplete")),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn producer_startup_failure_surfaces_as_run_error() {
    struct Broken;

    #[async_trait]
    impl Agent for Broken {
        async fn run(&self, _input: RunAgentInput) -> Result<EventStream, AgentError> {
            Err(AgentError::Producer("backend unavailable".to_string()))
        }
    }

    let handle = run_agent(Arc::new(Broken), input(), RunConfig::default());
    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    assert_eq!(recording.events, vec![EventType::RunError]);
    assert_eq!(recording.errors.len(), 1);
    assert!(matches!(outcome, RunOutcome::Failed(_)));
}

#[tokio::test]
async fn cancellation_acknowledges_without_error() {
    // A producer that starts a run and then hangs forever.
    let agent = Arc::new(LocalAgent::new(|_input| {
        let opening = vec![Ok(Event::run_started("t1", "r1"))];
        Box::pin(futures::stream::iter(opening).chain(futures::stream::pending()))
    }));
    let mut handle = run_agent(agent, input(), RunConfig::default());
    let mut events = handle.events();

    match events.next().await {
        Some(RunItem::Event(event)) => assert_eq!(event.event_type(), EventType::RunStarted),
        other => panic!("expected RUN_STARTED, got {other:?}"),
    }

    handle.cancel();

    // The acknowledgment is the final delivery; no RUN_ERROR follows.
    let mut saw_ack = false;
    while let Some(item) = events.next().await {
        match item {
            RunItem::Cancelled => saw_ack = true,
            RunItem::Event(event) => {
                panic!("unexpected delivery after cancel: {:?}", event.event_type())
            }
            RunItem::SyncError(error) => panic!("unexpected sync error: {error}"),
        }
    }
    assert!(saw_ack);
    assert_eq!(handle.finished().await, RunOutcome::Cancelled);
}

#[tokio::test]
async fn sync_error_is_reported_out_of_band_and_run_continues() {
    let agent = Arc::new(LocalAgent::from_events(vec![
        Event::run_started("t1", "r1"),
        Event::state_snapshot(json!({"count": 0})),
        // Rejected: the path does not exist.
        Event::state_delta(vec![json!({"op": "replace", "path": "/missing", "value": 1})]),
        // Still applied afterwards.
        Event::state_delta(vec![json!({"op": "replace", "path": "/count", "value": 7})]),
        Event::run_finished("t1", "r1", None),
    ]));
    let handle = run_agent(agent, input(), RunConfig::default());

    let mut recording = Recording::default();
    let outcome = handle.subscribe(&mut recording).await;

    assert_eq!(recording.sync_errors.len(), 1);
    assert_eq!(recording.completed.len(), 1);
    assert!(recording.errors.is_empty());
    assert_eq!(outcome, RunOutcome::Finished(None));
}

#[tokio::test]
async fn handle_exposes_committed_state_and_messages() {
    let agent = Arc::new(LocalAgent::from_events(vec![
        Event::run_started("t1", "r1"),
        Event::state_snapshot(json!({"progress": 0})),
        Event::state_delta(vec![json!({"op": "replace", "path": "/progress", "value": 100})]),
        Event::messages_snapshot(vec![json!({"id": "m1", "role": "assistant"})]),
        Event::run_finished("t1", "r1", None),
    ]));
    let mut handle = run_agent(agent, input(), RunConfig::default());

    let mut events = handle.events();
    while events.next().await.is_some() {}

    assert_eq!(handle.state(), Some(json!({"progress": 100})));
    assert_eq!(handle.messages(), vec![json!({"id": "m1", "role": "assistant"})]);
    assert_eq!(handle.finished().await, RunOutcome::Finished(None));
}

#[tokio::test]
async fn events_after_taking_the_stream_twice_yield_nothing() {
    let agent = Arc::new(LocalAgent::from_events(happy_sequence()));
    let mut handle = run_agent(agent, input(), RunConfig::default());

    let mut first = handle.events();
    let mut second = handle.events();
    assert!(second.next().await.is_none());

    let mut count = 0;
    while first.next().await.is_some() {
        count += 1;
    }
    assert_eq!(count, happy_sequence().len());
}

#[tokio::test]
async fn slow_consumer_still_sees_every_event_in_order() {
    let agent = Arc::new(LocalAgent::from_events(happy_sequence()));
    let mut handle = run_agent(agent, input(), RunConfig::default());

    let mut events = handle.events();
    let mut seen = Vec::new();
    while let Some(item) = events.next().await {
        // With a capacity-one channel the producer side waits here.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        if let RunItem::Event(event) = item {
            seen.push(event.event_type());
        }
    }
    assert_eq!(
        seen,
        happy_sequence()
            .iter()
            .map(Event::event_type)
            .collect::<Vec<_>>()
    );
}
