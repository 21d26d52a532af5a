use async_trait::async_trait;
use palette::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use palette::event::{EventHandler, TeamEvent};
use palette::governor::estimate_transcript_tokens;
use palette::{
    ResetTrigger, Roster, RosterHandle, TeamError, TerminationCondition, TokenGovernor, Worker,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FixedClient {
    reply: String,
    calls: AtomicUsize,
}

impl FixedClient {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClientWrapper for FixedClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Message::new(Role::Assistant, &self.reply))
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

struct BrokenClient;

#[async_trait]
impl ClientWrapper for BrokenClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ClientError> {
        Err("rate limit reached".into())
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<TeamEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_team_event(&self, event: &TeamEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn handle_with(
    coder: Arc<dyn ClientWrapper>,
    critic: Arc<dyn ClientWrapper>,
    recorder: Option<Arc<Recorder>>,
) -> Arc<RosterHandle> {
    let roster = Roster::new(vec![
        Worker::new("coder", "writes code", "You write code.", coder),
        Worker::new("critic", "reviews code", "Say APPROVE when done.", critic),
    ])
    .unwrap();
    Arc::new(RosterHandle::new(
        Arc::new(roster),
        TerminationCondition::text_mention("APPROVE"),
        recorder.map(|r| r as Arc<dyn EventHandler>),
    ))
}

#[tokio::test]
async fn test_threshold_one_makes_exactly_three_attempts() {
    let coder = FixedClient::new("here is the code");
    let critic = FixedClient::new("APPROVE");
    let recorder = Arc::new(Recorder::default());
    let handle = handle_with(coder.clone(), critic.clone(), Some(recorder.clone()));

    let governor = TokenGovernor::new(Arc::clone(&handle), 1).with_event_handler(recorder.clone());
    let result = governor.execute("solve it", "run-1").await.unwrap();

    assert_eq!(result.attempts, 3);
    assert!(result.token_estimate >= 1);
    assert_eq!(result.transcript.len(), 3);
    assert!(result.input_rejection.is_none());
    assert_eq!(coder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(critic.calls.load(Ordering::SeqCst), 3);

    let events = recorder.events.lock().unwrap();
    let resets: Vec<ResetTrigger> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::RosterReset { trigger, .. } => Some(trigger.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        resets,
        vec![
            ResetTrigger::NewRun,
            ResetTrigger::TokenBudget { attempt: 1 },
            ResetTrigger::TokenBudget { attempt: 2 },
        ]
    );
    let attempts = events
        .iter()
        .filter(|e| matches!(e, TeamEvent::AttemptCompleted { over_threshold: true, .. }))
        .count();
    assert_eq!(attempts, 3);
    assert!(events
        .iter()
        .any(|e| matches!(e, TeamEvent::BudgetExhausted { attempts: 3, .. })));
}

#[tokio::test]
async fn test_under_threshold_returns_first_attempt() {
    let handle = handle_with(FixedClient::new("x y"), FixedClient::new("APPROVE"), None);
    let governor = TokenGovernor::new(Arc::clone(&handle), 1000);

    let result = governor.execute("a b c", "run-2").await.unwrap();

    // "a b c x y APPROVE" → 6 words → 7.8 → 8
    assert_eq!(result.attempts, 1);
    assert_eq!(result.token_estimate, 8);
    assert_eq!(estimate_transcript_tokens(&result.transcript), 8);
    assert_eq!(handle.generation(), 1);
}

#[tokio::test]
async fn test_estimate_at_threshold_counts_as_over() {
    // Same conversation as above estimates to exactly 8.
    let handle = handle_with(FixedClient::new("x y"), FixedClient::new("APPROVE"), None);
    let governor = TokenGovernor::new(Arc::clone(&handle), 8).with_max_attempts(2);

    let result = governor.execute("a b c", "run-3").await.unwrap();
    assert_eq!(result.attempts, 2);
    assert_eq!(result.token_estimate, 8);
}

#[tokio::test]
async fn test_worker_failure_is_not_retried() {
    let coder = FixedClient::new("draft");
    let handle = handle_with(coder.clone(), Arc::new(BrokenClient), None);
    let governor = TokenGovernor::new(Arc::clone(&handle), 1);

    let err = governor.execute("task", "run-4").await.unwrap_err();
    assert!(matches!(err, TeamError::WorkerInvocation { ref worker, .. } if worker == "critic"));
    assert_eq!(coder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.generation(), 1);
}

#[tokio::test]
async fn test_reset_rebuilds_structurally_identical_scheduler() {
    let handle = handle_with(FixedClient::new("x"), FixedClient::new("APPROVE"), None);
    let governor = TokenGovernor::new(Arc::clone(&handle), 1000);
    governor.execute("first task", "run-5").await.unwrap();

    let before = handle.current();
    assert_eq!(before.transcript().len(), 3);

    let after = handle.reset(ResetTrigger::Manual).await;
    assert!(after.transcript().is_empty());
    assert_eq!(after.roster().names(), before.roster().names());
    assert_eq!(after.generation(), before.generation() + 1);
    // The replaced scheduler keeps its own transcript intact.
    assert_eq!(before.transcript().len(), 3);
    assert!(Arc::ptr_eq(&handle.current(), &after));

    // Re-running the same task gives the same structure and the same estimate.
    let again = governor.execute("first task", "run-6").await.unwrap();
    let sources: Vec<String> = again.transcript.iter().map(|m| m.source.to_string()).collect();
    assert_eq!(sources, vec!["user", "coder", "critic"]);
    assert_eq!(
        again.token_estimate,
        estimate_transcript_tokens(&before.transcript().snapshot())
    );
}
