use async_trait::async_trait;
use palette::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use palette::health::{detect_deadlock, jaccard_similarity, ModelDeadlockClassifier};
use palette::{
    HealthClassifier, HealthKind, HealthStatus, HealthSupervisor, LexicalClassifier, Roster,
    RosterHandle, SupervisorConfig, SupervisorError, TerminationCondition, TranscriptMessage,
    Worker,
};
use std::sync::Arc;
use std::time::Duration;

struct EchoClient(&'static str);

#[async_trait]
impl ClientWrapper for EchoClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ClientError> {
        Ok(Message::new(Role::Assistant, self.0))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

struct DownClient;

#[async_trait]
impl ClientWrapper for DownClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ClientError> {
        Err("connection refused".into())
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct PanickingClassifier;

#[async_trait]
impl HealthClassifier for PanickingClassifier {
    async fn classify(&self, _transcript: &[TranscriptMessage]) -> HealthStatus {
        panic!("classifier exploded")
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

fn handle() -> Arc<RosterHandle> {
    let roster = Roster::new(vec![
        Worker::new("a", "first", "", Arc::new(EchoClient("ok"))),
        Worker::new("b", "second", "", Arc::new(EchoClient("ok"))),
    ])
    .unwrap();
    Arc::new(RosterHandle::new(
        Arc::new(roster),
        TerminationCondition::text_mention("APPROVE"),
        None,
    ))
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        history_capacity: 100,
        log_capacity: 100,
        stop_timeout: Duration::from_secs(2),
    }
}

fn supervisor(handle: &Arc<RosterHandle>, config: SupervisorConfig) -> HealthSupervisor {
    HealthSupervisor::new(
        Arc::clone(handle),
        Arc::new(LexicalClassifier),
        config,
        None,
    )
}

/// Two texts whose word sets share `shared` words, with `only_a` / `only_b` words of their own.
fn overlapping(shared: usize, only_a: usize, only_b: usize) -> (String, String) {
    let common: Vec<String> = (0..shared).map(|i| format!("common{}", i)).collect();
    let mut a = common.clone();
    a.extend((0..only_a).map(|i| format!("alpha{}", i)));
    let mut b = common;
    b.extend((0..only_b).map(|i| format!("beta{}", i)));
    (a.join(" "), b.join(" "))
}

/// Six messages alternating a/b where only the a-messages at positions 0 and 2 overlap.
fn window(first: &str, third: &str) -> Vec<TranscriptMessage> {
    vec![
        TranscriptMessage::from_worker("a", first),
        TranscriptMessage::from_worker("b", "one two three"),
        TranscriptMessage::from_worker("a", third),
        TranscriptMessage::from_worker("b", "four five six"),
        TranscriptMessage::from_worker("a", "seven eight nine"),
        TranscriptMessage::from_worker("b", "ten eleven twelve"),
    ]
}

#[test]
fn test_deadlock_fires_above_threshold_only() {
    let (a, b) = overlapping(71, 15, 14);
    assert!((jaccard_similarity(&a, &b) - 0.71).abs() < 1e-9);
    assert!(detect_deadlock(&window(&a, &b)));

    let (a, b) = overlapping(69, 16, 15);
    assert!((jaccard_similarity(&a, &b) - 0.69).abs() < 1e-9);
    assert!(!detect_deadlock(&window(&a, &b)));

    // Exactly 0.7 is not above the threshold either.
    let (a, b) = overlapping(70, 15, 15);
    assert!(!detect_deadlock(&window(&a, &b)));
}

#[test]
fn test_deadlock_needs_six_messages_and_same_source() {
    let mut messages = window("same words here", "same words here");
    assert!(detect_deadlock(&messages));
    messages.remove(5);
    assert!(!detect_deadlock(&messages));

    let mixed = vec![
        TranscriptMessage::from_worker("a", "same words here"),
        TranscriptMessage::from_worker("b", "x"),
        TranscriptMessage::from_worker("c", "same words here"),
        TranscriptMessage::from_worker("a", "y"),
        TranscriptMessage::from_worker("b", "z"),
        TranscriptMessage::from_worker("c", "w"),
    ];
    assert!(!detect_deadlock(&mixed));
}

#[tokio::test]
async fn test_error_scan_only_looks_at_last_three_messages() {
    let classifier = LexicalClassifier;
    let mut messages = vec![
        TranscriptMessage::from_worker("a", "Model error: failed to generate"),
        TranscriptMessage::from_worker("b", "fine"),
        TranscriptMessage::from_worker("a", "fine"),
        TranscriptMessage::from_worker("b", "fine"),
    ];
    assert_eq!(classifier.classify(&messages).await, HealthStatus::Ok);

    messages.push(TranscriptMessage::from_worker("a", "We hit a Rate Limit"));
    let status = classifier.classify(&messages).await;
    assert_eq!(status.kind(), Some(HealthKind::ApiFailure));
    assert!(status.auto_recoverable());
    assert!(status.solution().unwrap().contains("API keys"));
}

#[tokio::test]
async fn test_recoverable_issue_resets_the_roster() {
    let handle = handle();
    let supervisor = supervisor(&handle, fast_config());
    handle
        .current()
        .transcript()
        .append(TranscriptMessage::from_worker("a", "API error: 503"));

    let status = supervisor.poll_once().await.unwrap();
    assert!(matches!(
        status,
        HealthStatus::Error {
            kind: HealthKind::ApiFailure,
            auto_recoverable: true,
            ..
        }
    ));
    assert_eq!(handle.generation(), 1);
    assert!(handle.current().transcript().is_empty());

    // Fresh transcript is healthy.
    assert!(supervisor.poll_once().await.unwrap().is_ok());
    assert_eq!(supervisor.total_checks(), 2);
    assert_eq!(supervisor.history().len(), 2);

    let logs = supervisor.logs();
    assert!(logs.iter().any(|l| l.message.contains("Issue detected")));
    assert!(logs.iter().any(|l| l.message.contains("automatic recovery")));
}

#[tokio::test]
async fn test_deadlock_warning_resets_the_roster() {
    let handle = handle();
    let supervisor = supervisor(&handle, fast_config());
    let transcript = Arc::clone(handle.current().transcript());
    for message in window("we keep saying the same", "we keep saying the same") {
        transcript.append(message);
    }

    let status = supervisor.poll_once().await.unwrap();
    assert_eq!(status.kind(), Some(HealthKind::TeamDeadlock));
    assert!(matches!(status, HealthStatus::Warning { .. }));
    assert_eq!(handle.generation(), 1);
}

#[tokio::test]
async fn test_non_recoverable_issue_is_only_reported() {
    let handle = handle();
    let supervisor = supervisor(&handle, fast_config());
    handle
        .current()
        .transcript()
        .append(TranscriptMessage::from_worker("b", "Content policy violation"));

    let status = supervisor.poll_once().await.unwrap();
    assert_eq!(status.kind(), Some(HealthKind::ModelError));
    assert!(!status.auto_recoverable());
    assert_eq!(handle.generation(), 0);

    let report = supervisor.report().await;
    assert!(!report.active);
    assert_eq!(report.uptime, Duration::ZERO);
    assert_eq!(report.total_checks, 1);
    assert_eq!(report.recent_issues.len(), 1);
    assert_eq!(report.current_status.kind(), Some(HealthKind::ModelError));
    // current_status is a fresh check, not a recorded poll.
    assert_eq!(supervisor.total_checks(), 1);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let handle = handle();
    let config = SupervisorConfig {
        history_capacity: 3,
        ..fast_config()
    };
    let supervisor = supervisor(&handle, config);
    for _ in 0..5 {
        supervisor.poll_once().await.unwrap();
    }
    assert_eq!(supervisor.total_checks(), 5);
    assert_eq!(supervisor.history().len(), 3);
}

#[tokio::test]
async fn test_recent_issues_keeps_last_five_non_ok() {
    let handle = handle();
    let supervisor = supervisor(&handle, fast_config());
    for i in 0..7 {
        handle
            .current()
            .transcript()
            .append(TranscriptMessage::from_worker("a", format!("model error {}", i)));
        supervisor.poll_once().await.unwrap();
    }
    supervisor.poll_once().await.unwrap();
    assert_eq!(supervisor.recent_issues(5).len(), 5);
    assert_eq!(supervisor.history().len(), 8);
}

#[tokio::test]
async fn test_background_loop_polls_and_stop_is_idempotent() {
    let handle = handle();
    let supervisor = supervisor(&handle, fast_config());

    supervisor.start().unwrap();
    supervisor.start().unwrap();
    assert!(supervisor.is_active());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.total_checks() > 0);
    assert!(supervisor.uptime() > Duration::ZERO);

    supervisor.stop().await;
    assert!(!supervisor.is_active());
    supervisor.stop().await;
    assert!(!supervisor.is_active());

    let checks = supervisor.total_checks();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.total_checks(), checks);
}

#[tokio::test]
async fn test_panicking_poll_does_not_kill_the_loop() {
    let handle = handle();
    let supervisor = HealthSupervisor::new(
        Arc::clone(&handle),
        Arc::new(PanickingClassifier),
        fast_config(),
        None,
    );

    supervisor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.is_active());
    let errors = supervisor
        .logs()
        .iter()
        .filter(|l| l.message.contains("classifier exploded"))
        .count();
    assert!(errors >= 2, "loop kept polling after a panic");
    supervisor.stop().await;
}

#[test]
fn test_start_without_runtime_fails() {
    let supervisor = supervisor(&handle(), SupervisorConfig::default());
    assert!(matches!(supervisor.start(), Err(SupervisorError::NoRuntime)));
    assert!(!supervisor.is_active());
}

#[tokio::test]
async fn test_model_classifier_and_fallback() {
    let looping = window("alpha beta", "gamma delta");

    let yes = ModelDeadlockClassifier::new(Arc::new(EchoClient(" Yes ")));
    assert_eq!(
        yes.classify(&looping).await.kind(),
        Some(HealthKind::TeamDeadlock)
    );

    let no = ModelDeadlockClassifier::new(Arc::new(EchoClient("no")));
    assert!(no.classify(&looping).await.is_ok());

    // Client failure falls back to the lexical detector.
    let down = ModelDeadlockClassifier::new(Arc::new(DownClient));
    assert!(down.classify(&looping).await.is_ok());
    let repeated = window("same words here", "same words here");
    assert_eq!(
        down.classify(&repeated).await.kind(),
        Some(HealthKind::TeamDeadlock)
    );
}
