//! Background health supervisor.
//!
//! The [`HealthSupervisor`] runs as its own tokio task next to the run context. On every poll
//! it snapshots the active transcript, classifies it with a [`HealthClassifier`], records the
//! status and, when the status is auto-recoverable, performs a roster reset through the same
//! [`RosterHandle::reset`] primitive the governor uses.
//!
//! ```text
//! loop {
//!     poll()                       ok  → sleep poll_interval  (5 s)
//!                                  err → sleep error_backoff  (10 s)
//!     shutdown signalled?          → exit
//! }
//! ```
//!
//! Errors and panics inside a poll are caught and logged; they never end the task. Stopping is
//! a cooperative signal followed by a bounded join wait; a task that does not exit in time is
//! aborted and abandoned with a warning.

use crate::palette::error::SupervisorError;
use crate::palette::event::{EventHandler, TeamEvent};
use crate::palette::health::{HealthClassifier, HealthStatus};
use crate::palette::roster::{ResetTrigger, RosterHandle};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timing and retention settings for a [`HealthSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub history_capacity: usize,
    pub log_capacity: usize,
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
            history_capacity: 100,
            log_capacity: 100,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// One entry of the status history.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
}

/// One alert or recovery action written by the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: log::Level,
    pub message: String,
}

impl fmt::Display for SupervisorLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Snapshot returned by [`HealthSupervisor::report`].
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether the background task is running.
    pub active: bool,
    /// Time since the task was started; zero when inactive.
    pub uptime: Duration,
    /// Polls completed since construction.
    pub total_checks: u64,
    /// The last five non-ok records, oldest first.
    pub recent_issues: Vec<HealthRecord>,
    /// A fresh classification of the active transcript (no recovery is attempted).
    pub current_status: HealthStatus,
}

const RECENT_ISSUES: usize = 5;

struct SupervisorShared {
    roster: Arc<RosterHandle>,
    classifier: Arc<dyn HealthClassifier>,
    config: SupervisorConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
    history: Mutex<VecDeque<HealthRecord>>,
    logs: Mutex<VecDeque<SupervisorLogEntry>>,
    total_checks: AtomicU64,
}

impl SupervisorShared {
    fn push_log(&self, level: log::Level, message: String) {
        log::log!(level, "[supervisor] {}", message);
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        if logs.len() >= self.config.log_capacity {
            logs.pop_front();
        }
        logs.push_back(SupervisorLogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    fn record(&self, status: HealthStatus) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() >= self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(HealthRecord {
            timestamp: Utc::now(),
            status,
        });
    }

    async fn poll(&self) -> Result<HealthStatus, SupervisorError> {
        let scheduler = self.roster.try_current()?;
        let messages = scheduler.transcript().snapshot();
        let status = self.classifier.classify(&messages).await;

        self.total_checks.fetch_add(1, Ordering::SeqCst);
        self.record(status.clone());

        if let Some(handler) = &self.event_handler {
            handler
                .on_team_event(&TeamEvent::HealthChecked {
                    status: status.clone(),
                })
                .await;
        }

        if let Some(kind) = status.kind() {
            self.push_log(
                log::Level::Warn,
                format!(
                    "Issue detected ({}): {}. Suggested solution: {}",
                    self.classifier.name(),
                    status,
                    status.solution().unwrap_or_default()
                ),
            );

            if status.auto_recoverable() {
                // Someone else already replaced the transcript we looked at.
                if self.roster.generation() != scheduler.generation() {
                    log::debug!("[supervisor] skipping recovery, roster already reset");
                } else {
                    self.roster.reset(ResetTrigger::Supervisor(kind)).await;
                    self.push_log(
                        log::Level::Info,
                        format!("Attempting automatic recovery for {}: team reset", kind),
                    );
                }
            }
        }

        Ok(status)
    }

    async fn supervise(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "health supervisor started ({} classifier, every {:?})",
            self.classifier.name(),
            self.config.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match AssertUnwindSafe(self.poll()).catch_unwind().await {
                Ok(Ok(_)) => self.config.poll_interval,
                Ok(Err(e)) => {
                    self.push_log(log::Level::Error, format!("Error in monitoring loop: {}", e));
                    self.config.error_backoff
                }
                Err(panic) => {
                    let e = SupervisorError::CheckFailed(panic_message(panic.as_ref()));
                    self.push_log(log::Level::Error, format!("Error in monitoring loop: {}", e));
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("health supervisor stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    started: Instant,
}

/// Periodic health checks with automatic recovery. See the module docs.
pub struct HealthSupervisor {
    shared: Arc<SupervisorShared>,
    task: Mutex<Option<RunningTask>>,
}

impl HealthSupervisor {
    pub fn new(
        roster: Arc<RosterHandle>,
        classifier: Arc<dyn HealthClassifier>,
        config: SupervisorConfig,
        event_handler: Option<Arc<dyn EventHandler>>,
    ) -> Self {
        Self {
            shared: Arc::new(SupervisorShared {
                roster,
                classifier,
                config,
                event_handler,
                history: Mutex::new(VecDeque::new()),
                logs: Mutex::new(VecDeque::new()),
                total_checks: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Spawn the poll loop on the current tokio runtime. Starting twice is a no-op.
    pub fn start(&self) -> Result<(), SupervisorError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(());
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SupervisorError::NoRuntime)?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(shared.supervise(shutdown_rx));

        *task = Some(RunningTask {
            shutdown,
            handle,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Signal the loop to exit and wait up to `stop_timeout` for it. Idempotent.
    pub async fn stop(&self) {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut running) = running else {
            return;
        };

        let _ = running.shutdown.send(true);
        match tokio::time::timeout(self.shared.config.stop_timeout, &mut running.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("health supervisor task ended abnormally: {}", e),
            Err(_) => {
                log::warn!(
                    "health supervisor did not stop within {:?}, abandoning it",
                    self.shared.config.stop_timeout
                );
                running.handle.abort();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn uptime(&self) -> Duration {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.started.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn total_checks(&self) -> u64 {
        self.shared.total_checks.load(Ordering::SeqCst)
    }

    /// One poll cycle, run inline: classify, record, recover if warranted.
    pub async fn poll_once(&self) -> Result<HealthStatus, SupervisorError> {
        self.shared.poll().await
    }

    /// Classify the active transcript without recording it or acting on it.
    pub async fn current_status(&self) -> HealthStatus {
        let messages = self.shared.roster.current().transcript().snapshot();
        self.shared.classifier.classify(&messages).await
    }

    pub fn history(&self) -> Vec<HealthRecord> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The last `n` non-ok records, oldest first.
    pub fn recent_issues(&self, n: usize) -> Vec<HealthRecord> {
        let history = self
            .shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut issues: Vec<HealthRecord> = history
            .iter()
            .rev()
            .filter(|r| !r.status.is_ok())
            .take(n)
            .cloned()
            .collect();
        issues.reverse();
        issues
    }

    pub fn logs(&self) -> Vec<SupervisorLogEntry> {
        self.shared
            .logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub async fn report(&self) -> HealthReport {
        HealthReport {
            active: self.is_active(),
            uptime: self.uptime(),
            total_checks: self.total_checks(),
            recent_issues: self.recent_issues(RECENT_ISSUES),
            current_status: self.current_status().await,
        }
    }
}

impl Drop for HealthSupervisor {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = task.take() {
            let _ = running.shutdown.send(true);
        }
    }
}
