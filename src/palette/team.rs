//! Team: the composition root.
//!
//! A [`Team`] owns one roster, the [`TokenGovernor`] that drives runs over it, the pre-flight
//! [`InputGate`] and the background [`HealthSupervisor`]. It is configured through
//! [`TeamBuilder`], which resolves each worker slot with the precedence
//! **explicit [`WorkerSpec`] > [`ConfigMap`] > none** (see [`crate::config`]).
//!
//! ```text
//! Team::run(task)
//!   ├─ one run at a time                 (else TeamError::RunInProgress)
//!   ├─ InputGate::check_input_tokens     (Error → empty RunResult, no turn scheduled)
//!   └─ TokenGovernor::execute
//!        └─ up to 3 × RosterHandle::reset → TurnScheduler::run_turns
//!
//! HealthSupervisor (own task) ── every 5 s ── classify ── RosterHandle::reset on recovery
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use palette::{ConfigMap, TeamBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     palette::init_logger();
//!
//!     let team = TeamBuilder::new()
//!         .with_config(ConfigMap::load("config.yaml")?)
//!         .with_token_threshold(2000)
//!         .build()?;
//!
//!     let result = team.run("Write a function that reverses a linked list in C++").await?;
//!     for message in &result.transcript {
//!         println!("[{}] {}", message.source, message.content);
//!     }
//!     println!("{:#?}", team.health_report().await);
//!     team.stop_supervisor().await;
//!     Ok(())
//! }
//! ```

use crate::palette::clients::provider::{ClientFactory, ProviderClientFactory};
use crate::palette::config::{
    resolve_slots, ConfigMap, WorkerSpec, DEFAULT_TERMINATION_TEXT, DEFAULT_TOKEN_THRESHOLD,
};
use crate::palette::error::{ConfigurationError, TeamError};
use crate::palette::event::{EventHandler, TeamEvent};
use crate::palette::governor::{RunResult, TokenGovernor, DEFAULT_MAX_ATTEMPTS};
use crate::palette::health::{HealthClassifier, LexicalClassifier};
use crate::palette::input_gate::{
    Cl100kTokenizer, InputGate, InputTokenCheck, Tokenizer, DEFAULT_MAX_INPUT_TOKENS,
};
use crate::palette::roster::{ResetTrigger, Roster, RosterHandle};
use crate::palette::supervisor::{
    HealthReport, HealthSupervisor, SupervisorConfig, SupervisorLogEntry,
};
use crate::palette::termination::{ExternalTermination, TerminationCondition};
use crate::palette::transcript::TranscriptMessage;
use crate::palette::worker::Worker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const TASK_PREVIEW_CHARS: usize = 80;

/// Configures and builds a [`Team`].
pub struct TeamBuilder {
    config: ConfigMap,
    slots: BTreeMap<usize, WorkerSpec>,
    roster: Option<Roster>,
    termination_text: Option<String>,
    token_threshold: Option<usize>,
    max_input_tokens: Option<usize>,
    max_attempts: usize,
    auto_monitor: bool,
    client_factory: Arc<dyn ClientFactory>,
    tokenizer: Arc<dyn Tokenizer>,
    classifier: Arc<dyn HealthClassifier>,
    event_handler: Option<Arc<dyn EventHandler>>,
    supervisor_config: SupervisorConfig,
}

impl Default for TeamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TeamBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigMap::new(),
            slots: BTreeMap::new(),
            roster: None,
            termination_text: None,
            token_threshold: None,
            max_input_tokens: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_monitor: true,
            client_factory: Arc::new(ProviderClientFactory),
            tokenizer: Arc::new(Cl100kTokenizer),
            classifier: Arc::new(LexicalClassifier),
            event_handler: None,
            supervisor_config: SupervisorConfig::default(),
        }
    }

    /// Fallback values for every setting not given explicitly.
    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    /// Explicit settings for slot `slot` (1-based). Overrides the config field by field.
    pub fn with_worker(mut self, slot: usize, spec: WorkerSpec) -> Self {
        self.slots.insert(slot, spec);
        self
    }

    /// Use ready-made workers instead of resolving slots.
    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = Some(roster);
        self
    }

    pub fn with_termination_text(mut self, text: impl Into<String>) -> Self {
        self.termination_text = Some(text.into());
        self
    }

    pub fn with_token_threshold(mut self, threshold: usize) -> Self {
        self.token_threshold = Some(threshold);
        self
    }

    pub fn with_max_input_tokens(mut self, max: usize) -> Self {
        self.max_input_tokens = Some(max);
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Start the health supervisor when the team is built (default `true`).
    pub fn with_auto_monitor(mut self, enabled: bool) -> Self {
        self.auto_monitor = enabled;
        self
    }

    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.client_factory = factory;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn HealthClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn with_supervisor_config(mut self, config: SupervisorConfig) -> Self {
        self.supervisor_config = config;
        self
    }

    fn resolve_usize(
        &self,
        explicit: Option<usize>,
        key: &str,
        default: usize,
    ) -> Result<usize, ConfigurationError> {
        match explicit {
            Some(value) => Ok(value),
            None => Ok(self.config.get_usize(key)?.unwrap_or(default)),
        }
    }

    fn build_roster(&mut self) -> Result<Roster, ConfigurationError> {
        if let Some(roster) = self.roster.take() {
            return Ok(roster);
        }

        let slots = resolve_slots(&self.slots, &self.config)?;
        let mut workers = Vec::with_capacity(slots.len());
        for slot in slots {
            let client = self.client_factory.create(slot.index, &slot.client)?;
            workers.push(Worker::new(
                slot.name,
                slot.description,
                slot.system_message,
                client,
            ));
        }
        Roster::new(workers)
    }

    /// Resolve everything and start the supervisor (if enabled).
    ///
    /// Starting the supervisor needs a tokio runtime; without one this fails with
    /// [`TeamError::Supervisor`].
    pub fn build(mut self) -> Result<Team, TeamError> {
        let termination_text = self
            .termination_text
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.config.get_str("termination_text"))
            .unwrap_or_else(|| DEFAULT_TERMINATION_TEXT.to_string());
        let token_threshold =
            self.resolve_usize(self.token_threshold, "token_threshold", DEFAULT_TOKEN_THRESHOLD)?;
        let max_input_tokens = self.resolve_usize(
            self.max_input_tokens,
            "max_input_tokens",
            DEFAULT_MAX_INPUT_TOKENS,
        )?;

        let roster = Arc::new(self.build_roster()?);

        let external = ExternalTermination::new();
        let termination =
            TerminationCondition::text_mention(termination_text.clone()).or(external.condition());
        let handle = Arc::new(RosterHandle::new(
            Arc::clone(&roster),
            termination,
            self.event_handler.clone(),
        ));

        let mut governor =
            TokenGovernor::new(Arc::clone(&handle), token_threshold).with_max_attempts(self.max_attempts);
        if let Some(handler) = &self.event_handler {
            governor = governor.with_event_handler(Arc::clone(handler));
        }

        let supervisor = HealthSupervisor::new(
            Arc::clone(&handle),
            self.classifier,
            self.supervisor_config,
            self.event_handler.clone(),
        );
        if self.auto_monitor {
            supervisor.start()?;
        }

        log::info!(
            "team ready: [{}], termination '{}', token threshold {}, input limit {}",
            roster.names().join(", "),
            termination_text,
            token_threshold,
            max_input_tokens
        );

        Ok(Team {
            roster: handle,
            governor,
            gate: InputGate::new(self.tokenizer, max_input_tokens),
            supervisor,
            external,
            termination_text,
            event_handler: self.event_handler,
            run_lock: Mutex::new(()),
        })
    }
}

/// A supervised round-robin team. See the module docs.
pub struct Team {
    roster: Arc<RosterHandle>,
    governor: TokenGovernor,
    gate: InputGate,
    supervisor: HealthSupervisor,
    external: ExternalTermination,
    termination_text: String,
    event_handler: Option<Arc<dyn EventHandler>>,
    run_lock: Mutex<()>,
}

impl Team {
    pub fn builder() -> TeamBuilder {
        TeamBuilder::new()
    }

    async fn emit(&self, event: TeamEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_team_event(&event).await;
        }
    }

    /// Run the team on `task`.
    ///
    /// Returns an empty [`RunResult`] carrying the diagnostic when the task is over the input
    /// limit. Worker failures abort the run with [`TeamError::WorkerInvocation`]. A stop
    /// requested while no run was active is discarded.
    pub async fn run(&self, task: &str) -> Result<RunResult, TeamError> {
        let _running = self
            .run_lock
            .try_lock()
            .map_err(|_| TeamError::RunInProgress)?;
        let run_id = Uuid::new_v4().to_string();

        let check = self.gate.check_input_tokens(task);
        if check.is_error() {
            log::warn!(
                "run {} refused by input gate: {}",
                run_id,
                check.message().unwrap_or_default()
            );
            self.emit(TeamEvent::InputRejected {
                run_id,
                token_count: check.token_count(),
                max_limit: check.max_limit(),
            })
            .await;
            return Ok(RunResult::rejected(check));
        }

        self.external.reset();
        let task_preview: String = task.chars().take(TASK_PREVIEW_CHARS).collect();
        log::info!(
            "run {} started with {} workers: {}",
            run_id,
            self.roster.roster().len(),
            task_preview
        );
        self.emit(TeamEvent::RunStarted {
            run_id: run_id.clone(),
            worker_count: self.roster.roster().len(),
            task_preview,
        })
        .await;

        let result = self.governor.execute(task, &run_id).await?;

        log::info!(
            "run {} finished: {} messages, {} attempts, estimated {} tokens",
            run_id,
            result.transcript.len(),
            result.attempts,
            result.token_estimate
        );
        self.emit(TeamEvent::RunCompleted {
            run_id,
            attempts: result.attempts,
            token_estimate: result.token_estimate,
            messages: result.transcript.len(),
        })
        .await;
        Ok(result)
    }

    /// Discard the active transcript and start from a fresh scheduler.
    pub async fn reset_roster(&self) {
        self.roster.reset(ResetTrigger::Manual).await;
    }

    /// Ask the active run to stop at its next termination check. The whole run ends there; no
    /// further attempt is started.
    pub fn request_stop(&self) {
        log::info!("stop requested");
        self.external.set();
    }

    pub async fn health_report(&self) -> HealthReport {
        self.supervisor.report().await
    }

    pub fn set_input_token_limit(&self, max: usize) {
        self.gate.set_max_input_tokens(max);
    }

    pub fn input_token_limit(&self) -> usize {
        self.gate.max_input_tokens()
    }

    /// Exact pre-flight check, without running anything.
    pub fn check_input_tokens(&self, text: &str) -> InputTokenCheck {
        self.gate.check_input_tokens(text)
    }

    /// Worker names in turn order.
    pub fn display_roster(&self) -> Vec<String> {
        let roster = self.roster.roster();
        for (i, worker) in roster.workers().iter().enumerate() {
            log::info!(
                "worker {}: {} ({}) - {}",
                i + 1,
                worker.name,
                worker.model(),
                worker.description
            );
        }
        roster.names()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        self.roster.roster().workers()
    }

    /// Messages of the active transcript (empty right after a reset).
    pub fn transcript(&self) -> Vec<TranscriptMessage> {
        self.roster.current().transcript().snapshot()
    }

    /// Number of roster resets so far.
    pub fn generation(&self) -> u64 {
        self.roster.generation()
    }

    pub fn termination_text(&self) -> &str {
        &self.termination_text
    }

    pub fn token_threshold(&self) -> usize {
        self.governor.threshold()
    }

    pub fn supervisor(&self) -> &HealthSupervisor {
        &self.supervisor
    }

    pub fn supervisor_logs(&self) -> Vec<SupervisorLogEntry> {
        self.supervisor.logs()
    }

    pub fn start_supervisor(&self) -> Result<(), TeamError> {
        Ok(self.supervisor.start()?)
    }

    /// Stop background monitoring. Safe to call more than once.
    pub async fn stop_supervisor(&self) {
        self.supervisor.stop().await;
    }
}
