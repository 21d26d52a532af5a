//! Token governor: bounds the cost of a run by re-forming the team when output grows too large.
//!
//! Each attempt drives the active [`TurnScheduler`](crate::TurnScheduler) to termination, then
//! estimates the cost of everything it produced (task included):
//!
//! ```text
//! estimate = round(word_count(join(contents, " ")) * 1.3)
//! ```
//!
//! The heuristic is fixed and deliberately not a tokenizer; exact counting only happens in the
//! pre-flight [`InputGate`](crate::InputGate). When `estimate >= threshold` the attempt is
//! discarded, the roster is reset (a full rebuild, not a resume) and the task is re-submitted,
//! up to `max_attempts` attempts in total. When the budget runs out the last, over-threshold
//! result is returned: retries bound cost, they do not guarantee success.
//!
//! An external stop ends the whole run with the attempt in hand, whatever its size. An attempt
//! cut short because the supervisor reset the roster also counts against the budget; the task
//! is re-submitted on the scheduler that replaced it.
//!
//! # Example
//!
//! ```
//! use palette::governor::estimate_tokens;
//!
//! assert_eq!(estimate_tokens("one two three"), 4);   // 3 * 1.3 = 3.9
//! assert_eq!(estimate_tokens("a b c d e"), 7);       // 5 * 1.3 = 6.5, rounds up
//! assert_eq!(estimate_tokens(""), 0);
//! ```

use crate::palette::error::TeamError;
use crate::palette::event::{EventHandler, TeamEvent};
use crate::palette::input_gate::InputTokenCheck;
use crate::palette::roster::{ResetTrigger, RosterHandle};
use crate::palette::scheduler::{TurnOutcome, TurnScheduler};
use crate::palette::transcript::TranscriptMessage;
use futures_util::StreamExt;
use std::sync::Arc;

/// Total attempts per run (initial + retries).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Tokens assumed per whitespace-delimited word.
pub const TOKENS_PER_WORD: f64 = 1.3;

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `round(word_count(text) * 1.3)`.
pub fn estimate_tokens(text: &str) -> usize {
    (word_count(text) as f64 * TOKENS_PER_WORD).round() as usize
}

/// Estimate for a whole transcript: contents joined with single spaces.
pub fn estimate_transcript_tokens(messages: &[TranscriptMessage]) -> usize {
    let joined = messages
        .iter()
        .map(|m| m.content.as_ref())
        .collect::<Vec<&str>>()
        .join(" ");
    estimate_tokens(&joined)
}

/// The outcome of one [`Team::run`](crate::Team::run).
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Every message of the final attempt, in conversation order (task first).
    pub transcript: Vec<TranscriptMessage>,
    /// Heuristic token estimate of `transcript`.
    pub token_estimate: usize,
    /// How many attempts the governor made (0 when the input gate refused the task).
    pub attempts: usize,
    /// Set when the pre-flight gate refused the task; carries the diagnostic.
    pub input_rejection: Option<InputTokenCheck>,
}

impl RunResult {
    /// Empty result for a task refused by the input gate.
    pub fn rejected(check: InputTokenCheck) -> Self {
        Self {
            transcript: Vec::new(),
            token_estimate: 0,
            attempts: 0,
            input_rejection: Some(check),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.input_rejection.is_some()
    }
}

/// Attempt counter scoped to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: usize,
    pub max: usize,
}

impl RetryState {
    pub fn new(max: usize) -> Self {
        Self {
            attempt: 0,
            max: max.max(1),
        }
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> usize {
        self.attempt += 1;
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max
    }
}

pub struct TokenGovernor {
    roster: Arc<RosterHandle>,
    threshold: usize,
    max_attempts: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl TokenGovernor {
    pub fn new(roster: Arc<RosterHandle>, threshold: usize) -> Self {
        Self {
            roster,
            threshold,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            event_handler: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    async fn emit(&self, event: TeamEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_team_event(&event).await;
        }
    }

    /// Run `task` under the budget. Worker failures abort immediately and are not retried.
    pub async fn execute(&self, task: &str, run_id: &str) -> Result<RunResult, TeamError> {
        let mut retry = RetryState::new(self.max_attempts);
        let mut scheduler = self.roster.reset(ResetTrigger::NewRun).await;

        loop {
            let attempt = retry.begin_attempt();
            let transcript = Self::drive(&scheduler, task).await?;
            let token_estimate = estimate_transcript_tokens(&transcript);
            let over_threshold = token_estimate >= self.threshold;

            log::info!(
                "run {} attempt {}/{}: {} messages, estimated {} tokens (threshold {})",
                run_id,
                attempt,
                retry.max,
                transcript.len(),
                token_estimate,
                self.threshold
            );
            self.emit(TeamEvent::AttemptCompleted {
                run_id: run_id.to_string(),
                attempt,
                token_estimate,
                over_threshold,
            })
            .await;

            let result = RunResult {
                transcript,
                token_estimate,
                attempts: attempt,
                input_rejection: None,
            };

            if self.roster.termination().stop_requested() {
                log::info!("run {} stopped on request after attempt {}", run_id, attempt);
                return Ok(result);
            }

            if scheduler.outcome() == Some(TurnOutcome::Superseded) {
                if retry.exhausted() {
                    log::warn!(
                        "run {}: roster reset during the last of {} attempts, returning partial result",
                        run_id,
                        attempt
                    );
                    return Ok(result);
                }
                log::info!(
                    "run {}: attempt {} interrupted by a roster reset, re-submitting the task",
                    run_id,
                    attempt
                );
                scheduler = self.roster.current();
                continue;
            }

            if !over_threshold {
                return Ok(result);
            }

            if retry.exhausted() {
                log::warn!(
                    "run {}: token budget exhausted after {} attempts ({} >= {}), returning last result",
                    run_id,
                    attempt,
                    token_estimate,
                    self.threshold
                );
                self.emit(TeamEvent::BudgetExhausted {
                    run_id: run_id.to_string(),
                    attempts: attempt,
                    token_estimate,
                    threshold: self.threshold,
                })
                .await;
                return Ok(result);
            }

            log::warn!(
                "run {}: token limit exceeded ({} >= {}), rebuilding the team",
                run_id,
                token_estimate,
                self.threshold
            );
            scheduler = self
                .roster
                .reset(ResetTrigger::TokenBudget { attempt })
                .await;
        }
    }

    async fn drive(
        scheduler: &Arc<TurnScheduler>,
        task: &str,
    ) -> Result<Vec<TranscriptMessage>, TeamError> {
        let mut turns = scheduler.run_turns(task);
        let mut produced = Vec::new();
        while let Some(message) = turns.next().await {
            produced.push(message?);
        }
        Ok(produced)
    }
}
