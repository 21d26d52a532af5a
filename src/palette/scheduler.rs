//! Round-robin turn scheduler.
//!
//! A [`TurnScheduler`] drives one conversation over a [`Roster`]:
//!
//! ```text
//! run_turns(task)
//!   ├─ append + yield  user: task                 (never checked for termination)
//!   ├─ worker[0] ← full transcript → append + yield → termination check
//!   ├─ worker[1] ← full transcript → append + yield → termination check
//!   ├─ ...
//!   └─ worker[n-1], then wraps to worker[0] until a condition fires
//! ```
//!
//! The sequence is lazy: nothing is dispatched until the stream is polled, and each poll
//! performs at most one worker turn. There is no turn cap here; the
//! [`TokenGovernor`](crate::TokenGovernor) bounds runaway conversations.
//!
//! A worker failure yields a single [`TeamError::WorkerInvocation`] and ends the stream. It is
//! not retried at this layer.
//!
//! A scheduler built by a [`RosterHandle`](crate::RosterHandle) is superseded as soon as the
//! roster is reset. It then stops at the next turn boundary without yielding the reply that was
//! in flight, and [`TurnScheduler::outcome`] reports [`TurnOutcome::Superseded`].
//!
//! # Example
//!
//! ```rust,no_run
//! # use palette::{Roster, TerminationCondition, TurnScheduler};
//! # use futures_util::StreamExt;
//! # use std::sync::Arc;
//! # async fn demo(roster: Roster) -> Result<(), palette::TeamError> {
//! let scheduler = Arc::new(TurnScheduler::new(
//!     Arc::new(roster),
//!     TerminationCondition::text_mention("APPROVE"),
//! ));
//!
//! let mut turns = scheduler.run_turns("Reverse a linked list in C++");
//! while let Some(message) = turns.next().await {
//!     let message = message?;
//!     println!("[{}] {}", message.source, message.content);
//! }
//! # Ok(())
//! # }
//! ```

use crate::palette::error::TeamError;
use crate::palette::event::{EventHandler, TeamEvent};
use crate::palette::roster::Roster;
use crate::palette::termination::TerminationCondition;
use crate::palette::transcript::{Transcript, TranscriptMessage};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Lazy, ordered, finite sequence of transcript messages produced by a run.
pub type TurnStream = BoxStream<'static, Result<TranscriptMessage, TeamError>>;

/// How the most recent turn sequence of a scheduler ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A termination condition fired; carries its description.
    Terminated(String),
    /// The roster was reset while the conversation was running.
    Superseded,
    /// A worker call failed.
    Failed,
}

pub struct TurnScheduler {
    roster: Arc<Roster>,
    termination: TerminationCondition,
    transcript: Arc<Transcript>,
    generation: u64,
    live_generation: Option<Arc<AtomicU64>>,
    outcome: Mutex<Option<TurnOutcome>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl TurnScheduler {
    /// Build a scheduler with an empty transcript.
    pub fn new(roster: Arc<Roster>, termination: TerminationCondition) -> Self {
        Self {
            roster,
            termination,
            transcript: Arc::new(Transcript::new()),
            generation: 0,
            live_generation: None,
            outcome: Mutex::new(None),
            event_handler: None,
        }
    }

    /// Tag the scheduler with the roster-reset generation that produced it.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Follow the roster's current generation; once it differs from ours the scheduler is
    /// superseded.
    pub fn with_live_generation(mut self, live: Arc<AtomicU64>) -> Self {
        self.live_generation = Some(live);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_superseded(&self) -> bool {
        self.live_generation
            .as_ref()
            .map_or(false, |live| live.load(Ordering::SeqCst) != self.generation)
    }

    /// How the last turn sequence ended; `None` while it is still running or was dropped early.
    pub fn outcome(&self) -> Option<TurnOutcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_outcome(&self, outcome: TurnOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    async fn emit(&self, event: TeamEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_team_event(&event).await;
        }
    }

    /// Start the conversation. See the module docs for the exact turn protocol.
    pub fn run_turns(self: &Arc<Self>, task: &str) -> TurnStream {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let state = TurnState {
            scheduler: Arc::clone(self),
            pending_task: Some(task.to_string()),
            next_worker: 0,
            turn: 0,
            finished: false,
        };
        stream::unfold(state, |state| state.advance()).boxed()
    }
}

struct TurnState {
    scheduler: Arc<TurnScheduler>,
    pending_task: Option<String>,
    next_worker: usize,
    turn: usize,
    finished: bool,
}

impl TurnState {
    fn superseded(&mut self) -> bool {
        if !self.scheduler.is_superseded() {
            return false;
        }
        self.finished = true;
        self.scheduler.record_outcome(TurnOutcome::Superseded);
        log::info!(
            "conversation of generation {} superseded after {} turn(s)",
            self.scheduler.generation,
            self.turn
        );
        true
    }

    async fn advance(mut self) -> Option<(Result<TranscriptMessage, TeamError>, Self)> {
        if self.finished {
            return None;
        }
        if self.superseded() {
            return None;
        }

        if let Some(task) = self.pending_task.take() {
            let message = TranscriptMessage::user(task);
            self.scheduler.transcript.append(message.clone());
            return Some((Ok(message), self));
        }

        let scheduler = Arc::clone(&self.scheduler);
        let worker = Arc::clone(&scheduler.roster.workers()[self.next_worker]);
        self.turn += 1;
        let turn = self.turn;

        scheduler
            .emit(TeamEvent::TurnStarted {
                worker: worker.name.clone(),
                turn,
            })
            .await;

        let history = scheduler.transcript.snapshot();
        let reply = worker.generate(&history).await;
        if reply.is_ok() && self.superseded() {
            log::debug!("dropping turn {} by '{}': roster was reset", turn, worker.name);
            return None;
        }

        match reply {
            Ok(message) => {
                scheduler.transcript.append(message.clone());
                self.next_worker = (self.next_worker + 1) % scheduler.roster.len();
                log::debug!(
                    "turn {} by '{}' ({} chars)",
                    turn,
                    worker.name,
                    message.content.len()
                );

                scheduler
                    .emit(TeamEvent::TurnCompleted {
                        worker: worker.name.clone(),
                        turn,
                        response_length: message.content.len(),
                    })
                    .await;

                if let Some(reason) = scheduler.termination.reason(&message) {
                    self.finished = true;
                    scheduler.record_outcome(TurnOutcome::Terminated(reason.clone()));
                    log::info!(
                        "conversation terminated after turn {} by '{}': {}",
                        turn,
                        worker.name,
                        reason
                    );
                    scheduler
                        .emit(TeamEvent::Terminated {
                            worker: worker.name.clone(),
                            turn,
                            reason,
                        })
                        .await;
                }
                Some((Ok(message), self))
            }
            Err(source) => {
                self.finished = true;
                scheduler.record_outcome(TurnOutcome::Failed);
                log::error!("worker '{}' failed on turn {}: {}", worker.name, turn, source);
                scheduler
                    .emit(TeamEvent::TurnFailed {
                        worker: worker.name.clone(),
                        turn,
                        error: source.to_string(),
                    })
                    .await;
                Some((
                    Err(TeamError::WorkerInvocation {
                        worker: worker.name.clone(),
                        source,
                    }),
                    self,
                ))
            }
        }
    }
}
