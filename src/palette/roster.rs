//! Roster and the roster-reset primitive.
//!
//! The [`Roster`] is the ordered, immutable set of [`Worker`]s of a team. The
//! [`RosterHandle`] owns the only piece of mutable state shared between the run context and
//! the supervisor: the active [`TurnScheduler`] (which in turn owns the live transcript).
//!
//! Every rebuild of the scheduler — at the start of a run, on a token-budget retry, on a
//! supervisor recovery, or on an explicit [`Team::reset_roster`](crate::Team::reset_roster) —
//! goes through [`RosterHandle::reset`]. The swap happens under a single write lock, so no
//! reader ever observes a half-built scheduler; concurrent resets resolve last-writer-wins.
//! A replaced scheduler stops dispatching at its next turn boundary.

use crate::palette::error::{ConfigurationError, SupervisorError};
use crate::palette::event::{EventHandler, TeamEvent};
use crate::palette::health::HealthKind;
use crate::palette::scheduler::TurnScheduler;
use crate::palette::termination::TerminationCondition;
use crate::palette::worker::Worker;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Ordered set of workers. Turn order is insertion order.
#[derive(Debug)]
pub struct Roster {
    workers: Vec<Arc<Worker>>,
}

impl Roster {
    /// Build a roster; fewer than two workers is a configuration error.
    pub fn new(workers: Vec<Worker>) -> Result<Self, ConfigurationError> {
        if workers.len() < 2 {
            return Err(ConfigurationError::RosterTooSmall(workers.len()));
        }
        Ok(Self {
            workers: workers.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Worker names in turn order.
    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }
}

/// Why the scheduler was rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTrigger {
    /// A new call to `run` starts from a fresh transcript.
    NewRun,
    /// The governor discarded an over-budget attempt (1-based attempt that overflowed).
    TokenBudget { attempt: usize },
    /// The supervisor classified an auto-recoverable issue.
    Supervisor(HealthKind),
    /// Requested through the public API.
    Manual,
}

impl fmt::Display for ResetTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetTrigger::NewRun => write!(f, "new run"),
            ResetTrigger::TokenBudget { attempt } => {
                write!(f, "token budget exceeded on attempt {}", attempt)
            }
            ResetTrigger::Supervisor(kind) => write!(f, "supervisor recovery ({})", kind),
            ResetTrigger::Manual => write!(f, "manual reset"),
        }
    }
}

struct RosterState {
    scheduler: Arc<TurnScheduler>,
    generation: u64,
}

/// Owner of the active scheduler; shared by `Arc` between the team, its governor and its
/// supervisor.
pub struct RosterHandle {
    roster: Arc<Roster>,
    termination: TerminationCondition,
    event_handler: Option<Arc<dyn EventHandler>>,
    live_generation: Arc<AtomicU64>,
    state: RwLock<RosterState>,
}

impl RosterHandle {
    pub fn new(
        roster: Arc<Roster>,
        termination: TerminationCondition,
        event_handler: Option<Arc<dyn EventHandler>>,
    ) -> Self {
        let live_generation = Arc::new(AtomicU64::new(0));
        let scheduler = Arc::new(Self::build_scheduler(
            &roster,
            &termination,
            &event_handler,
            &live_generation,
            0,
        ));
        Self {
            roster,
            termination,
            event_handler,
            live_generation,
            state: RwLock::new(RosterState {
                scheduler,
                generation: 0,
            }),
        }
    }

    fn build_scheduler(
        roster: &Arc<Roster>,
        termination: &TerminationCondition,
        event_handler: &Option<Arc<dyn EventHandler>>,
        live_generation: &Arc<AtomicU64>,
        generation: u64,
    ) -> TurnScheduler {
        let scheduler = TurnScheduler::new(Arc::clone(roster), termination.clone())
            .with_generation(generation)
            .with_live_generation(Arc::clone(live_generation));
        match event_handler {
            Some(handler) => scheduler.with_event_handler(Arc::clone(handler)),
            None => scheduler,
        }
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn termination(&self) -> &TerminationCondition {
        &self.termination
    }

    /// The active scheduler. Lock poisoning is recovered: the state is a single `Arc` swap
    /// and cannot be left half-written.
    pub fn current(&self) -> Arc<TurnScheduler> {
        Arc::clone(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .scheduler,
        )
    }

    /// Like [`current`](RosterHandle::current) but reports poisoning, for the supervisor's
    /// transient-error path.
    pub fn try_current(&self) -> Result<Arc<TurnScheduler>, SupervisorError> {
        self.state
            .read()
            .map(|state| Arc::clone(&state.scheduler))
            .map_err(|e| SupervisorError::StatePoisoned(e.to_string()))
    }

    /// Number of resets performed so far.
    pub fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// Roster reset: replace the active scheduler (and its transcript) with a fresh one built
    /// from the unchanged roster and termination condition. Returns the new scheduler.
    ///
    /// Holders of the previous scheduler keep a consistent view of the old transcript, and a
    /// conversation still running on it ends at its next turn boundary.
    pub async fn reset(&self, trigger: ResetTrigger) -> Arc<TurnScheduler> {
        let (scheduler, generation) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let generation = state.generation + 1;
            let scheduler = Arc::new(Self::build_scheduler(
                &self.roster,
                &self.termination,
                &self.event_handler,
                &self.live_generation,
                generation,
            ));
            state.scheduler = Arc::clone(&scheduler);
            state.generation = generation;
            self.live_generation.store(generation, Ordering::SeqCst);
            (scheduler, generation)
        };

        match trigger {
            ResetTrigger::NewRun => log::debug!("roster reset #{}: {}", generation, trigger),
            _ => log::info!("roster reset #{}: {}", generation, trigger),
        }

        if let Some(handler) = &self.event_handler {
            handler
                .on_team_event(&TeamEvent::RosterReset {
                    trigger,
                    generation,
                })
                .await;
        }
        scheduler
    }
}
