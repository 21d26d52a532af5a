//! Team event system.
//!
//! Provides a callback-based observability layer for the team engine. Implement
//! [`EventHandler`] to receive real-time notifications about:
//!
//! - **Run lifecycle**: run start/end, pre-flight input rejection
//! - **Turns**: each worker dispatch, response and failure
//! - **Termination**: which condition ended the conversation
//! - **Budget**: per-attempt token estimates and budget exhaustion
//! - **Recovery**: every roster reset and what triggered it
//! - **Health**: every supervisor poll result
//!
//! The single method has a default no-op implementation, so you only match what you care
//! about. The handler is wrapped in `Arc<dyn EventHandler>` and shared between the run
//! context and the supervisor task, so it must be `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use palette::event::{EventHandler, TeamEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_team_event(&self, event: &TeamEvent) {
//!         match event {
//!             TeamEvent::TurnCompleted { worker, response_length, .. } => {
//!                 println!("{} answered ({} chars)", worker, response_length);
//!             }
//!             TeamEvent::RosterReset { trigger, .. } => println!("reset: {}", trigger),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use crate::palette::health::HealthStatus;
use crate::palette::roster::ResetTrigger;
use async_trait::async_trait;

/// Events emitted by a [`Team`](crate::Team) and its components.
#[derive(Debug, Clone)]
pub enum TeamEvent {
    /// A call to [`Team::run`](crate::Team::run) passed the pre-flight gate.
    RunStarted {
        run_id: String,
        worker_count: usize,
        task_preview: String,
    },

    /// The pre-flight gate refused the task; no turn was scheduled.
    InputRejected {
        run_id: String,
        token_count: usize,
        max_limit: usize,
    },

    /// A worker is about to be invoked. `turn` is 1-based within the attempt.
    TurnStarted {
        worker: String,
        turn: usize,
    },

    /// A worker's message was appended to the transcript.
    TurnCompleted {
        worker: String,
        turn: usize,
        response_length: usize,
    },

    /// A worker's client failed; the attempt is aborted.
    TurnFailed {
        worker: String,
        turn: usize,
        error: String,
    },

    /// A termination condition fired on the latest message.
    Terminated {
        worker: String,
        turn: usize,
        reason: String,
    },

    /// One governor attempt ran to completion.
    AttemptCompleted {
        run_id: String,
        attempt: usize,
        token_estimate: usize,
        over_threshold: bool,
    },

    /// Every attempt overflowed; the last result is returned anyway.
    BudgetExhausted {
        run_id: String,
        attempts: usize,
        token_estimate: usize,
        threshold: usize,
    },

    /// The active scheduler and transcript were replaced.
    RosterReset {
        trigger: ResetTrigger,
        generation: u64,
    },

    /// The supervisor finished a poll.
    HealthChecked { status: HealthStatus },

    /// `run` returned a result.
    RunCompleted {
        run_id: String,
        attempts: usize,
        token_estimate: usize,
        messages: usize,
    },
}

/// Receives [`TeamEvent`]s. The default implementation ignores everything.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_team_event(&self, _event: &TeamEvent) {}
}
