//! # Palette
//!
//! Palette runs a small team of LLM-backed workers on a task in strict round-robin order until
//! one of them says the agreed termination phrase, while keeping two things in check:
//!
//! * **Cost**: a [`TokenGovernor`] estimates the size of every finished conversation and, when
//!   it crosses the configured threshold, discards it and re-forms the team (at most three
//!   attempts). A pre-flight [`InputGate`] refuses tasks that are too large to send at all.
//! * **Health**: a [`HealthSupervisor`] task polls the live transcript every few seconds, spots
//!   stalled exchanges and known failure signatures, and resets the team on its own when the
//!   problem is one it knows how to recover from.
//!
//! Both mechanisms act through one primitive, [`RosterHandle::reset`], which swaps the active
//! [`TurnScheduler`] (and with it the transcript) atomically.
//!
//! ## Building blocks
//!
//! | Type                     | Role                                                         |
//! |--------------------------|--------------------------------------------------------------|
//! | [`ClientWrapper`]        | one model backend (`send_message(history) -> Message`)        |
//! | [`Worker`]               | a named participant: client + system prompt + description    |
//! | [`Roster`]               | the ordered workers of a team (at least two)                 |
//! | [`TerminationCondition`] | text mention, external stop flag, or any of several          |
//! | [`TurnScheduler`]        | lazy round-robin stream of transcript messages               |
//! | [`TokenGovernor`]        | threshold + bounded retries over whole runs                  |
//! | [`HealthSupervisor`]     | background classification and automatic recovery             |
//! | [`Team`]                 | composition root built from [`TeamBuilder`]                  |
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use palette::{ConfigMap, TeamBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     palette::init_logger();
//!
//!     let config = ConfigMap::new()
//!         .with("provider_1", "ollama")
//!         .with("agent_1", "llama3")
//!         .with("system_message_1", "You solve programming problems in C++ with no explanation.")
//!         .with("description_1", "Coding assistant")
//!         .with("provider_2", "ollama")
//!         .with("agent_2", "llama3")
//!         .with("system_message_2", "You review code. Reply with 'Approve' once it is correct.")
//!         .with("description_2", "Code reviewer");
//!
//!     let team = TeamBuilder::new()
//!         .with_config(config)
//!         .with_token_threshold(4000)
//!         .build()?;
//!
//!     let result = team.run("Reverse a singly linked list.").await?;
//!     println!("{} messages, ~{} tokens", result.transcript.len(), result.token_estimate);
//!     team.stop_supervisor().await;
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding Palette can opt in to `RUST_LOG` driven diagnostics without choosing
/// a logging backend upfront.
///
/// ```rust
/// palette::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `palette` module.
pub mod palette;

// Re-exporting key items for easier external access.
pub use palette::client_wrapper;
pub use palette::client_wrapper::{ClientError, ClientWrapper, Message, Role, TokenUsage};
pub use palette::clients;
pub use palette::config;
pub use palette::config::{ConfigMap, WorkerSpec};
pub use palette::error::{ConfigurationError, SupervisorError, TeamError};
pub use palette::event;
pub use palette::event::{EventHandler, TeamEvent};
pub use palette::governor;
pub use palette::governor::{RunResult, TokenGovernor};
pub use palette::health;
pub use palette::health::{HealthClassifier, HealthKind, HealthStatus, LexicalClassifier};
pub use palette::input_gate;
pub use palette::input_gate::{InputGate, InputTokenCheck, Tokenizer};
pub use palette::roster::{ResetTrigger, Roster, RosterHandle};
pub use palette::scheduler::{TurnOutcome, TurnScheduler, TurnStream};
pub use palette::supervisor;
pub use palette::supervisor::{HealthReport, HealthSupervisor, SupervisorConfig};
pub use palette::termination::{ExternalTermination, TerminationCondition};
pub use palette::transcript::{MessageSource, Transcript, TranscriptMessage};
pub use palette::worker::Worker;
pub use palette::{Team, TeamBuilder};
