//! Error taxonomy for the team engine.
//!
//! Configuration problems are fatal and surface before any run starts. Worker failures abort
//! the run attempt that hit them. Supervisor failures never leave the supervisor task: they
//! are logged and the poll loop backs off.
//!
//! Two outcomes that look like errors are deliberately *not* represented here:
//!
//! - An oversized task is refused by the pre-flight gate and returned as an empty
//!   [`RunResult`](crate::RunResult) whose `input_rejection` carries the diagnostic.
//! - An exhausted token budget returns the last over-threshold `RunResult`.
//!
//! # Example
//!
//! ```
//! use palette::ConfigurationError;
//!
//! let err = ConfigurationError::MissingFields(vec!["system_message_2".into()]);
//! assert_eq!(err.to_string(), "Missing required config fields: system_message_2");
//! ```

use crate::client_wrapper::ClientError;
use std::error::Error;
use std::fmt;

/// Roster or settings could not be resolved into a runnable team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Required per-slot fields that resolved to nothing, in slot order
    /// (e.g. `["agent_2", "system_message_2"]`).
    MissingFields(Vec<String>),

    /// A scheduler needs at least two workers; carries the size that was supplied.
    RosterTooSmall(usize),

    /// A field resolved to a value that cannot be used (unknown provider, bad number, ...).
    InvalidValue { field: String, reason: String },

    /// A configuration file could not be read or parsed.
    File(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingFields(fields) => {
                write!(f, "Missing required config fields: {}", fields.join(", "))
            }
            ConfigurationError::RosterTooSmall(n) => write!(
                f,
                "A team needs at least two workers with resolvable clients, got {}",
                n
            ),
            ConfigurationError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
            ConfigurationError::File(msg) => write!(f, "Config file error: {}", msg),
        }
    }
}

impl Error for ConfigurationError {}

/// Errors raised by the background health supervisor.
///
/// These never escape the poll loop; they are logged and trigger the error backoff.
#[derive(Debug, Clone)]
pub enum SupervisorError {
    /// Shared roster state was poisoned by a panicking writer.
    StatePoisoned(String),
    /// A classifier panicked or otherwise failed mid-poll.
    CheckFailed(String),
    /// No tokio runtime was available to host the background task.
    NoRuntime,
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::StatePoisoned(msg) => write!(f, "Shared state poisoned: {}", msg),
            SupervisorError::CheckFailed(msg) => write!(f, "Health check failed: {}", msg),
            SupervisorError::NoRuntime => {
                write!(f, "Supervisor requires a running tokio runtime")
            }
        }
    }
}

impl Error for SupervisorError {}

/// Errors returned from [`Team`](crate::Team) construction and [`Team::run`](crate::Team::run).
#[derive(Debug)]
pub enum TeamError {
    /// Roster or settings could not be resolved.
    Configuration(ConfigurationError),

    /// A worker's client failed during its turn. The source error is kept verbatim.
    WorkerInvocation { worker: String, source: ClientError },

    /// `run` was called while another `run` on the same team was still in flight.
    RunInProgress,

    /// The supervisor could not be started.
    Supervisor(SupervisorError),
}

impl fmt::Display for TeamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamError::Configuration(e) => write!(f, "Configuration error: {}", e),
            TeamError::WorkerInvocation { worker, source } => {
                write!(f, "Worker '{}' failed: {}", worker, source)
            }
            TeamError::RunInProgress => write!(f, "A run is already in progress on this team"),
            TeamError::Supervisor(e) => write!(f, "Supervisor error: {}", e),
        }
    }
}

impl Error for TeamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TeamError::Configuration(e) => Some(e),
            TeamError::WorkerInvocation { source, .. } => Some(source.as_ref()),
            TeamError::RunInProgress => None,
            TeamError::Supervisor(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for TeamError {
    fn from(e: ConfigurationError) -> Self {
        TeamError::Configuration(e)
    }
}

impl From<SupervisorError> for TeamError {
    fn from(e: SupervisorError) -> Self {
        TeamError::Supervisor(e)
    }
}
