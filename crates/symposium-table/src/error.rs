//! Error types for symposium-table.

use std::fmt;

use thiserror::Error;

use crate::fork::ForkId;
use crate::philosopher::PhilosopherId;

/// Result type for symposium-table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of misuse that broke the fork protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Released a fork the caller does not hold.
    ReleaseNotHeld,
    /// Tried to pick up a fork the caller already holds.
    Reacquire,
    /// Tried to eat after reaching the meal target.
    EatAfterDone,
    /// A fork's holder disagrees with who believes they hold it.
    Contested,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReleaseNotHeld => write!(f, "released a fork it does not hold"),
            Self::Reacquire => write!(f, "re-acquired a fork it already holds"),
            Self::EatAfterDone => write!(f, "ate after reaching its meal target"),
            Self::Contested => write!(f, "disagrees with the fork's recorded holder"),
        }
    }
}

/// Errors that can occur while running a table.
#[derive(Debug, Error)]
pub enum Error {
    /// A philosopher broke the acquisition protocol. Always a bug; never retried.
    #[error("protocol violation: philosopher {actor} {kind} (fork {fork})")]
    ProtocolViolation {
        fork: ForkId,
        actor: PhilosopherId,
        kind: Violation,
    },

    /// The configuration was rejected before any philosopher started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The table did not finish within the configured timeout.
    #[error("table did not finish within {0:?}")]
    Timeout(std::time::Duration),

    /// A deterministic simulation exceeded its step budget.
    #[error("simulation did not terminate within {steps} steps")]
    StepLimit { steps: u64 },

    /// The run was cancelled from outside.
    #[error("table run was cancelled")]
    Cancelled,

    /// A philosopher task panicked or was aborted by the runtime.
    #[error("philosopher task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskFailed(e.to_string())
    }
}
