//! Symposium Table - deadlock-free fork arbitration for dining philosophers
//!
//! N philosophers sit around a ring of N forks. Philosopher `i` needs fork `i`
//! and fork `(i + 1) % N` to eat. This crate runs them concurrently until each
//! has eaten a target number of meals, without deadlock and without any
//! central lock.
//!
//! # Overview
//!
//! ## Arbitration
//!
//! A [`Philosopher`] picks up its own fork, then tries its right-hand fork
//! without blocking. If that fails it puts its own fork straight back down and
//! thinks before trying again:
//!
//! - **No circular wait**: nobody ever waits while holding a fork
//! - **No lockstep livelock**: back-off and thinking times are randomized
//! - **Idempotent completion**: a full philosopher never eats again
//!
//! ## Coordination
//!
//! The [`Coordinator`] runs every philosopher as a tokio task and fans their
//! completions in. [`TableEvent::AllDone`] is reported once, after every fork is
//! back on the table. A cancellation token and an optional timeout stop a run
//! early.
//!
//! ## Deterministic runs
//!
//! [`Simulation`] drives the same state machine on one thread with zero-length
//! pauses, checking mutual exclusion after every step.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use symposium_table::{Coordinator, TableConfig, TracingSink};
//!
//! let coordinator = Coordinator::new(TableConfig::default(), Arc::new(TracingSink))?;
//! let summary = coordinator.run().await?;
//! assert_eq!(summary.total_meals(), 15);
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fork;
pub mod philosopher;
pub mod simulation;
pub mod table;

pub use config::{DelayRange, TableConfig, Timing};
pub use coordinator::{Coordinator, TableSummary};
pub use error::{Error, Result, Violation};
pub use events::{EventSink, Fanout, NullSink, Recorder, TableEvent, TracingSink};
pub use fork::{Fork, ForkId};
pub use philosopher::{Pause, Philosopher, PhilosopherId, PhilosopherReport, PhilosopherState};
pub use simulation::{Schedule, Simulation, SimulationConfig, SimulationOutcome};
pub use table::Table;

// Re-exported so callers can build and cancel tokens without a direct dependency.
pub use tokio_util::sync::CancellationToken;
