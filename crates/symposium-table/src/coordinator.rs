//! Coordinator - runs every philosopher concurrently and detects when the
//! whole table is full.
//!
//! Each philosopher runs as its own tokio task. Completion is a fan-in over a
//! [`JoinSet`]: the coordinator sleeps in `join_next` until a philosopher
//! finishes, and never polls shared flags.
//!
//! # Stopping early
//!
//! A [`CancellationToken`] is threaded through every back-off and thinking
//! wait. Cancelling it (or hitting the configured timeout, or any philosopher
//! reporting a protocol violation) stops the others at their next wait.
//! Meals in progress are never cut short, so every fork is back on the table
//! by the time [`Coordinator::run`] returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{millis, DelayRange, TableConfig, Timing};
use crate::error::{Error, Result};
use crate::events::{EventSink, TableEvent};
use crate::philosopher::{Pause, Philosopher, PhilosopherReport};
use crate::table::Table;

/// Outcome of a finished table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    /// One report per philosopher, ordered by seat.
    pub reports: Vec<PhilosopherReport>,

    /// Wall-clock time from start to the last philosopher finishing.
    #[serde(rename = "elapsed_ms", with = "millis")]
    pub elapsed: Duration,
}

impl TableSummary {
    /// Meals eaten across the table.
    pub fn total_meals(&self) -> u64 {
        self.reports.iter().map(|r| u64::from(r.meals)).sum()
    }

    /// Failed acquisitions across the table.
    pub fn total_contentions(&self) -> u64 {
        self.reports.iter().map(|r| r.contentions).sum()
    }
}

/// Runs a table of philosophers to completion.
pub struct Coordinator {
    config: TableConfig,
    table: Table,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Validate `config` and lay the table. No philosopher starts until
    /// [`run`](Self::run).
    pub fn new(config: TableConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let table = Table::new(config.philosophers);

        debug!(
            philosophers = config.philosophers,
            meals = config.meals,
            timeout = ?config.timeout,
            seed = ?config.seed,
            "Laid table"
        );

        Ok(Self {
            config,
            table,
            sink,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Handle on the forks, for observing them while the table runs.
    pub fn table(&self) -> Table {
        self.table.clone()
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every philosopher until all are full.
    ///
    /// Reports [`TableEvent::AllDone`] exactly once on success. On failure
    /// the first meaningful error wins: a protocol violation is preferred over
    /// the cancellations it causes in the other philosophers.
    pub async fn run(self) -> Result<TableSummary> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for philosopher in self.table.seat_all(self.config.meals, &self.sink) {
            let rng = match self.config.seed {
                Some(seed) => {
                    StdRng::seed_from_u64(seed.wrapping_add(philosopher.id().0 as u64))
                }
                None => StdRng::from_entropy(),
            };
            tasks.spawn(dine(
                philosopher,
                self.config.timing,
                rng,
                self.cancel.child_token(),
            ));
        }

        info!(
            philosophers = self.config.philosophers,
            meals = self.config.meals,
            "Philosophers seated"
        );

        let reports = gather(&mut tasks, self.config.timeout, &self.cancel).await?;
        let summary = TableSummary {
            reports,
            elapsed: started.elapsed(),
        };

        debug_assert!(self.table.is_clear());
        self.sink.emit(TableEvent::AllDone {
            meals: summary.total_meals(),
        });
        info!(
            meals = summary.total_meals(),
            contentions = summary.total_contentions(),
            elapsed = ?summary.elapsed,
            "Everyone is full"
        );

        Ok(summary)
    }
}

/// Collect every philosopher, giving up once `timeout` has passed.
async fn gather(
    tasks: &mut JoinSet<Result<PhilosopherReport>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Vec<PhilosopherReport>> {
    let mut failure = None;
    let Some(limit) = timeout else {
        return collect(tasks, &mut failure, cancel).await;
    };

    let timed = tokio::time::timeout(limit, collect(tasks, &mut failure, cancel)).await;
    match timed {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(timeout = ?limit, "Table timed out, stopping philosophers");
            cancel.cancel();
            drain(tasks, &mut failure).await;
            // A violation seen before the deadline outranks it.
            match failure {
                Some(e) if !matches!(e, Error::Cancelled) => Err(e),
                _ => Err(Error::Timeout(limit)),
            }
        }
    }
}

/// Await every philosopher. On the first failure, cancel the rest and keep
/// waiting so their meals finish.
///
/// The failure lives in the caller so it survives this future being dropped
/// at the deadline.
async fn collect(
    tasks: &mut JoinSet<Result<PhilosopherReport>>,
    failure: &mut Option<Error>,
    cancel: &CancellationToken,
) -> Result<Vec<PhilosopherReport>> {
    let mut reports = Vec::with_capacity(tasks.len());

    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(Error::from).and_then(|outcome| outcome) {
            Ok(report) => {
                debug!(
                    philosopher = report.id.0,
                    meals = report.meals,
                    contentions = report.contentions,
                    "Philosopher is full"
                );
                reports.push(report);
            }
            Err(e) => {
                if record(failure, e) {
                    cancel.cancel();
                }
            }
        }
    }

    if let Some(e) = failure.take() {
        return Err(e);
    }
    reports.sort_by_key(|r| r.id);
    Ok(reports)
}

/// Wait for already-cancelled philosophers to wind down, still recording
/// any violation they report on the way out.
async fn drain(tasks: &mut JoinSet<Result<PhilosopherReport>>, failure: &mut Option<Error>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined.map_err(Error::from).and_then(|outcome| outcome) {
            record(failure, e);
        }
    }
}

/// Keep the first meaningful failure. A protocol violation replaces the
/// cancellations it caused, never the other way round. Returns whether `e`
/// was kept.
fn record(failure: &mut Option<Error>, e: Error) -> bool {
    let replace = match failure {
        None => true,
        Some(Error::Cancelled) => !matches!(e, Error::Cancelled),
        Some(_) => false,
    };
    if replace {
        if !matches!(e, Error::Cancelled) {
            warn!(error = %e, "Philosopher failed, stopping the table");
        }
        *failure = Some(e);
    }
    replace
}

/// Drive one philosopher, supplying the waits its state machine asks for.
async fn dine(
    mut philosopher: Philosopher,
    timing: Timing,
    mut rng: StdRng,
    cancel: CancellationToken,
) -> Result<PhilosopherReport> {
    let own = Arc::clone(philosopher.own_fork());

    loop {
        // Registered before the attempt on the own fork: only a release by the
        // neighbour that beat us to it ends the back-off early.
        let released = own.released_signal();
        tokio::pin!(released);
        released.as_mut().enable();

        match philosopher.advance()? {
            // Holding both forks; runs to completion even when cancelled.
            Pause::Eat => pause(timing.eat, &mut rng).await,
            Pause::BackOff => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = &mut released => {}
                    () = pause(timing.acquire, &mut rng) => {}
                }
            }
            Pause::Think => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = pause(timing.think, &mut rng) => {}
                }
            }
            Pause::Finished => return Ok(philosopher.report()),
        }
    }
}

async fn pause(range: DelayRange, rng: &mut StdRng) {
    let delay = range.sample(rng);
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}
