//! Deterministic, single-threaded table runs.
//!
//! The same [`Philosopher`] state machine the [`Coordinator`](crate::Coordinator)
//! drives, but with every pause taking zero time and the interleaving chosen by
//! a [`Schedule`]. One *step* gives one philosopher the floor until its next
//! pause. Mutual exclusion is checked after every step, and a run that has not
//! terminated within its step budget fails instead of hanging.

use std::sync::Arc;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{TableConfig, DEFAULT_MEALS, DEFAULT_PHILOSOPHERS};
use crate::error::{Error, Result, Violation};
use crate::events::{EventSink, TableEvent};
use crate::fork::ForkId;
use crate::philosopher::{Pause, Philosopher, PhilosopherId, PhilosopherReport};
use crate::table::Table;

/// Order in which philosophers get the floor within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Seat order, every round.
    RoundRobin,
    /// A fresh seeded shuffle every round.
    Shuffled { seed: u64 },
}

/// Configuration for the simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub philosophers: usize,
    pub meals: u32,
    pub schedule: Schedule,
    /// Give up after this many steps.
    pub max_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            philosophers: DEFAULT_PHILOSOPHERS,
            meals: DEFAULT_MEALS,
            schedule: Schedule::Shuffled { seed: 42 },
            max_steps: 100_000,
        }
    }
}

impl SimulationConfig {
    /// Take population and meal target from a table configuration.
    pub fn from_table(config: &TableConfig, schedule: Schedule) -> Self {
        Self {
            philosophers: config.philosophers,
            meals: config.meals,
            schedule,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        TableConfig::default()
            .with_philosophers(self.philosophers)
            .with_meals(self.meals)
            .validate()
    }
}

/// What a finished simulation observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Scheduling steps taken.
    pub steps: u64,
    /// Rounds started.
    pub rounds: u64,
    /// Most philosophers holding both forks at once.
    pub peak_eating: usize,
    /// One report per philosopher, ordered by seat.
    pub reports: Vec<PhilosopherReport>,
}

impl SimulationOutcome {
    pub fn total_meals(&self) -> u64 {
        self.reports.iter().map(|r| u64::from(r.meals)).sum()
    }

    /// Longest run of failed acquisitions any philosopher suffered.
    pub fn worst_streak(&self) -> u64 {
        self.reports.iter().map(|r| r.longest_streak).max().unwrap_or(0)
    }
}

/// A deterministic table.
pub struct Simulation {
    config: SimulationConfig,
    table: Table,
    philosophers: Vec<Philosopher>,
    finished: Vec<bool>,
    sink: Arc<dyn EventSink>,
    steps: u64,
    rounds: u64,
    peak_eating: usize,
}

impl Simulation {
    /// Validate the configuration and seat everyone.
    pub fn new(config: SimulationConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let table = Table::new(config.philosophers);
        let philosophers = table.seat_all(config.meals, &sink);
        let finished = vec![false; philosophers.len()];

        Ok(Self {
            config,
            table,
            philosophers,
            finished,
            sink,
            steps: 0,
            rounds: 0,
            peak_eating: 0,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn philosophers(&self) -> &[Philosopher] {
        &self.philosophers
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Whether every philosopher has finished.
    pub fn is_finished(&self) -> bool {
        self.finished.iter().all(|&f| f)
    }

    /// Give one philosopher the floor until its next pause.
    pub fn step(&mut self, seat: PhilosopherId) -> Result<Pause> {
        let seats = self.philosophers.len();
        let Some(philosopher) = self.philosophers.get_mut(seat.0) else {
            return Err(Error::InvalidConfig(format!("no seat {seat} at a table of {seats}")));
        };
        if self.steps >= self.config.max_steps {
            return Err(Error::StepLimit { steps: self.steps });
        }
        self.steps += 1;

        let pause = philosopher.advance()?;
        if pause == Pause::Finished {
            self.finished[seat.0] = true;
        }

        self.check_exclusion()?;
        let eating = self.philosophers.iter().filter(|p| p.is_eating()).count();
        self.peak_eating = self.peak_eating.max(eating);
        Ok(pause)
    }

    /// Run rounds until everyone is full, then report `AllDone`.
    pub fn run(mut self) -> Result<SimulationOutcome> {
        let mut order: Vec<usize> = (0..self.philosophers.len()).collect();
        let mut rng = match self.config.schedule {
            Schedule::RoundRobin => None,
            Schedule::Shuffled { seed } => Some(StdRng::seed_from_u64(seed)),
        };

        while !self.is_finished() {
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }
            self.rounds += 1;
            for &seat in &order {
                if !self.finished[seat] {
                    self.step(PhilosopherId(seat))?;
                }
            }
        }

        debug_assert!(self.table.is_clear());
        let reports: Vec<_> = self.philosophers.iter().map(Philosopher::report).collect();
        let outcome = SimulationOutcome {
            steps: self.steps,
            rounds: self.rounds,
            peak_eating: self.peak_eating,
            reports,
        };

        debug!(
            steps = outcome.steps,
            rounds = outcome.rounds,
            peak_eating = outcome.peak_eating,
            schedule = ?self.config.schedule,
            "Simulation finished"
        );
        self.sink.emit(TableEvent::AllDone {
            meals: outcome.total_meals(),
        });
        Ok(outcome)
    }

    /// Every fork's holder must be exactly the philosopher that believes it
    /// holds it.
    fn check_exclusion(&self) -> Result<()> {
        let mut believed: Vec<Option<PhilosopherId>> = vec![None; self.table.seats()];
        for philosopher in &self.philosophers {
            for ForkId(f) in philosopher.holding() {
                if believed[f].replace(philosopher.id()).is_some() {
                    return Err(self.contested(ForkId(f), philosopher.id()));
                }
            }
        }
        for (f, holder) in self.table.holders().into_iter().enumerate() {
            if holder != believed[f] {
                let actor = believed[f].or(holder).unwrap_or(PhilosopherId(f));
                return Err(self.contested(ForkId(f), actor));
            }
        }
        Ok(())
    }

    fn contested(&self, fork: ForkId, actor: PhilosopherId) -> Error {
        Error::ProtocolViolation {
            fork,
            actor,
            kind: Violation::Contested,
        }
    }
}
