//! The philosopher state machine and its fork arbitration rule.
//!
//! # Why this cannot deadlock
//!
//! Every philosopher picks up its own fork first and its right-hand fork
//! second. If the second fork is taken, the first is put down *immediately*,
//! before any waiting happens. A philosopher therefore never waits while
//! holding a fork, so the wait-for graph has no edges out of a fork holder and
//! no circular wait can form.
//!
//! Waiting is not done here at all. [`Philosopher::advance`] runs the machine
//! until it reaches a [`Pause`] and returns it; the driver decides how long to
//! pause (random delays in [`Coordinator`](crate::Coordinator), nothing at all in
//! [`Simulation`](crate::Simulation)). Deadlock freedom does not depend on the
//! timing; randomness only breaks up lockstep retries.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, Violation};
use crate::events::{EventSink, TableEvent};
use crate::fork::{Fork, ForkId};

/// Seat number of a philosopher. Also the id of its own fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhilosopherId(pub usize);

impl fmt::Display for PhilosopherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a philosopher is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhilosopherState {
    /// Seated, has not tried anything yet.
    Idle,
    /// About to try its own fork.
    AcquiringOwn,
    /// Holds its own fork, about to try the right-hand fork.
    AcquiringOther,
    /// Holds both forks, about to count the meal.
    Eating,
    /// Holds both forks while the meal lasts; puts them down next.
    Releasing,
    /// Holds nothing; thinks before the next attempt.
    Thinking,
    /// Full. Never acquires again.
    Done,
}

impl fmt::Display for PhilosopherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AcquiringOwn => write!(f, "AcquiringOwn"),
            Self::AcquiringOther => write!(f, "AcquiringOther"),
            Self::Eating => write!(f, "Eating"),
            Self::Releasing => write!(f, "Releasing"),
            Self::Thinking => write!(f, "Thinking"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// A point where the driver has to wait before calling
/// [`Philosopher::advance`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// The own fork was taken. Holds nothing; back off, then retry.
    BackOff,
    /// Holds both forks. Eat for a while. Must not be cut short.
    Eat,
    /// Holds nothing. Think for a while.
    Think,
    /// Full and holding nothing. The philosopher is finished.
    Finished,
}

/// What a philosopher did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhilosopherReport {
    pub id: PhilosopherId,
    /// Meals eaten. Never exceeds the target.
    pub meals: u32,
    /// Attempts to pick up the own fork.
    pub attempts: u64,
    /// Failed acquisitions of either fork.
    pub contentions: u64,
    /// Longest run of failed acquisitions between two meals.
    pub longest_streak: u64,
}

/// One philosopher at the table.
///
/// Only the philosopher's own driver mutates it. The forks are shared with the
/// neighbours; everything else is private.
pub struct Philosopher {
    id: PhilosopherId,
    own: Arc<Fork>,
    right: Arc<Fork>,
    target: u32,
    state: PhilosopherState,
    meals: u32,
    done: bool,
    thinking: bool,
    attempts: u64,
    contentions: u64,
    streak: u64,
    longest_streak: u64,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Philosopher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Philosopher")
            .field("id", &self.id)
            .field("own", &self.own.id())
            .field("right", &self.right.id())
            .field("state", &self.state)
            .field("meals", &self.meals)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Philosopher {
    /// Seat a philosopher between its own fork and its right-hand neighbour's.
    pub fn new(
        id: PhilosopherId,
        own: Arc<Fork>,
        right: Arc<Fork>,
        target: u32,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id,
            own,
            right,
            target,
            state: PhilosopherState::Idle,
            meals: 0,
            done: false,
            thinking: false,
            attempts: 0,
            contentions: 0,
            streak: 0,
            longest_streak: 0,
            sink,
        }
    }

    pub const fn id(&self) -> PhilosopherId {
        self.id
    }

    pub const fn state(&self) -> PhilosopherState {
        self.state
    }

    pub const fn meals(&self) -> u32 {
        self.meals
    }

    /// Whether the meal target has been reached.
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the philosopher currently holds both forks.
    pub fn is_eating(&self) -> bool {
        matches!(
            self.state,
            PhilosopherState::Eating | PhilosopherState::Releasing
        )
    }

    /// The forks this philosopher holds, derived from its state.
    pub fn holding(&self) -> Vec<ForkId> {
        match self.state {
            PhilosopherState::AcquiringOther => vec![self.own.id()],
            PhilosopherState::Eating | PhilosopherState::Releasing => {
                vec![self.own.id(), self.right.id()]
            }
            _ => Vec::new(),
        }
    }

    pub fn own_fork(&self) -> &Arc<Fork> {
        &self.own
    }

    pub fn report(&self) -> PhilosopherReport {
        PhilosopherReport {
            id: self.id,
            meals: self.meals,
            attempts: self.attempts,
            contentions: self.contentions,
            longest_streak: self.longest_streak,
        }
    }

    /// Run the state machine up to the next pause.
    ///
    /// Each call performs at most one full acquire/eat/release pass, so the
    /// loop below is bounded.
    pub fn advance(&mut self) -> Result<Pause> {
        loop {
            if let Some(pause) = self.step()? {
                return Ok(pause);
            }
        }
    }

    /// Perform a single transition. `None` means continue without waiting.
    fn step(&mut self) -> Result<Option<Pause>> {
        match self.state {
            PhilosopherState::Idle => {
                self.state = PhilosopherState::AcquiringOwn;
                Ok(None)
            }
            PhilosopherState::AcquiringOwn => {
                if self.done {
                    self.state = PhilosopherState::Done;
                    return Ok(Some(Pause::Finished));
                }
                self.attempts += 1;
                if self.own.try_acquire(self.id)? {
                    self.state = PhilosopherState::AcquiringOther;
                    Ok(None)
                } else {
                    self.contended();
                    trace!(
                        philosopher = self.id.0,
                        fork = self.own.id().0,
                        "own fork taken, backing off"
                    );
                    Ok(Some(Pause::BackOff))
                }
            }
            PhilosopherState::AcquiringOther => {
                if self.right.try_acquire(self.id)? {
                    self.state = PhilosopherState::Eating;
                } else {
                    // Never wait while holding a fork.
                    self.own.release(self.id)?;
                    self.contended();
                    trace!(
                        philosopher = self.id.0,
                        fork = self.right.id().0,
                        "right fork taken, putting own fork down"
                    );
                    self.state = PhilosopherState::Thinking;
                }
                Ok(None)
            }
            PhilosopherState::Eating => {
                if self.done {
                    return Err(self.own.violation(self.id, Violation::EatAfterDone));
                }
                self.meals += 1;
                self.streak = 0;
                self.thinking = false;
                self.sink.emit(TableEvent::Eating {
                    philosopher: self.id,
                    meals: self.meals,
                });
                if self.meals >= self.target {
                    self.done = true;
                    self.sink.emit(TableEvent::Full {
                        philosopher: self.id,
                    });
                }
                self.state = PhilosopherState::Releasing;
                Ok(Some(Pause::Eat))
            }
            PhilosopherState::Releasing => {
                // Reported while still holding both forks, so the report never
                // overlaps a neighbour's meal.
                self.sink.emit(TableEvent::FinishedEating {
                    philosopher: self.id,
                });
                self.own.release(self.id)?;
                self.right.release(self.id)?;
                if self.done {
                    self.state = PhilosopherState::Done;
                    Ok(Some(Pause::Finished))
                } else {
                    self.state = PhilosopherState::Thinking;
                    Ok(None)
                }
            }
            PhilosopherState::Thinking => {
                if self.done {
                    self.state = PhilosopherState::Done;
                    return Ok(Some(Pause::Finished));
                }
                if !self.thinking {
                    self.thinking = true;
                    self.sink.emit(TableEvent::Thinking {
                        philosopher: self.id,
                    });
                }
                self.state = PhilosopherState::AcquiringOwn;
                Ok(Some(Pause::Think))
            }
            PhilosopherState::Done => Ok(Some(Pause::Finished)),
        }
    }

    fn contended(&mut self) {
        self.contentions += 1;
        self.streak += 1;
        self.longest_streak = self.longest_streak.max(self.streak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::events::Recorder;

    fn pair(target: u32) -> (Philosopher, Arc<Fork>, Arc<Fork>, Recorder) {
        let own = Arc::new(Fork::new(ForkId(0)));
        let right = Arc::new(Fork::new(ForkId(1)));
        let recorder = Recorder::new();
        let philosopher = Philosopher::new(
            PhilosopherId(0),
            Arc::clone(&own),
            Arc::clone(&right),
            target,
            Arc::new(recorder.clone()),
        );
        (philosopher, own, right, recorder)
    }

    fn eating(meals: u32) -> TableEvent {
        TableEvent::Eating {
            philosopher: PhilosopherId(0),
            meals,
        }
    }

    fn thinking() -> TableEvent {
        TableEvent::Thinking {
            philosopher: PhilosopherId(0),
        }
    }

    #[test]
    fn uncontended_philosopher_eats_straight_away() {
        let (mut p, own, right, recorder) = pair(2);

        assert_eq!(p.advance().unwrap(), Pause::Eat);
        assert_eq!(p.state(), PhilosopherState::Releasing);
        assert_eq!(own.holder(), Some(PhilosopherId(0)));
        assert_eq!(right.holder(), Some(PhilosopherId(0)));
        assert_eq!(p.holding(), vec![ForkId(0), ForkId(1)]);
        assert_eq!(recorder.events(), vec![eating(1)]);
    }

    #[test]
    fn releases_both_forks_then_thinks() {
        let (mut p, own, right, recorder) = pair(2);
        p.advance().unwrap();

        assert_eq!(p.advance().unwrap(), Pause::Think);
        assert!(own.is_available());
        assert!(right.is_available());
        assert!(p.holding().is_empty());
        assert_eq!(
            recorder.events()[1..],
            [
                TableEvent::FinishedEating {
                    philosopher: PhilosopherId(0),
                },
                thinking(),
            ]
        );
    }

    #[test]
    fn backs_off_when_own_fork_is_taken() {
        let (mut p, own, right, _) = pair(1);
        assert!(own.try_acquire(PhilosopherId(4)).unwrap());

        assert_eq!(p.advance().unwrap(), Pause::BackOff);
        assert_eq!(p.state(), PhilosopherState::AcquiringOwn);
        assert!(right.is_available());
        assert_eq!(p.report().contentions, 1);
    }

    #[test]
    fn puts_own_fork_down_when_right_fork_is_taken() {
        let (mut p, own, right, recorder) = pair(1);
        assert!(right.try_acquire(PhilosopherId(1)).unwrap());

        assert_eq!(p.advance().unwrap(), Pause::Think);
        assert!(own.is_available(), "own fork must not be kept while waiting");
        assert_eq!(right.holder(), Some(PhilosopherId(1)));
        assert!(p.holding().is_empty());
        assert_eq!(recorder.events(), vec![thinking()]);
    }

    #[test]
    fn thinking_is_reported_once_per_meal() {
        let (mut p, _own, right, recorder) = pair(2);
        assert!(right.try_acquire(PhilosopherId(1)).unwrap());

        for _ in 0..5 {
            assert_eq!(p.advance().unwrap(), Pause::Think);
        }
        assert_eq!(
            recorder.count(|e| matches!(e, TableEvent::Thinking { .. })),
            1
        );

        right.release(PhilosopherId(1)).unwrap();
        assert_eq!(p.advance().unwrap(), Pause::Eat);
        assert_eq!(p.advance().unwrap(), Pause::Think);
        assert_eq!(
            recorder.count(|e| matches!(e, TableEvent::Thinking { .. })),
            2
        );
    }

    #[test]
    fn full_is_reported_exactly_at_the_target() {
        let (mut p, _, _, recorder) = pair(3);

        loop {
            let pause = p.advance().unwrap();
            if pause == Pause::Eat {
                let full = recorder.count(|e| matches!(e, TableEvent::Full { .. }));
                assert_eq!(full, usize::from(p.meals() == 3));
            }
            if pause == Pause::Finished {
                break;
            }
        }

        assert_eq!(p.meals(), 3);
        assert!(p.is_done());
        assert_eq!(p.state(), PhilosopherState::Done);
        let events = recorder.events();
        let full_at = events
            .iter()
            .position(|e| matches!(e, TableEvent::Full { .. }))
            .unwrap();
        assert_eq!(events[full_at - 1], eating(3));
    }

    #[test]
    fn done_philosopher_never_eats_again() {
        let (mut p, own, right, recorder) = pair(1);
        assert_eq!(p.advance().unwrap(), Pause::Eat);
        assert_eq!(p.advance().unwrap(), Pause::Finished);

        for _ in 0..3 {
            assert_eq!(p.advance().unwrap(), Pause::Finished);
        }
        assert_eq!(p.meals(), 1);
        assert!(own.is_available());
        assert!(right.is_available());
        assert_eq!(recorder.count(|e| matches!(e, TableEvent::Eating { .. })), 1);
    }

    #[test]
    fn stolen_fork_surfaces_as_a_violation() {
        let (mut p, own, _, _) = pair(1);
        assert_eq!(p.advance().unwrap(), Pause::Eat);

        // Someone else puts the philosopher's fork down behind its back.
        own.release(PhilosopherId(0)).unwrap();

        let err = p.advance().unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation {
                kind: Violation::ReleaseNotHeld,
                ..
            }
        ));
    }

    #[test]
    fn report_tracks_longest_streak() {
        let (mut p, own, _, _) = pair(1);
        assert!(own.try_acquire(PhilosopherId(4)).unwrap());
        for _ in 0..4 {
            assert_eq!(p.advance().unwrap(), Pause::BackOff);
        }
        own.release(PhilosopherId(4)).unwrap();
        assert_eq!(p.advance().unwrap(), Pause::Eat);

        let report = p.report();
        assert_eq!(report.attempts, 5);
        assert_eq!(report.contentions, 4);
        assert_eq!(report.longest_streak, 4);
        assert_eq!(report.meals, 1);
    }
}
