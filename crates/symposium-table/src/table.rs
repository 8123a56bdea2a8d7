//! The ring of forks and the seating of philosophers around it.

use std::sync::Arc;

use crate::events::EventSink;
use crate::fork::{Fork, ForkId};
use crate::philosopher::{Philosopher, PhilosopherId};

/// `seats` forks arranged in a ring. Philosopher `i` sits between fork `i`
/// (its own) and fork `(i + 1) % seats` (its right-hand neighbour's).
#[derive(Debug, Clone)]
pub struct Table {
    forks: Arc<[Arc<Fork>]>,
}

impl Table {
    /// Lay out `seats` available forks.
    pub fn new(seats: usize) -> Self {
        let forks: Vec<_> = (0..seats).map(|i| Arc::new(Fork::new(ForkId(i)))).collect();
        Self {
            forks: forks.into(),
        }
    }

    /// Number of seats (and forks).
    pub fn seats(&self) -> usize {
        self.forks.len()
    }

    pub fn forks(&self) -> &[Arc<Fork>] {
        &self.forks
    }

    pub fn fork(&self, id: ForkId) -> Option<&Arc<Fork>> {
        self.forks.get(id.0)
    }

    /// The fork to the right of a seat.
    pub fn right_of(&self, seat: PhilosopherId) -> ForkId {
        ForkId((seat.0 + 1) % self.seats())
    }

    /// Seat one philosopher per fork, each wired to its own and its right-hand
    /// fork.
    pub fn seat_all(&self, meals: u32, sink: &Arc<dyn EventSink>) -> Vec<Philosopher> {
        (0..self.seats())
            .map(|i| {
                let id = PhilosopherId(i);
                Philosopher::new(
                    id,
                    Arc::clone(&self.forks[i]),
                    Arc::clone(&self.forks[self.right_of(id).0]),
                    meals,
                    Arc::clone(sink),
                )
            })
            .collect()
    }

    /// Current holder of every fork, by position.
    pub fn holders(&self) -> Vec<Option<PhilosopherId>> {
        self.forks.iter().map(|f| f.holder()).collect()
    }

    /// Number of forks currently held.
    pub fn held_count(&self) -> usize {
        self.forks.iter().filter(|f| !f.is_available()).count()
    }

    /// Whether every fork is on the table.
    pub fn is_clear(&self) -> bool {
        self.held_count() == 0
    }

    /// Whether every held fork is held by one of the two philosophers seated
    /// next to it.
    pub fn holders_are_adjacent(&self) -> bool {
        let seats = self.seats();
        self.forks.iter().all(|fork| match fork.holder() {
            None => true,
            Some(p) => {
                let f = fork.id().0;
                p.0 == f || (p.0 + 1) % seats == f
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;

    #[test]
    fn ring_wraps_around() {
        let table = Table::new(5);
        assert_eq!(table.seats(), 5);
        assert_eq!(table.right_of(PhilosopherId(0)), ForkId(1));
        assert_eq!(table.right_of(PhilosopherId(4)), ForkId(0));
    }

    #[test]
    fn neighbours_share_exactly_one_fork() {
        let table = Table::new(5);
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        let seated = table.seat_all(3, &sink);

        for (i, p) in seated.iter().enumerate() {
            assert_eq!(p.id(), PhilosopherId(i));
            assert_eq!(p.own_fork().id(), ForkId(i));
            let right = &seated[(i + 1) % 5];
            assert!(Arc::ptr_eq(
                &table.forks()[table.right_of(p.id()).0],
                right.own_fork()
            ));
        }
    }

    #[test]
    fn two_seats_share_both_forks() {
        let table = Table::new(2);
        assert_eq!(table.right_of(PhilosopherId(0)), ForkId(1));
        assert_eq!(table.right_of(PhilosopherId(1)), ForkId(0));
    }

    #[test]
    fn held_forks_are_counted() {
        let table = Table::new(3);
        assert!(table.is_clear());

        let fork = table.fork(ForkId(2)).unwrap();
        assert!(fork.try_acquire(PhilosopherId(1)).unwrap());

        assert_eq!(table.held_count(), 1);
        assert_eq!(table.holders(), vec![None, None, Some(PhilosopherId(1))]);
        assert!(table.holders_are_adjacent());
        assert!(table.fork(ForkId(3)).is_none());
    }

    #[test]
    fn distant_holder_is_detected() {
        let table = Table::new(5);
        let fork = table.fork(ForkId(3)).unwrap();
        assert!(fork.try_acquire(PhilosopherId(0)).unwrap());
        assert!(!table.holders_are_adjacent());
    }
}
