//! Forks: exclusive tokens shared by neighbouring philosophers.
//!
//! A fork is a single atomic holder slot. Picking it up is one
//! compare-and-swap from `available` to `held(by)`, so two philosophers can
//! never both observe it free. Putting it down is the reverse swap and wakes
//! every philosopher already waiting on the fork. Nothing is remembered for
//! later waiters, so a release cannot cut a future back-off short.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::error::{Error, Result, Violation};
use crate::philosopher::PhilosopherId;

/// Holder value of a fork nobody holds.
const AVAILABLE: usize = usize::MAX;

/// Position of a fork on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForkId(pub usize);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mutually exclusive fork.
#[derive(Debug)]
pub struct Fork {
    id: ForkId,
    holder: AtomicUsize,
    released: Notify,
}

impl Fork {
    /// Create an available fork.
    #[must_use]
    pub fn new(id: ForkId) -> Self {
        Self {
            id,
            holder: AtomicUsize::new(AVAILABLE),
            released: Notify::new(),
        }
    }

    /// This fork's position.
    #[must_use]
    pub const fn id(&self) -> ForkId {
        self.id
    }

    /// Pick the fork up if nobody holds it. Never blocks.
    ///
    /// Returns `Ok(false)` when a neighbour holds it; that is ordinary
    /// contention, not an error. Picking up a fork the caller already holds is
    /// a [`Violation::Reacquire`].
    pub fn try_acquire(&self, actor: PhilosopherId) -> Result<bool> {
        debug_assert_ne!(actor.0, AVAILABLE);
        match self
            .holder
            .compare_exchange(AVAILABLE, actor.0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(true),
            Err(current) if current == actor.0 => Err(self.violation(actor, Violation::Reacquire)),
            Err(_) => Ok(false),
        }
    }

    /// Put the fork down and wake the philosophers waiting on it.
    ///
    /// Fails with [`Violation::ReleaseNotHeld`] unless `actor` holds the fork.
    pub fn release(&self, actor: PhilosopherId) -> Result<()> {
        self.holder
            .compare_exchange(actor.0, AVAILABLE, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| self.violation(actor, Violation::ReleaseNotHeld))?;
        self.released.notify_waiters();
        Ok(())
    }

    /// Who holds the fork right now, if anyone.
    #[must_use]
    pub fn holder(&self) -> Option<PhilosopherId> {
        match self.holder.load(Ordering::Acquire) {
            AVAILABLE => None,
            id => Some(PhilosopherId(id)),
        }
    }

    /// Whether nobody holds the fork right now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.holder().is_none()
    }

    /// Signal for the next time the fork is put down.
    ///
    /// Only releases after the signal is registered count. Register it with
    /// [`Notified::enable`] *before* a [`try_acquire`](Self::try_acquire) that
    /// may fail, so a release between the failed attempt and the wait is not
    /// missed. A release is not a hand-off: callers must retry rather than
    /// assume the fork is free.
    pub fn released_signal(&self) -> Notified<'_> {
        self.released.notified()
    }

    /// Wait until the fork is put down. Releases before the first poll are
    /// not seen.
    pub async fn released(&self) {
        self.released_signal().await;
    }

    pub(crate) fn violation(&self, actor: PhilosopherId, kind: Violation) -> Error {
        Error::ProtocolViolation {
            fork: self.id,
            actor,
            kind,
        }
    }
}
