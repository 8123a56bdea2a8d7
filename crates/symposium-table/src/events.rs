//! Table events and the sinks that receive them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::philosopher::PhilosopherId;

/// State transitions reported while a table runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TableEvent {
    /// A philosopher holds both forks and started a meal.
    Eating {
        philosopher: PhilosopherId,
        meals: u32,
    },

    /// A philosopher reached its meal target. Emitted once per philosopher.
    Full { philosopher: PhilosopherId },

    /// A philosopher started thinking. Emitted on entry only, not on every
    /// thinking cycle.
    Thinking { philosopher: PhilosopherId },

    /// A philosopher finished a meal and is putting both forks down.
    FinishedEating { philosopher: PhilosopherId },

    /// Every philosopher is full. Emitted once per run.
    AllDone { meals: u64 },
}

impl TableEvent {
    /// The philosopher this event concerns, if any.
    pub fn philosopher(&self) -> Option<PhilosopherId> {
        match self {
            TableEvent::Eating { philosopher, .. } => Some(*philosopher),
            TableEvent::Full { philosopher } => Some(*philosopher),
            TableEvent::Thinking { philosopher } => Some(*philosopher),
            TableEvent::FinishedEating { philosopher } => Some(*philosopher),
            TableEvent::AllDone { .. } => None,
        }
    }
}

impl fmt::Display for TableEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eating { philosopher, meals } => {
                write!(f, "philosopher {philosopher} is eating. Times eaten: {meals}")
            }
            Self::Full { philosopher } => write!(f, "philosopher {philosopher} is full of food"),
            Self::Thinking { philosopher } => {
                write!(f, "philosopher {philosopher} is now thinking until next bite")
            }
            Self::FinishedEating { philosopher } => {
                write!(f, "philosopher {philosopher} is done eating")
            }
            Self::AllDone { meals } => write!(f, "everyone is full after {meals} meals"),
        }
    }
}

/// Receives table events.
///
/// Called from philosopher tasks, sometimes while forks are held, so
/// implementations should return quickly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TableEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: TableEvent) {
        (**self).emit(event);
    }
}

impl EventSink for UnboundedSender<TableEvent> {
    fn emit(&self, event: TableEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TableEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TableEvent) {
        match &event {
            TableEvent::Eating { philosopher, meals } => {
                info!(philosopher = philosopher.0, meals, "{event}");
            }
            TableEvent::Full { philosopher } => info!(philosopher = philosopher.0, "{event}"),
            TableEvent::Thinking { philosopher } | TableEvent::FinishedEating { philosopher } => {
                debug!(philosopher = philosopher.0, "{event}");
            }
            TableEvent::AllDone { meals } => info!(meals, "{event}"),
        }
    }
}

/// Keeps every event in memory, in emission order.
///
/// Clones share the same log, so a clone can be handed to the coordinator
/// while the original is inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<TableEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<TableEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&TableEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TableEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: TableEvent) {
        self.lock().push(event);
    }
}

/// Forwards every event to several sinks, in order.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for Fanout {
    fn emit(&self, event: TableEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_keeps_emission_order() {
        let recorder = Recorder::new();
        let thinking = TableEvent::Thinking {
            philosopher: PhilosopherId(1),
        };
        let eating = TableEvent::Eating {
            philosopher: PhilosopherId(1),
            meals: 1,
        };
        recorder.emit(thinking.clone());
        recorder.emit(eating.clone());

        assert_eq!(recorder.events(), vec![thinking, eating]);
        assert_eq!(recorder.count(|e| matches!(e, TableEvent::Eating { .. })), 1);
    }

    #[test]
    fn recorder_clones_share_a_log() {
        let recorder = Recorder::new();
        let handle = recorder.clone();
        handle.emit(TableEvent::AllDone { meals: 15 });
        assert_eq!(recorder.len(), 1);
        assert!(!recorder.is_empty());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Recorder::new();
        let second = Recorder::new();
        let fanout = Fanout::new()
            .with(Arc::new(first.clone()))
            .with(Arc::new(NullSink))
            .with(Arc::new(second.clone()));

        fanout.emit(TableEvent::Full {
            philosopher: PhilosopherId(2),
        });

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn channel_sink_survives_a_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.emit(TableEvent::AllDone { meals: 0 });
    }

    #[test]
    fn event_philosopher_lookup() {
        let finished = TableEvent::FinishedEating {
            philosopher: PhilosopherId(4),
        };
        assert_eq!(finished.philosopher(), Some(PhilosopherId(4)));
        assert_eq!(TableEvent::AllDone { meals: 3 }.philosopher(), None);
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_string(&TableEvent::Eating {
            philosopher: PhilosopherId(3),
            meals: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"Eating","philosopher":3,"meals":2}"#);
    }

    #[test]
    fn display_reads_like_a_log_line() {
        let event = TableEvent::Eating {
            philosopher: PhilosopherId(0),
            meals: 1,
        };
        assert_eq!(event.to_string(), "philosopher 0 is eating. Times eaten: 1");
        let full = TableEvent::Full {
            philosopher: PhilosopherId(0),
        };
        assert_eq!(full.to_string(), "philosopher 0 is full of food");
    }
}
