//! Table configuration: population size, meal target, and pacing.
//!
//! Timing only shapes *when* philosophers retry. Deadlock freedom comes from the
//! release-on-partial-acquisition rule in [`crate::philosopher`], so every
//! preset here (including [`Timing::immediate`]) terminates.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of philosophers seated at the table.
pub const DEFAULT_PHILOSOPHERS: usize = 5;

/// Default number of meals each philosopher must eat.
pub const DEFAULT_MEALS: u32 = 3;

/// Base pause unit, in milliseconds. Back-off, eating and thinking are
/// multiples of it.
pub const PAUSE_UNIT_MS: u64 = 40;

/// An inclusive range of durations a delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Shortest delay.
    #[serde(rename = "min_ms", with = "millis")]
    pub min: Duration,
    /// Longest delay.
    #[serde(rename = "max_ms", with = "millis")]
    pub max: Duration,
}

impl DelayRange {
    /// Zero-length delay. Waits degrade to a cooperative yield.
    pub const ZERO: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Create a range from its bounds.
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Create a range from millisecond bounds.
    #[must_use]
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// Draw a delay uniformly from the range.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = u64::try_from((self.max - self.min).as_nanos()).unwrap_or(u64::MAX);
        self.min + Duration::from_nanos(rng.gen_range(0..=span))
    }

    /// Whether every delay drawn from this range is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::InvalidConfig(format!(
                "{name} delay range is inverted: min {:?} > max {:?}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Delay bounds for each waiting step of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Back-off after failing to pick up the own fork.
    pub acquire: DelayRange,
    /// How long both forks are held while eating.
    pub eat: DelayRange,
    /// How long a philosopher thinks before trying again.
    pub think: DelayRange,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            acquire: DelayRange::from_millis(1, PAUSE_UNIT_MS),
            eat: DelayRange::from_millis(0, 2 * PAUSE_UNIT_MS),
            think: DelayRange::from_millis(1, 3 * PAUSE_UNIT_MS),
        }
    }
}

impl Timing {
    /// No delays at all. Every wait becomes a yield to the scheduler.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            acquire: DelayRange::ZERO,
            eat: DelayRange::ZERO,
            think: DelayRange::ZERO,
        }
    }

    /// Short delays for tests that want real interleaving without waiting long.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            acquire: DelayRange::from_millis(0, 2),
            eat: DelayRange::from_millis(0, 2),
            think: DelayRange::from_millis(0, 2),
        }
    }

    fn validate(&self) -> Result<()> {
        self.acquire.validate("acquire")?;
        self.eat.validate("eat")?;
        self.think.validate("think")
    }
}

/// Configuration for a [`Coordinator`](crate::Coordinator) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of philosophers, and therefore forks, around the table.
    pub philosophers: usize,

    /// Meals each philosopher must eat before it is full.
    pub meals: u32,

    /// Delay bounds for back-off, eating and thinking.
    pub timing: Timing,

    /// Give up if the table has not finished within this duration.
    #[serde(rename = "timeout_ms", with = "optional_millis")]
    pub timeout: Option<Duration>,

    /// Seed for the delay generators. Each philosopher derives its own stream
    /// from it; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            philosophers: DEFAULT_PHILOSOPHERS,
            meals: DEFAULT_MEALS,
            timing: Timing::default(),
            timeout: Some(Duration::from_secs(60)),
            seed: None,
        }
    }
}

impl TableConfig {
    /// Set the number of philosophers.
    #[must_use]
    pub fn with_philosophers(mut self, philosophers: usize) -> Self {
        self.philosophers = philosophers;
        self
    }

    /// Set the meal target.
    #[must_use]
    pub fn with_meals(mut self, meals: u32) -> Self {
        self.meals = meals;
        self
    }

    /// Set the delay bounds.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Set the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the overall timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Seed the delay generators for a reproducible pacing sequence.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations the protocol cannot run.
    ///
    /// A single philosopher is rejected: its own fork and its right-hand fork
    /// would be the same fork.
    pub fn validate(&self) -> Result<()> {
        if self.philosophers < 2 {
            return Err(Error::InvalidConfig(format!(
                "at least 2 philosophers are required, got {}",
                self.philosophers
            )));
        }
        if self.meals < 1 {
            return Err(Error::InvalidConfig(
                "each philosopher must eat at least 1 meal".into(),
            ));
        }
        self.timing.validate()
    }
}

/// `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as optional whole milliseconds.
mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
