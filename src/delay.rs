//! Simulated work: how long accessing the roster, marking, and backing off
//! take.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ConfigError;

/// An inclusive range of whole delay units (seconds in a real run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRange {
    /// Smallest value.
    pub min: u64,
    /// Largest value.
    pub max: u64,
}

impl UnitRange {
    /// Creates the range `min..=max`.
    pub const fn new(min: u64, max: u64) -> Self {
        UnitRange { min, max }
    }

    /// Largest number of units a range may reach.
    pub const MAX_UNITS: u64 = u32::MAX as u64;

    /// Fails if the range is empty or reaches past [`Self::MAX_UNITS`].
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max || self.max > Self::MAX_UNITS {
            return Err(ConfigError::InvalidRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Source of simulated durations.
pub trait Delay: Send {
    /// Returns a duration of `min..=max` units.
    fn duration(&mut self, min: u64, max: u64) -> Duration;

    /// Sleeps the calling thread for a duration drawn from `range`.
    fn pause(&mut self, range: UnitRange) {
        let duration = self.duration(range.min, range.max);
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Uniformly distributed whole units of `unit`.
#[derive(Debug, Clone)]
pub struct RandomDelay {
    rng: StdRng,
    unit: Duration,
}

impl RandomDelay {
    /// Creates a delay source seeded from `seed`, or from entropy if `None`.
    pub fn new(unit: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomDelay { rng, unit }
    }
}

impl Delay for RandomDelay {
    fn duration(&mut self, min: u64, max: u64) -> Duration {
        let units = self.rng.gen_range(min..=max);
        u32::try_from(units)
            .ok()
            .and_then(|units| self.unit.checked_mul(units))
            .unwrap_or(Duration::MAX)
    }
}

/// Always the same duration, whatever the range.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl Delay for FixedDelay {
    fn duration(&mut self, _min: u64, _max: u64) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{Delay, FixedDelay, RandomDelay, UnitRange};
    use crate::error::ConfigError;
    use std::time::Duration;

    #[test]
    fn random_delay_stays_in_range() {
        let mut delay = RandomDelay::new(Duration::from_secs(1), Some(7));
        for _ in 0..200 {
            let d = delay.duration(1, 4);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(4), "{d:?}");
        }
    }

    #[test]
    fn seeded_delays_repeat() {
        let mut a = RandomDelay::new(Duration::from_millis(1), Some(42));
        let mut b = RandomDelay::new(Duration::from_millis(1), Some(42));
        let a: Vec<_> = (0..16).map(|_| a.duration(1, 10)).collect();
        let b: Vec<_> = (0..16).map(|_| b.duration(1, 10)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_unit_never_sleeps() {
        let mut delay = RandomDelay::new(Duration::ZERO, None);
        assert_eq!(delay.duration(1, 10), Duration::ZERO);
        delay.pause(UnitRange::new(1, 10));
    }

    #[test]
    fn fixed_delay_ignores_range() {
        let mut delay = FixedDelay(Duration::from_millis(3));
        assert_eq!(delay.duration(1, 10), Duration::from_millis(3));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(
            UnitRange::new(5, 1).validate("grading delay"),
            Err(ConfigError::InvalidRange {
                name: "grading delay",
                min: 5,
                max: 1
            })
        );
        assert!(UnitRange::new(0, 0).validate("marks").is_ok());
    }

    #[test]
    fn unit_counts_past_u32_are_rejected() {
        assert!(UnitRange::new(1, UnitRange::MAX_UNITS).validate("access delay").is_ok());
        assert_eq!(
            UnitRange::new(1, UnitRange::MAX_UNITS + 1).validate("access delay"),
            Err(ConfigError::InvalidRange {
                name: "access delay",
                min: 1,
                max: UnitRange::MAX_UNITS + 1
            })
        );
    }

    #[test]
    fn oversized_delays_saturate() {
        // 2^33 units would wrap to 0 if truncated to u32
        let mut delay = RandomDelay::new(Duration::from_nanos(1), Some(3));
        assert_eq!(delay.duration(1 << 33, 1 << 33), Duration::MAX);

        let mut delay = RandomDelay::new(Duration::MAX, Some(3));
        assert_eq!(delay.duration(2, 2), Duration::MAX);
        assert_eq!(delay.duration(1, 1), Duration::MAX);
    }
}
