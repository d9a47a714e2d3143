//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::cursor::{CursorVariant, Sharing};
use crate::delay::UnitRange;
use crate::error::ConfigError;
use crate::lock_ring::AcquireMode;
use crate::roster::DEFAULT_SENTINEL;
use crate::StudentId;

/// Number of workers in the ring.
pub const DEFAULT_WORKERS: usize = 5;

/// Rounds each worker completes before stopping.
pub const DEFAULT_ROUNDS: usize = 3;

/// Students in a generated roster.
pub const DEFAULT_STUDENTS: usize = 20;

/// Time spent inside the critical section reading the roster.
pub const DEFAULT_ACCESS_DELAY: UnitRange = UnitRange::new(1, 4);

/// Time spent marking, outside the critical section.
pub const DEFAULT_GRADING_DELAY: UnitRange = UnitRange::new(1, 10);

/// Time a worker waits after losing its secondary slot in try mode.
pub const DEFAULT_BACKOFF_DELAY: UnitRange = UnitRange::new(1, 3);

/// Marks handed out.
pub const DEFAULT_MARKS: UnitRange = UnitRange::new(0, 10);

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Workers in the ring.
    pub workers: usize,
    /// Rounds each worker completes.
    pub rounds: usize,
    /// Pair acquisition policy.
    pub acquire: AcquireMode,
    /// How a round ends.
    pub variant: CursorVariant,
    /// Who owns the read position.
    pub sharing: Sharing,
    /// Size of a generated roster.
    pub students: usize,
    /// Entry ending a round under [`CursorVariant::Sentinel`].
    pub sentinel: StudentId,
    /// Roster file to read instead of generating one.
    pub roster_path: Option<PathBuf>,
    /// Directory receiving the `TA<id>.txt` files.
    pub output_dir: PathBuf,
    /// Delay inside the critical section.
    pub access_delay: UnitRange,
    /// Delay while marking.
    pub grading_delay: UnitRange,
    /// Delay after try-mode contention.
    pub backoff_delay: UnitRange,
    /// Range of marks.
    pub marks: UnitRange,
    /// Length of one delay unit.
    pub time_unit: Duration,
    /// Bound on a single slot wait. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Seed for delays and marks. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let variant = CursorVariant::default();
        RunConfig {
            workers: DEFAULT_WORKERS,
            rounds: DEFAULT_ROUNDS,
            acquire: AcquireMode::default(),
            variant,
            sharing: variant.default_sharing(),
            students: DEFAULT_STUDENTS,
            sentinel: DEFAULT_SENTINEL,
            roster_path: None,
            output_dir: PathBuf::from("."),
            access_delay: DEFAULT_ACCESS_DELAY,
            grading_delay: DEFAULT_GRADING_DELAY,
            backoff_delay: DEFAULT_BACKOFF_DELAY,
            marks: DEFAULT_MARKS,
            time_unit: Duration::from_secs(1),
            acquire_timeout: None,
            seed: None,
        }
    }
}

impl RunConfig {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Checks the configuration for values a run cannot start with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers < 2 {
            return Err(ConfigError::TooFewWorkers(self.workers));
        }
        if self.rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.roster_path.is_none() {
            if self.students == 0 {
                return Err(ConfigError::NoStudents);
            }
            if self.students > StudentId::MAX as usize {
                return Err(ConfigError::TooManyStudents(self.students));
            }
            // generated ids are 1..=students; one of them reading as the
            // sentinel would end every round early
            if self.variant == CursorVariant::Sentinel
                && self.sentinel != 0
                && self.sentinel as usize <= self.students
            {
                return Err(ConfigError::SentinelInRoster {
                    sentinel: self.sentinel,
                    students: self.students,
                });
            }
        }
        self.access_delay.validate("access delay")?;
        self.grading_delay.validate("grading delay")?;
        self.backoff_delay.validate("backoff delay")?;
        self.marks.validate("marks")?;
        if self.marks.max > u64::from(u8::MAX) {
            return Err(ConfigError::InvalidRange {
                name: "marks",
                min: self.marks.min,
                max: self.marks.max,
            });
        }
        Ok(())
    }

    /// Derives the seed for one worker's delays and marks.
    pub fn worker_seed(&self, worker: usize) -> Option<u64> {
        self.seed
            .map(|seed| seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(worker as u64))
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
    sharing: Option<Sharing>,
}

impl RunConfigBuilder {
    /// Sets the number of workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the rounds per worker.
    #[must_use]
    pub fn rounds(mut self, rounds: usize) -> Self {
        self.config.rounds = rounds;
        self
    }

    /// Sets the acquisition policy.
    #[must_use]
    pub fn acquire(mut self, mode: AcquireMode) -> Self {
        self.config.acquire = mode;
        self
    }

    /// Sets the cursor variant. Unless [`sharing`](Self::sharing) is also
    /// called, the variant's own sharing is used.
    #[must_use]
    pub fn variant(mut self, variant: CursorVariant) -> Self {
        self.config.variant = variant;
        self
    }

    /// Overrides who owns the read position.
    #[must_use]
    pub fn sharing(mut self, sharing: Sharing) -> Self {
        self.sharing = Some(sharing);
        self
    }

    /// Sets the size of a generated roster.
    #[must_use]
    pub fn students(mut self, students: usize) -> Self {
        self.config.students = students;
        self
    }

    /// Sets the sentinel entry.
    #[must_use]
    pub fn sentinel(mut self, sentinel: StudentId) -> Self {
        self.config.sentinel = sentinel;
        self
    }

    /// Reads the roster from a file.
    #[must_use]
    pub fn roster_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.roster_path = Some(path.into());
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Sets the delay inside the critical section.
    #[must_use]
    pub fn access_delay(mut self, range: UnitRange) -> Self {
        self.config.access_delay = range;
        self
    }

    /// Sets the marking delay.
    #[must_use]
    pub fn grading_delay(mut self, range: UnitRange) -> Self {
        self.config.grading_delay = range;
        self
    }

    /// Sets the backoff after try-mode contention.
    #[must_use]
    pub fn backoff_delay(mut self, range: UnitRange) -> Self {
        self.config.backoff_delay = range;
        self
    }

    /// Sets the range of marks.
    #[must_use]
    pub fn marks(mut self, range: UnitRange) -> Self {
        self.config.marks = range;
        self
    }

    /// Sets the length of one delay unit.
    #[must_use]
    pub fn time_unit(mut self, unit: Duration) -> Self {
        self.config.time_unit = unit;
        self
    }

    /// Bounds each slot wait.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Seeds delays and marks.
    #[must_use]
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.seed = seed;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if [`RunConfig::validate`] rejects the result.
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let mut config = self.config;
        config.sharing = self
            .sharing
            .unwrap_or_else(|| config.variant.default_sharing());
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::RunConfig;
    use crate::cursor::{CursorVariant, Sharing};
    use crate::delay::UnitRange;
    use crate::error::ConfigError;
    use crate::StudentId;

    #[test]
    fn defaults_describe_five_tas_and_three_rounds() {
        let config = RunConfig::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.rounds, 3);
        assert_eq!(config.students, 20);
        assert_eq!(config.marks, UnitRange::new(0, 10));
        assert!(config.acquire_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sharing_follows_variant_unless_overridden() {
        let config = RunConfig::builder()
            .variant(CursorVariant::Sentinel)
            .build()
            .unwrap();
        assert_eq!(config.sharing, Sharing::Shared);

        let config = RunConfig::builder()
            .variant(CursorVariant::Sentinel)
            .sharing(Sharing::PerWorker)
            .build()
            .unwrap();
        assert_eq!(config.sharing, Sharing::PerWorker);
    }

    #[test]
    fn rejects_unusable_values() {
        assert_eq!(
            RunConfig::builder().workers(1).build().unwrap_err(),
            ConfigError::TooFewWorkers(1)
        );
        assert_eq!(
            RunConfig::builder().rounds(0).build().unwrap_err(),
            ConfigError::ZeroRounds
        );
        assert_eq!(
            RunConfig::builder().students(0).build().unwrap_err(),
            ConfigError::NoStudents
        );
        assert!(matches!(
            RunConfig::builder().marks(UnitRange::new(0, 300)).build(),
            Err(ConfigError::InvalidRange { name: "marks", .. })
        ));
    }

    #[test]
    fn generated_ids_must_not_reach_the_sentinel() {
        let err = RunConfig::builder()
            .workers(2)
            .rounds(1)
            .students(10_000)
            .variant(CursorVariant::Sentinel)
            .sharing(Sharing::PerWorker)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::SentinelInRoster {
                sentinel: 9999,
                students: 10_000
            }
        );

        // the last id below the sentinel is still fine
        assert!(RunConfig::builder()
            .students(9998)
            .variant(CursorVariant::Sentinel)
            .build()
            .is_ok());

        // a rewinding run never looks for the sentinel
        assert!(RunConfig::builder()
            .students(10_000)
            .variant(CursorVariant::Rewind)
            .build()
            .is_ok());

        // a roster file is checked for its sentinel when it is loaded
        assert!(RunConfig::builder()
            .students(10_000)
            .variant(CursorVariant::Sentinel)
            .roster_path("students.txt")
            .build()
            .is_ok());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn student_count_must_fit_an_id() {
        let students = StudentId::MAX as usize + 1;
        assert_eq!(
            RunConfig::builder().students(students).build().unwrap_err(),
            ConfigError::TooManyStudents(students)
        );
    }

    #[test]
    fn worker_seeds_differ() {
        let config = RunConfig::builder().seed(Some(1)).build().unwrap();
        assert_ne!(config.worker_seed(1), config.worker_seed(2));
        assert_eq!(RunConfig::default().worker_seed(1), None);
    }
}
