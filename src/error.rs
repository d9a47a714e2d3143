//! Error types for the ring, its collaborators, and the run as a whole.

use std::io;
use std::path::PathBuf;

use crate::{SlotIndex, StudentId, WorkerId};

/// Invalid run configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A ring needs at least two workers for every worker to have a neighbour.
    #[error("a ring needs at least 2 workers, got {0}")]
    TooFewWorkers(usize),

    /// Workers must complete at least one round.
    #[error("rounds per worker must be at least 1")]
    ZeroRounds,

    /// The generated roster would be empty.
    #[error("the roster must contain at least one student")]
    NoStudents,

    /// More students than a [`StudentId`] can number.
    #[error("{0} students do not fit in a student id")]
    TooManyStudents(usize),

    /// A generated roster would contain its own sentinel and end a round early.
    #[error("generated students 1..={students} include the sentinel {sentinel}")]
    SentinelInRoster {
        /// The sentinel entry.
        sentinel: StudentId,
        /// Size of the generated roster.
        students: usize,
    },

    /// An inclusive range whose start is after its end.
    #[error("invalid {name} range: {min}..={max}")]
    InvalidRange {
        /// Which setting the range belongs to.
        name: &'static str,
        /// Range start.
        min: u64,
        /// Range end.
        max: u64,
    },
}

/// Failure to build a roster.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// Reading the roster failed.
    #[error("failed to read roster {path:?}: {source}")]
    Io {
        /// Source file, if the roster came from one.
        path: Option<PathBuf>,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A token that is not a student number.
    #[error("line {line}: invalid student number {token:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// The roster holds no entries.
    #[error("roster is empty")]
    Empty,

    /// Sentinel-terminated traversal over a roster without the sentinel.
    #[error("roster does not contain the sentinel {0}")]
    MissingSentinel(StudentId),
}

/// Failure of an output sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Opening the sink for a worker failed.
    #[error("failed to open output {path:?} for TA {worker}: {source}")]
    Open {
        /// Worker the sink belongs to.
        worker: WorkerId,
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Writing or flushing a record failed.
    #[error("failed to write record: {0}")]
    Write(#[from] io::Error),
}

/// Failure to acquire a slot within the configured bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The slot stayed held for longer than the acquisition timeout.
    #[error("TA {worker} timed out waiting for slot {slot}")]
    TimedOut {
        /// Slot that could not be acquired.
        slot: SlotIndex,
        /// Worker that was waiting.
        worker: WorkerId,
    },
}

/// Failure of a single worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Lock acquisition gave up.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Emitting a record failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// The worker thread panicked.
    #[error("worker thread panicked")]
    Panicked,
}

/// Failure of a whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The roster could not be built.
    #[error("roster setup failed: {0}")]
    Roster(#[from] RosterError),

    /// An output sink could not be opened.
    #[error("sink setup failed: {0}")]
    Sink(#[from] SinkError),

    /// A worker failed after setup completed.
    #[error("TA {id} failed: {source}")]
    Worker {
        /// The failing worker.
        id: WorkerId,
        /// What went wrong.
        #[source]
        source: WorkerError,
    },
}
