//! This library coordinates a fixed ring of workers ("TAs") that each need two
//! adjacent locks from a [`LockRing`] before they may read the next student
//! from a shared [`Roster`]. After reading, a worker releases both locks and
//! spends a while marking the student before it tries again, until it has
//! completed a fixed number of rounds over the roster.
//!
//! It is the dining-philosophers problem with the philosophers' forks named
//! slots. Worker `i` takes slot `i - 1` and then slot `i mod N`, so when every
//! worker holds its first slot at once nobody can take a second one. Two
//! acquisition policies are provided:
//!
//! - [`AcquireMode::Blocking`] waits on both slots in that order and keeps the
//!   deadlock. A ring may be given an acquisition timeout, in which case the
//!   deadlock surfaces as [`LockError::TimedOut`] instead of a hang.
//! - [`AcquireMode::Try`] waits on the first slot only, gives it back if the
//!   second is busy, and lets the worker back off before retrying.
//!
//! How a worker walks the roster is also a choice rather than a fixed rule.
//! [`CursorVariant`] decides whether a round ends when the roster runs out or
//! when the sentinel entry is read, and [`Sharing`] decides whether every
//! worker walks the whole roster or all of them share one read position so
//! that each student is handed out once per pass.
//!
//! ```text
//!   Supervisor ── LockRing + Roster ──┬── Worker 1 ── sink TA1.txt
//!                                     ├── Worker 2 ── sink TA2.txt
//!                                     └── ...
//!
//!   Worker: acquire pair -> read next -> release pair -> mark -> repeat
//! ```
//!
//! A [`Supervisor`] owns a run: it builds the ring and roster, opens one
//! [`RecordSink`] per worker, runs each worker on its own thread, and drops
//! everything once every worker has finished.

pub mod config;
pub mod cursor;
pub mod delay;
pub mod error;
pub mod lock_ring;
pub mod roster;
pub mod sink;
pub mod supervisor;
pub mod worker;

/// Identity of a worker, `1..=N`.
pub type WorkerId = usize;

/// Position of a lock in the ring, `0..N`.
pub type SlotIndex = usize;

/// A roster entry.
pub type StudentId = u32;

pub use config::{RunConfig, RunConfigBuilder};
pub use cursor::{Cursor, CursorVariant, Read, SharedIndex, Sharing};
pub use delay::{Delay, FixedDelay, RandomDelay, UnitRange};
pub use error::{ConfigError, LockError, RosterError, RunError, SinkError, WorkerError};
pub use lock_ring::{AcquireMode, LockRing, PairAttempt, PairGuard};
pub use roster::Roster;
pub use sink::{FileSinks, MarkRecord, MemorySinks, RecordFormat, RecordSink, SinkFactory};
pub use supervisor::{RunReport, Supervisor};
pub use worker::{Worker, WorkerReport};
