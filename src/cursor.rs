//! Read positions over a shared [`Roster`].
//!
//! Two things vary between runs and are kept apart on purpose:
//!
//! - how a round ends ([`CursorVariant`]): by running off the end of the
//!   roster and rewinding, or by reading the sentinel entry;
//! - who owns the read position ([`Sharing`]): every worker walks the whole
//!   roster on its own, or all workers advance one shared index so each entry
//!   is handed out once per pass.
//!
//! Reads require a [`PairGuard`], so a cursor can only be advanced from inside
//! a worker's two-slot critical section.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::lock_ring::PairGuard;
use crate::roster::Roster;
use crate::StudentId;

/// How a worker recognises the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorVariant {
    /// The read after the last entry yields nothing and rewinds to the start.
    #[default]
    Rewind,

    /// Reading the sentinel entry ends the round; the index then wraps.
    Sentinel,
}

impl CursorVariant {
    /// The sharing each variant was designed around: rewinding cursors are
    /// private, sentinel cursors share one index.
    pub fn default_sharing(self) -> Sharing {
        match self {
            Self::Rewind => Sharing::PerWorker,
            Self::Sentinel => Sharing::Shared,
        }
    }
}

impl fmt::Display for CursorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rewind => write!(f, "rewind"),
            Self::Sentinel => write!(f, "sentinel"),
        }
    }
}

/// Who owns the read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// Each worker cycles through the whole roster independently.
    PerWorker,

    /// One index for all workers: every entry is handed out once per pass.
    Shared,
}

impl fmt::Display for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerWorker => write!(f, "per-worker"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

/// Outcome of [`Cursor::read_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// A student to mark.
    Entry(StudentId),

    /// The round is over. Carries the sentinel when one was read.
    Terminal(Option<StudentId>),
}

impl Read {
    /// Returns `true` if this read ended a round.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Read::Terminal(_))
    }
}

/// The read position shared by every worker under [`Sharing::Shared`].
#[derive(Debug, Default)]
pub struct SharedIndex(AtomicUsize);

impl SharedIndex {
    /// Creates an index pointing at the first entry.
    pub fn new() -> Self {
        SharedIndex(AtomicUsize::new(0))
    }

    /// Returns the position the next read will use.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    // Workers that are not neighbours can be inside their critical sections
    // at the same time, so the step must be a single read-modify-write.
    fn step(&self, period: usize) -> usize {
        match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |at| Some((at + 1) % period))
        {
            Ok(at) | Err(at) => at,
        }
    }
}

#[derive(Debug)]
enum Position<'a> {
    Private(usize),
    Shared(&'a SharedIndex),
}

/// One worker's view of the roster.
#[derive(Debug)]
pub struct Cursor<'a> {
    roster: &'a Roster,
    variant: CursorVariant,
    sentinel: StudentId,
    position: Position<'a>,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor with its own position at the start of `roster`.
    pub fn private(roster: &'a Roster, variant: CursorVariant, sentinel: StudentId) -> Self {
        Cursor {
            roster,
            variant,
            sentinel,
            position: Position::Private(0),
        }
    }

    /// Creates a cursor that advances `index` together with every other
    /// cursor built from it.
    pub fn shared(
        roster: &'a Roster,
        variant: CursorVariant,
        sentinel: StudentId,
        index: &'a SharedIndex,
    ) -> Self {
        Cursor {
            roster,
            variant,
            sentinel,
            position: Position::Shared(index),
        }
    }

    /// Returns the variant this cursor follows.
    pub fn variant(&self) -> CursorVariant {
        self.variant
    }

    /// Reads the entry at the current position and advances past it.
    ///
    /// Holding `held` is what makes the read part of the caller's critical
    /// section.
    pub fn read_next(&mut self, held: &PairGuard<'_>) -> Read {
        let len = self.roster.len();
        let read = match self.variant {
            CursorVariant::Rewind => {
                // one extra position stands for "ran off the end"
                let at = self.step(len + 1);
                if at == len {
                    Read::Terminal(None)
                } else {
                    Read::Entry(self.roster[at])
                }
            }
            CursorVariant::Sentinel => {
                let entry = self.roster[self.step(len)];
                if entry == self.sentinel {
                    Read::Terminal(Some(entry))
                } else {
                    Read::Entry(entry)
                }
            }
        };

        if read.is_terminal() {
            debug!(ta = held.worker(), variant = %self.variant, "reached end of roster");
        }
        read
    }

    fn step(&mut self, period: usize) -> usize {
        match &mut self.position {
            Position::Private(at) => {
                let current = *at;
                *at = (current + 1) % period;
                current
            }
            Position::Shared(index) => index.step(period),
        }
    }
}
