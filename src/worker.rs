//! One TA's life: acquire both slots, read a student, release, mark, repeat.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::cursor::{Cursor, Read};
use crate::delay::Delay;
use crate::error::WorkerError;
use crate::lock_ring::{LockRing, PairAttempt, PairGuard};
use crate::sink::{MarkRecord, RecordSink};
use crate::{StudentId, WorkerId};

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// The worker.
    pub id: WorkerId,
    /// Rounds completed.
    pub rounds: usize,
    /// Records written.
    pub marked: usize,
    /// Times the secondary slot was busy in try mode.
    pub contentions: usize,
}

enum State<'r> {
    Acquiring,
    Reading(PairGuard<'r>),
    Processing(StudentId),
    Done,
}

/// Drives a single worker until it has completed its rounds.
pub struct Worker<'a, S, D> {
    id: WorkerId,
    ring: &'a LockRing,
    cursor: Cursor<'a>,
    sink: S,
    delay: D,
    marks: StdRng,
    config: &'a RunConfig,
}

impl<'a, S: RecordSink, D: Delay> Worker<'a, S, D> {
    /// Creates worker `id`, which will read through `cursor` and write to
    /// `sink`.
    pub fn new(
        id: WorkerId,
        ring: &'a LockRing,
        cursor: Cursor<'a>,
        sink: S,
        delay: D,
        config: &'a RunConfig,
    ) -> Self {
        let marks = match config.worker_seed(id) {
            Some(seed) => StdRng::seed_from_u64(seed.rotate_left(32)),
            None => StdRng::from_entropy(),
        };
        Worker {
            id,
            ring,
            cursor,
            sink,
            delay,
            marks,
            config,
        }
    }

    /// Runs the worker to completion.
    ///
    /// Contention in try mode is retried after a backoff and never fails the
    /// worker. In blocking mode this only returns an error if the ring has an
    /// acquisition timeout; without one a deadlocked ring blocks forever.
    ///
    /// # Errors
    ///
    /// Returns an error if a slot wait times out or a record cannot be written.
    pub fn run(mut self) -> Result<WorkerReport, WorkerError> {
        let ring = self.ring;
        let id = self.id;
        let mut report = WorkerReport {
            id,
            rounds: 0,
            marked: 0,
            contentions: 0,
        };
        info!(ta = id, mode = %self.config.acquire, variant = %self.cursor.variant(), "TA started");

        let mut state = State::Acquiring;
        loop {
            state = match state {
                State::Acquiring => match ring.acquire_pair(id, self.config.acquire)? {
                    PairAttempt::Acquired(guard) => State::Reading(guard),
                    PairAttempt::Contended { slot } => {
                        report.contentions += 1;
                        warn!(ta = id, slot, "neighbour holds slot, backing off");
                        self.delay.pause(self.config.backoff_delay);
                        State::Acquiring
                    }
                },
                State::Reading(guard) => {
                    let read = self.cursor.read_next(&guard);
                    if let Read::Entry(student) = read {
                        info!(ta = id, student, "accessing database");
                        self.delay.pause(self.config.access_delay);
                    }
                    guard.release();

                    match read {
                        Read::Entry(student) => State::Processing(student),
                        Read::Terminal(_) => {
                            report.rounds += 1;
                            debug!(ta = id, round = report.rounds, "round completed");
                            if report.rounds >= self.config.rounds {
                                State::Done
                            } else {
                                State::Acquiring
                            }
                        }
                    }
                }
                State::Processing(student) => {
                    self.delay.pause(self.config.grading_delay);
                    let range = self.config.marks;
                    let mark = self.marks.gen_range(range.min..=range.max) as u8;
                    info!(ta = id, student, mark, "marking student");
                    self.sink.write_record(&MarkRecord {
                        ta: id,
                        student,
                        mark,
                    })?;
                    report.marked += 1;
                    State::Acquiring
                }
                State::Done => break,
            };
        }

        info!(ta = id, marked = report.marked, contentions = report.contentions, "TA finished marking");
        Ok(report)
    }
}
