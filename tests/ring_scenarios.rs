//! End-to-end runs of the whole ring with real threads and output files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Barrier;
use std::time::Duration;

use ta_ring::{
    AcquireMode, CursorVariant, Delay, LockError, LockRing, PairAttempt, RandomDelay, RunConfig,
    RunError, Sharing, Supervisor, UnitRange, WorkerError,
};

fn read_lines(dir: &Path, worker: usize) -> Vec<String> {
    let text = std::fs::read_to_string(dir.join(format!("TA{}.txt", worker))).unwrap();
    text.lines().map(str::to_owned).collect()
}

fn mark_of(line: &str) -> u8 {
    line.rsplit(' ').next().unwrap().parse().unwrap()
}

// ── Scenario 1: five TAs, twenty students, three rounds ──

#[test]
fn every_ta_marks_every_student_each_round() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder()
        .workers(5)
        .rounds(3)
        .students(20)
        .variant(CursorVariant::Sentinel)
        .sharing(Sharing::PerWorker)
        .acquire(AcquireMode::Try)
        .time_unit(Duration::from_millis(1))
        .access_delay(UnitRange::new(0, 1))
        .grading_delay(UnitRange::new(0, 2))
        .backoff_delay(UnitRange::new(1, 2))
        .output_dir(dir.path())
        .seed(Some(2024))
        .build()
        .unwrap();

    let report = Supervisor::with_files(config).run().unwrap();
    assert_eq!(report.workers.len(), 5);
    assert_eq!(report.total_marked(), 5 * 60);

    for ta in 1..=5 {
        let lines = read_lines(dir.path(), ta);
        assert_eq!(lines.len(), 60, "TA{}", ta);
        for (n, line) in lines.iter().enumerate() {
            let student = n % 20 + 1;
            let prefix = format!("TA{} marked student {:04} with ", ta, student);
            assert!(line.starts_with(&prefix), "{line:?} does not start with {prefix:?}");
            assert!(mark_of(line) <= 10);
        }
    }
}

#[test]
fn shared_position_hands_each_student_out_once_per_pass() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder()
        .workers(5)
        .rounds(2)
        .students(15)
        .variant(CursorVariant::Rewind)
        .sharing(Sharing::Shared)
        .acquire(AcquireMode::Try)
        .time_unit(Duration::ZERO)
        .output_dir(dir.path())
        .build()
        .unwrap();

    let report = Supervisor::with_files(config).run().unwrap();

    // ten exhaustions in total, each closing a pass of fifteen students
    let mut counts: HashMap<String, usize> = HashMap::new();
    for ta in 1..=5 {
        for line in read_lines(dir.path(), ta) {
            let student = line.split(':').next().unwrap().to_owned();
            *counts.entry(student).or_default() += 1;
        }
    }
    assert_eq!(report.total_marked(), 10 * 15);
    assert_eq!(counts.len(), 15);
    assert!(counts.values().all(|&count| count == 10), "{counts:?}");
}

// ── Scenario 2: adjacent TAs contend for the same slot ──

#[test]
fn contention_is_retried_until_both_neighbours_progress() {
    const MAX_ATTEMPTS: usize = 200;
    let ring = LockRing::new(2);
    let barrier = Barrier::new(2);

    let outcomes: Vec<(usize, usize)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=2)
            .map(|ta| {
                let (ring, barrier) = (&ring, &barrier);
                scope.spawn(move || {
                    let mut backoff = RandomDelay::new(Duration::from_millis(1), Some(ta as u64));
                    let (primary, secondary) = ring.slots_of(ta);
                    let mut contentions = 0;

                    // both primaries are taken before either TA looks at its secondary
                    ring.acquire(primary, ta).unwrap();
                    barrier.wait();
                    if ring.try_acquire(secondary, ta) {
                        ring.release_pair(ta);
                        return (contentions, 1);
                    }
                    ring.release(primary, ta);
                    contentions += 1;
                    backoff.pause(UnitRange::new(1, 3));

                    for attempt in 2..=MAX_ATTEMPTS {
                        match ring.acquire_pair(ta, AcquireMode::Try).unwrap() {
                            PairAttempt::Acquired(guard) => {
                                guard.release();
                                return (contentions, attempt);
                            }
                            PairAttempt::Contended { .. } => {
                                contentions += 1;
                                backoff.pause(UnitRange::new(1, 3));
                            }
                        }
                    }
                    panic!("TA {} never acquired its pair", ta);
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total_contentions: usize = outcomes.iter().map(|(c, _)| c).sum();
    assert!(total_contentions >= 1);
    assert!(outcomes.iter().all(|&(_, attempts)| attempts <= MAX_ATTEMPTS));
    assert_eq!(ring.holder(0), None);
    assert_eq!(ring.holder(1), None);
}

#[test]
fn try_mode_run_never_stalls() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder()
        .workers(7)
        .rounds(2)
        .students(10)
        .acquire(AcquireMode::Try)
        .time_unit(Duration::ZERO)
        .output_dir(dir.path())
        .build()
        .unwrap();

    let report = Supervisor::with_files(config).run().unwrap();
    assert!(report.workers.iter().all(|worker| worker.rounds == 2));
    assert_eq!(report.total_marked(), 7 * 2 * 10);
}

// ── Scenario 3: blocking acquisition with every TA starting at once ──

#[test]
fn blocking_run_either_completes_or_reports_the_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder()
        .workers(5)
        .rounds(3)
        .students(20)
        .acquire(AcquireMode::Blocking)
        .acquire_timeout(Some(Duration::from_millis(200)))
        .time_unit(Duration::ZERO)
        .output_dir(dir.path())
        .build()
        .unwrap();

    match Supervisor::with_files(config).run() {
        Ok(report) => assert_eq!(report.total_marked(), 5 * 3 * 20),
        Err(RunError::Worker {
            source: WorkerError::Lock(LockError::TimedOut { worker, .. }),
            id,
        }) => assert_eq!(worker, id),
        Err(other) => panic!("unexpected failure: {other}"),
    }
}

#[test]
fn all_primaries_held_is_a_deadlock_without_try_mode() {
    const N: usize = 4;
    let ring = LockRing::with_timeout(N, Some(Duration::from_millis(40)));
    let barrier = Barrier::new(N);

    let timed_out = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=N)
            .map(|ta| {
                let (ring, barrier) = (&ring, &barrier);
                scope.spawn(move || {
                    let (primary, _) = ring.slots_of(ta);
                    ring.acquire(primary, ta).unwrap();
                    barrier.wait();
                    // the primary is already ours, so only the secondary can block
                    let (_, secondary) = ring.slots_of(ta);
                    let outcome = ring.acquire(secondary, ta);
                    barrier.wait();
                    ring.release_pair(ta);
                    outcome.is_err()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&timed_out| timed_out)
            .count()
    });

    assert_eq!(timed_out, N);
    assert!((0..N).all(|slot| ring.holder(slot).is_none()));
}
