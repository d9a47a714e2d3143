//! A cycle of binary locks where each worker needs its own slot and its
//! neighbour's.
//!
//! Slot `i` is owned as *primary* by worker `i + 1` and as *secondary* by
//! worker `i`, wrapping around so that worker `N` uses slots `N - 1` and `0`.
//! This is the dining-philosophers arrangement: every worker acquires its
//! primary before its secondary, which is exactly the circular-wait
//! precondition for deadlock. [`AcquireMode::Blocking`] keeps that ordering
//! as is. [`AcquireMode::Try`] breaks the cycle by giving the primary back
//! whenever the secondary is busy.
//!
//! Each slot stores the id of its holder in an atomic word, so a claim is a
//! single compare-exchange from `FREE` to the worker id and a release is a
//! compare-exchange back. A short spin precedes parking on the slot's
//! condition variable, and a release wakes any parked waiters.
//!
//! ```text
//!   slot:  0    1    2    3    4
//!   TA1:   P    S
//!   TA2:        P    S
//!   TA3:             P    S
//!   TA4:                  P    S
//!   TA5:   S                   P
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::LockError;
use crate::{SlotIndex, WorkerId};

const FREE: usize = 0;
const SPIN_LIMIT: usize = 64;

/// How a worker acquires its pair of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireMode {
    /// Block on the primary, then block on the secondary.
    ///
    /// Can deadlock when every worker holds its primary at the same time.
    #[default]
    Blocking,

    /// Block on the primary, then try the secondary once. On failure the
    /// primary is released and the caller is told to back off and retry.
    Try,
}

impl fmt::Display for AcquireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Try => write!(f, "try"),
        }
    }
}

/// Result of a pair acquisition attempt.
#[derive(Debug)]
pub enum PairAttempt<'a> {
    /// Both slots are held until the guard is released or dropped.
    Acquired(PairGuard<'a>),

    /// The secondary slot was busy. The primary has already been released.
    Contended {
        /// The slot that could not be taken.
        slot: SlotIndex,
    },
}

struct Slot {
    holder: AtomicUsize,
    gate: Mutex<()>,
    freed: Condvar,
}

impl Slot {
    fn new() -> Self {
        Slot {
            holder: AtomicUsize::new(FREE),
            gate: Mutex::new(()),
            freed: Condvar::new(),
        }
    }

    fn try_claim(&self, worker: WorkerId) -> bool {
        self.holder
            .compare_exchange(FREE, worker, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

/// A fixed ring of binary locks shared by `len()` workers.
pub struct LockRing {
    slots: Box<[Slot]>,
    timeout: Option<Duration>,
}

impl LockRing {
    /// Creates a ring of `size` free slots whose blocking waits never give up.
    ///
    /// # Panics
    ///
    /// This function will panic if `size` is less than 2, as a single worker
    /// would be its own neighbour.
    pub fn new(size: usize) -> Self {
        Self::with_timeout(size, None)
    }

    /// Creates a ring of `size` free slots whose blocking waits give up with
    /// [`LockError::TimedOut`] after `timeout`, if one is given.
    ///
    /// # Panics
    ///
    /// This function will panic if `size` is less than 2.
    pub fn with_timeout(size: usize, timeout: Option<Duration>) -> Self {
        assert!(size >= 2, "a lock ring needs at least 2 slots, got {}", size);
        LockRing {
            slots: (0..size).map(|_| Slot::new()).collect(),
            timeout,
        }
    }

    /// Returns the number of slots, which is also the number of workers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns the acquisition bound, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the `(primary, secondary)` slots of worker `worker`.
    ///
    /// # Panics
    ///
    /// Panics if `worker` is not in `1..=len()`.
    pub fn slots_of(&self, worker: WorkerId) -> (SlotIndex, SlotIndex) {
        assert!(
            (1..=self.len()).contains(&worker),
            "TA {} is not part of a ring of {}",
            worker,
            self.len()
        );
        (worker - 1, worker % self.len())
    }

    /// Returns the worker currently holding `slot`.
    pub fn holder(&self, slot: SlotIndex) -> Option<WorkerId> {
        match self.slots[slot].holder.load(Ordering::Acquire) {
            FREE => None,
            id => Some(id),
        }
    }

    /// Acquires `slot` for `worker`, suspending until it is free.
    ///
    /// Returns an error only when the ring was built with a timeout and the
    /// slot stayed held for longer than that.
    pub fn acquire(&self, slot: SlotIndex, worker: WorkerId) -> Result<(), LockError> {
        let cell = &self.slots[slot];
        if spin(|| cell.try_claim(worker)) {
            debug!(ta = worker, slot, "slot acquired");
            return Ok(());
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut gate = cell.gate.lock();
        loop {
            if cell.try_claim(worker) {
                break;
            }
            match deadline {
                None => cell.freed.wait(&mut gate),
                Some(deadline) => {
                    if cell.freed.wait_until(&mut gate, deadline).timed_out() {
                        if cell.try_claim(worker) {
                            break;
                        }
                        warn!(ta = worker, slot, "gave up waiting for slot");
                        return Err(LockError::TimedOut { slot, worker });
                    }
                }
            }
        }

        debug!(ta = worker, slot, "slot acquired after waiting");
        Ok(())
    }

    /// Acquires `slot` for `worker` only if it is free right now.
    pub fn try_acquire(&self, slot: SlotIndex, worker: WorkerId) -> bool {
        let claimed = self.slots[slot].try_claim(worker);
        if claimed {
            debug!(ta = worker, slot, "slot acquired without waiting");
        }
        claimed
    }

    /// Releases `slot`, which must be held by `worker`.
    ///
    /// # Panics
    ///
    /// Releasing a slot that `worker` does not hold is a programming error and
    /// panics. There is no way to recover the ring from a foreign release.
    pub fn release(&self, slot: SlotIndex, worker: WorkerId) {
        match self.release_if_held(slot, worker) {
            Ok(()) => {}
            Err(None) => panic!("TA {} released slot {} which is free", worker, slot),
            Err(Some(other)) => panic!(
                "TA {} released slot {} which is held by TA {}",
                worker, slot, other
            ),
        }
    }

    /// Releases whichever of `worker`'s two slots it holds.
    ///
    /// Safe to call when only the primary (or nothing) is held, which is what
    /// error paths need. A slot held by a neighbour is left alone.
    pub fn release_pair(&self, worker: WorkerId) {
        let (primary, secondary) = self.slots_of(worker);
        let _ = self.release_if_held(secondary, worker);
        let _ = self.release_if_held(primary, worker);
    }

    /// Acquires both of `worker`'s slots, primary first.
    ///
    /// In [`AcquireMode::Try`] a busy secondary returns
    /// [`PairAttempt::Contended`] with the primary already free again; the
    /// caller is expected to back off before the next attempt.
    pub fn acquire_pair(
        &self,
        worker: WorkerId,
        mode: AcquireMode,
    ) -> Result<PairAttempt<'_>, LockError> {
        let (primary, secondary) = self.slots_of(worker);
        self.acquire(primary, worker)?;

        match mode {
            AcquireMode::Blocking => {
                if let Err(err) = self.acquire(secondary, worker) {
                    self.release(primary, worker);
                    return Err(err);
                }
            }
            AcquireMode::Try => {
                if !self.try_acquire(secondary, worker) {
                    self.release(primary, worker);
                    return Ok(PairAttempt::Contended { slot: secondary });
                }
            }
        }

        Ok(PairAttempt::Acquired(PairGuard {
            ring: self,
            worker,
            primary,
            secondary,
        }))
    }

    /// On failure returns the actual holder, if any.
    fn release_if_held(&self, slot: SlotIndex, worker: WorkerId) -> Result<(), Option<WorkerId>> {
        let cell = &self.slots[slot];
        match cell
            .holder
            .compare_exchange(worker, FREE, Ordering::Release, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(FREE) => return Err(None),
            Err(other) => return Err(Some(other)),
        }

        // taking the gate orders this wake-up after any waiter's last check
        let _gate = cell.gate.lock();
        cell.freed.notify_all();
        debug!(ta = worker, slot, "slot released");
        Ok(())
    }
}

impl fmt::Debug for LockRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holders: Vec<_> = (0..self.len()).map(|slot| self.holder(slot)).collect();
        f.debug_struct("LockRing")
            .field("holders", &holders)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Proof that a worker holds both of its slots.
///
/// Both slots are released when the guard is dropped. Finding either slot no
/// longer held by the guard's worker at that point panics, as a foreign
/// release through [`LockRing::release`] does.
#[derive(Debug)]
pub struct PairGuard<'a> {
    ring: &'a LockRing,
    worker: WorkerId,
    primary: SlotIndex,
    secondary: SlotIndex,
}

impl PairGuard<'_> {
    /// The worker holding the pair.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The `(primary, secondary)` slots held.
    pub fn slots(&self) -> (SlotIndex, SlotIndex) {
        (self.primary, self.secondary)
    }

    /// Releases both slots.
    pub fn release(self) {}
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        // a second panic while unwinding would abort the process
        if std::thread::panicking() {
            self.ring.release_pair(self.worker);
            return;
        }
        self.ring.release(self.secondary, self.worker);
        self.ring.release(self.primary, self.worker);
    }
}

fn spin<F: FnMut() -> bool>(mut f: F) -> bool {
    for i in 1..=SPIN_LIMIT {
        if f() {
            return true;
        }
        if i % 16 == 0 {
            std::thread::yield_now()
        } else {
            std::hint::spin_loop()
        }
    }
    false
}
