//! Sets up the ring and roster, runs every worker on its own thread, and tears
//! everything down once they are done.

use std::thread;

use tracing::{error, info};

use crate::config::RunConfig;
use crate::cursor::{Cursor, CursorVariant, SharedIndex, Sharing};
use crate::delay::RandomDelay;
use crate::error::{RunError, WorkerError};
use crate::lock_ring::LockRing;
use crate::roster::Roster;
use crate::sink::{FileSinks, SinkFactory};
use crate::worker::{Worker, WorkerReport};
use crate::WorkerId;

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// One report per worker, ordered by id.
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    /// Records written by all workers together.
    pub fn total_marked(&self) -> usize {
        self.workers.iter().map(|report| report.marked).sum()
    }

    /// Try-mode contention events across all workers.
    pub fn total_contentions(&self) -> usize {
        self.workers.iter().map(|report| report.contentions).sum()
    }
}

/// Owns a run's configuration and the sinks its workers write to.
#[derive(Debug)]
pub struct Supervisor<F> {
    config: RunConfig,
    sinks: F,
}

impl Supervisor<FileSinks> {
    /// Creates a supervisor writing `TA<id>.txt` files into the configured
    /// output directory.
    pub fn with_files(config: RunConfig) -> Self {
        let sinks = FileSinks::new(&config.output_dir, config.variant.into());
        Supervisor { config, sinks }
    }
}

impl<F: SinkFactory> Supervisor<F> {
    /// Creates a supervisor using `sinks` for worker output.
    pub fn new(config: RunConfig, sinks: F) -> Self {
        Supervisor { config, sinks }
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Builds the roster the run will share: the configured file if there is
    /// one, otherwise `1..=students`, followed by the sentinel when the
    /// variant needs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or if a sentinel-ended
    /// traversal is configured over a roster without the sentinel.
    pub fn load_roster(&self) -> Result<Roster, RunError> {
        let config = &self.config;
        let roster = match (&config.roster_path, config.variant) {
            (Some(path), _) => Roster::load(path)?,
            (None, CursorVariant::Rewind) => Roster::sequential(config.students)?,
            (None, CursorVariant::Sentinel) => {
                Roster::generate(config.students, config.sentinel)?
            }
        };
        if config.variant == CursorVariant::Sentinel {
            roster.require_sentinel(config.sentinel)?;
        }
        Ok(roster)
    }

    /// Runs `workers` workers to completion.
    ///
    /// Every setup step (configuration, roster, ring, sinks, threads) happens
    /// before the first worker starts, and any failure there aborts the run.
    /// Once started, all workers are joined even if some fail; the ring and
    /// roster are dropped when this returns.
    ///
    /// # Errors
    ///
    /// Returns the setup failure, or the failure of the lowest-numbered
    /// worker that did not finish.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let config = &self.config;
        config.validate()?;

        let roster = self.load_roster()?;
        let ring = LockRing::with_timeout(config.workers, config.acquire_timeout);
        let index = SharedIndex::new();
        let sinks = (1..=config.workers)
            .map(|id| self.sinks.open(id))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            workers = config.workers,
            rounds = config.rounds,
            mode = %config.acquire,
            variant = %config.variant,
            sharing = %config.sharing,
            entries = roster.len(),
            "starting run"
        );

        let outcomes: Vec<(WorkerId, Result<WorkerReport, WorkerError>)> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(config.workers);
            let mut spawn_error = None;
            for (id, sink) in (1..).zip(sinks) {
                let (ring, roster, index) = (&ring, &roster, &index);
                let spawned = thread::Builder::new()
                    .name(format!("ta-{}", id))
                    .spawn_scoped(scope, move || {
                        let cursor = match config.sharing {
                            Sharing::PerWorker => Cursor::private(roster, config.variant, config.sentinel),
                            Sharing::Shared => {
                                Cursor::shared(roster, config.variant, config.sentinel, index)
                            }
                        };
                        let delay = RandomDelay::new(config.time_unit, config.worker_seed(id));
                        Worker::new(id, ring, cursor, sink, delay, config).run()
                    });
                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(err) => {
                        spawn_error = Some(err);
                        break;
                    }
                }
            }

            let mut outcomes: Vec<_> = handles
                .into_iter()
                .map(|(id, handle)| {
                    let outcome = handle.join().unwrap_or(Err(WorkerError::Panicked));
                    (id, outcome)
                })
                .collect();
            if let Some(err) = spawn_error {
                let id = outcomes.len() + 1;
                error!(ta = id, error = %err, "failed to spawn TA");
                outcomes.push((id, Err(WorkerError::Spawn(err))));
            }
            outcomes
        });

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(source) => {
                    error!(ta = id, error = %source, "TA failed");
                    failure.get_or_insert(RunError::Worker { id, source });
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        info!(marked = reports.iter().map(|r| r.marked).sum::<usize>(), "all TAs finished");
        Ok(RunReport { workers: reports })
    }
}
