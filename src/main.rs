//! Runs a ring of TAs marking students.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ta_ring::{AcquireMode, CursorVariant, RunConfig, Sharing, Supervisor};

/// A ring of TAs sharing a student database two locks at a time
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of TAs in the ring
    #[arg(short, long, default_value_t = 5)]
    workers: usize,

    /// Rounds over the roster each TA completes
    #[arg(short, long, default_value_t = 3)]
    rounds: usize,

    /// How a TA takes its pair of locks
    #[arg(long, value_enum, default_value_t = Mode::Blocking)]
    mode: Mode,

    /// How a TA notices the end of the roster
    #[arg(long, value_enum, default_value_t = Variant::Rewind)]
    variant: Variant,

    /// Whether TAs share one read position (defaults to the variant's own)
    #[arg(long, value_enum)]
    sharing: Option<Share>,

    /// Students in a generated roster
    #[arg(long, default_value_t = 20)]
    students: usize,

    /// Read the roster from this file instead of generating one
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Directory receiving the TA<id>.txt files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Length of one delay unit in milliseconds
    #[arg(long, default_value_t = 1000)]
    time_unit_ms: u64,

    /// Give up on a lock after this many milliseconds (waits forever if unset)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Seed for delays and marks
    #[arg(long)]
    seed: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Blocking,
    Try,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Variant {
    Rewind,
    Sentinel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Share {
    PerWorker,
    Shared,
}

impl Args {
    fn config(&self) -> Result<RunConfig> {
        let mut builder = RunConfig::builder()
            .workers(self.workers)
            .rounds(self.rounds)
            .acquire(match self.mode {
                Mode::Blocking => AcquireMode::Blocking,
                Mode::Try => AcquireMode::Try,
            })
            .variant(match self.variant {
                Variant::Rewind => CursorVariant::Rewind,
                Variant::Sentinel => CursorVariant::Sentinel,
            })
            .students(self.students)
            .output_dir(&self.output_dir)
            .time_unit(Duration::from_millis(self.time_unit_ms))
            .acquire_timeout(self.timeout_ms.map(Duration::from_millis))
            .seed(self.seed);
        if let Some(sharing) = self.sharing {
            builder = builder.sharing(match sharing {
                Share::PerWorker => Sharing::PerWorker,
                Share::Shared => Sharing::Shared,
            });
        }
        if let Some(roster) = &self.roster {
            builder = builder.roster_path(roster);
        }
        Ok(builder.build()?)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ta_ring={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    let config = args.config()?;
    info!("Output directory: {}", config.output_dir.display());

    let report = Supervisor::with_files(config).run()?;
    for worker in &report.workers {
        info!(
            ta = worker.id,
            rounds = worker.rounds,
            marked = worker.marked,
            contentions = worker.contentions,
            "TA summary"
        );
    }
    Ok(())
}
