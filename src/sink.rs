//! Where marks end up: one append-only stream of records per worker.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cursor::CursorVariant;
use crate::error::SinkError;
use crate::{StudentId, WorkerId};

/// A mark given by one worker to one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkRecord {
    /// The marking worker.
    pub ta: WorkerId,
    /// The marked student.
    pub student: StudentId,
    /// The mark given.
    pub mark: u8,
}

/// Line layout of a [`MarkRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `Student <id>: Grade <mark>`
    Plain,
    /// `TA<ta> marked student <0000> with <mark>`
    Tagged,
}

impl From<CursorVariant> for RecordFormat {
    fn from(variant: CursorVariant) -> Self {
        match variant {
            CursorVariant::Rewind => RecordFormat::Plain,
            CursorVariant::Sentinel => RecordFormat::Tagged,
        }
    }
}

impl MarkRecord {
    /// Returns a value that displays the record in `format`.
    pub fn display(&self, format: RecordFormat) -> impl fmt::Display + '_ {
        Rendered {
            record: self,
            format,
        }
    }
}

struct Rendered<'a> {
    record: &'a MarkRecord,
    format: RecordFormat,
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let MarkRecord { ta, student, mark } = *self.record;
        match self.format {
            RecordFormat::Plain => write!(f, "Student {}: Grade {}", student, mark),
            RecordFormat::Tagged => write!(f, "TA{} marked student {:04} with {}", ta, student, mark),
        }
    }
}

/// Destination for one worker's records.
pub trait RecordSink: Send {
    /// Writes `record` and makes it durable before returning.
    fn write_record(&mut self, record: &MarkRecord) -> Result<(), SinkError>;
}

/// Opens a sink for each worker at setup.
pub trait SinkFactory {
    /// The sink handed to a worker.
    type Sink: RecordSink;

    /// Opens the sink for `worker`.
    fn open(&self, worker: WorkerId) -> Result<Self::Sink, SinkError>;
}

/// Writes `TA<id>.txt` files into a directory.
#[derive(Debug, Clone)]
pub struct FileSinks {
    dir: PathBuf,
    format: RecordFormat,
}

impl FileSinks {
    /// Creates a factory writing into `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, format: RecordFormat) -> Self {
        FileSinks {
            dir: dir.as_ref().to_owned(),
            format,
        }
    }

    /// Returns the file `worker` writes to.
    pub fn path_of(&self, worker: WorkerId) -> PathBuf {
        self.dir.join(format!("TA{}.txt", worker))
    }
}

impl SinkFactory for FileSinks {
    type Sink = FileSink;

    fn open(&self, worker: WorkerId) -> Result<FileSink, SinkError> {
        let path = self.path_of(worker);
        let file = File::create(&path).map_err(|source| SinkError::Open {
            worker,
            path,
            source,
        })?;
        Ok(FileSink {
            out: BufWriter::new(file),
            format: self.format,
        })
    }
}

/// A worker's output file.
#[derive(Debug)]
pub struct FileSink {
    out: BufWriter<File>,
    format: RecordFormat,
}

impl RecordSink for FileSink {
    fn write_record(&mut self, record: &MarkRecord) -> Result<(), SinkError> {
        writeln!(self.out, "{}", record.display(self.format))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every worker's records in memory.
#[derive(Debug, Clone)]
pub struct MemorySinks {
    format: RecordFormat,
    lines: Arc<Mutex<BTreeMap<WorkerId, Vec<String>>>>,
}

impl MemorySinks {
    /// Creates an empty set of in-memory sinks.
    pub fn new(format: RecordFormat) -> Self {
        MemorySinks {
            format,
            lines: Arc::default(),
        }
    }

    /// Returns the lines written by `worker` so far.
    pub fn lines(&self, worker: WorkerId) -> Vec<String> {
        self.lines.lock().get(&worker).cloned().unwrap_or_default()
    }
}

impl SinkFactory for MemorySinks {
    type Sink = MemorySink;

    fn open(&self, worker: WorkerId) -> Result<MemorySink, SinkError> {
        self.lines.lock().insert(worker, Vec::new());
        Ok(MemorySink {
            worker,
            format: self.format,
            lines: Arc::clone(&self.lines),
        })
    }
}

/// One worker's in-memory record stream.
#[derive(Debug)]
pub struct MemorySink {
    worker: WorkerId,
    format: RecordFormat,
    lines: Arc<Mutex<BTreeMap<WorkerId, Vec<String>>>>,
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &MarkRecord) -> Result<(), SinkError> {
        let line = record.display(self.format).to_string();
        self.lines.lock().entry(self.worker).or_default().push(line);
        Ok(())
    }
}
