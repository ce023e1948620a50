// HILBENCH ERROR TYPES
// ONE ENUM PER SUBSYSTEM. RECOVERABLE FAILURES (SEE ingest.rs, watchdog.rs)
// NEVER LEAVE THEIR OWNING LOOP; THESE ARE THE ONES THAT DO.

use std::path::PathBuf;

use thiserror::Error;

/// Failures on a serial channel. Always recoverable by the caller.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot open {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("read timed out")]
    Timeout,

    #[error("line is not valid UTF-8")]
    Decode,

    #[error("channel closed by peer")]
    Closed,

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Build collaborator outcome. `Failed` skips one record, `Environment` aborts the run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{step} failed: {message}")]
    Failed { step: &'static str, message: String },

    #[error("build environment unusable: {0}")]
    Environment(String),
}

impl BuildError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Environment(_))
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("log file {path} already exists, refusing to overwrite")]
    LogExists { path: PathBuf },

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Background thread lifecycle, shared by the ingestor and the watchdog.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cannot read schedule {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("schedule row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("experiment {experiment}: {source}")]
    Build {
        experiment: u32,
        #[source]
        source: BuildError,
    },

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}
