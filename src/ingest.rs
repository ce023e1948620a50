// HILBENCH LOG INGESTOR
// TELEMETRY THREAD: SERIAL LINES -> VALIDATION -> APPEND-ONLY LOG FILE
//
// NOTHING IN THE LOOP IS FATAL. CONNECT, READ AND DECODE FAILURES ALL FOLD
// INTO THE INIT TRANSITION AND THE LOOP KEEPS GOING. THE ONE FATAL CASE IS
// THE LOG FILE ITSELF, CHECKED IN start() BEFORE THE THREAD EXISTS.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::config::IngestConfig;
use crate::error::{ChannelError, IngestError, WorkerError};
use crate::progress::{Progress, ProgressSnapshot, Verdict};
use crate::serial::{Open, SerialChannel};
use crate::signal::StopFlag;

/// Counters returned by `LogIngestor::stop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub persisted: u64,
    pub corrupt: u64,
    pub desyncs: u64,
    pub faults: u64,
    pub reconnects: u64,
    pub write_errors: u64,
}

/// Create the log file. Refuses to touch an existing one.
pub fn create_log(path: &Path) -> Result<LineWriter<File>, IngestError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(LineWriter::new)
        .map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => IngestError::LogExists { path: path.to_path_buf() },
            _ => IngestError::LogFile { path: path.to_path_buf(), source },
        })
}

pub struct LogIngestor {
    progress: Progress,
    stop: StopFlag,
    handle: Option<JoinHandle<IngestStats>>,
    path: PathBuf,
}

impl LogIngestor {
    pub fn start<O>(opener: O, log_path: &Path, config: &IngestConfig) -> Result<Self, IngestError>
    where
        O: Open + 'static,
    {
        let log = create_log(log_path)?;
        let progress = Progress::new(config.unmatched_threshold);
        let stop = StopFlag::new();

        let worker = IngestLoop {
            opener,
            log,
            progress: progress.clone(),
            stop: stop.clone(),
            config: config.clone(),
            stats: IngestStats::default(),
        };
        let handle = std::thread::Builder::new()
            .name("ingest".into())
            .spawn(move || worker.run())
            .map_err(|source| WorkerError::Spawn { name: "ingest", source })?;

        tracing::info!(log = %log_path.display(), "INGESTOR STARTED");
        Ok(Self {
            progress,
            stop,
            handle: Some(handle),
            path: log_path.to_path_buf(),
        })
    }

    /// Shared handle for the watchdog.
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn force_init(&self) {
        self.progress.force_init();
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    /// Stop reading, flush and close the log. Returns within one read timeout.
    pub fn stop(mut self) -> Result<IngestStats, IngestError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<IngestStats, IngestError> {
        self.stop.raise();
        match self.handle.take() {
            Some(h) => h.join().map_err(|_| WorkerError::Panicked("ingest").into()),
            None => Ok(IngestStats::default()),
        }
    }
}

impl Drop for LogIngestor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

struct IngestLoop<O: Open> {
    opener: O,
    log: LineWriter<File>,
    progress: Progress,
    stop: StopFlag,
    config: IngestConfig,
    stats: IngestStats,
}

impl<O: Open> IngestLoop<O> {
    fn run(mut self) -> IngestStats {
        let mut channel: Option<SerialChannel<O::Port>> = None;
        let mut announced_down = false;

        while !self.stop.is_raised() {
            let Some(ch) = channel.as_mut() else {
                match self.opener.open() {
                    Ok(port) => {
                        tracing::info!(tty = self.opener.name(), "TELEMETRY CONNECTED");
                        channel = Some(SerialChannel::new(port));
                        announced_down = false;
                        self.stats.reconnects += 1;
                    }
                    Err(e) => {
                        // A MISSING DEVICE IS NORMAL WHILE THE TARGET RESETS; SAY IT ONCE
                        if announced_down {
                            tracing::debug!(error = %e, "TELEMETRY STILL UNAVAILABLE");
                        } else {
                            tracing::warn!(error = %e, "TELEMETRY UNAVAILABLE, RETRYING");
                            announced_down = true;
                        }
                        self.stop.sleep(self.config.reconnect_delay);
                    }
                }
                continue;
            };

            match ch.read_line() {
                Ok(line) => self.handle_line(&line),
                Err(ChannelError::Timeout) => {}
                Err(ChannelError::Decode) => {
                    self.stats.faults += 1;
                    self.progress.fault();
                    tracing::warn!("UNDECODABLE BYTES ON TELEMETRY");
                }
                Err(e) => {
                    self.stats.faults += 1;
                    self.progress.fault();
                    tracing::warn!(error = %e, "TELEMETRY LOST");
                    channel = None;
                }
            }
        }

        // CHANNEL DROPS HERE, BEFORE THE FILE IS FLUSHED
        drop(channel);
        if let Err(e) = self.log.flush() {
            self.stats.write_errors += 1;
            tracing::error!(error = %e, "LOG FLUSH FAILED");
        }
        tracing::info!(
            lines = self.stats.lines,
            persisted = self.stats.persisted,
            corrupt = self.stats.corrupt,
            "INGESTOR STOPPED"
        );
        self.stats
    }

    fn handle_line(&mut self, line: &str) {
        self.stats.lines += 1;
        match self.progress.observe(line) {
            Verdict::Accepted(iteration) => {
                tracing::debug!(iteration, "ITERATION");
                self.persist(line);
            }
            Verdict::Corrupt(iteration) => {
                self.stats.corrupt += 1;
                tracing::warn!(iteration, "DISCARDING NON-LOGICAL ITERATION");
            }
            Verdict::Unmatched { tracking } => {
                tracing::debug!(line, "NO MATCH");
                if tracking && self.config.log_unmatched {
                    self.persist(line);
                }
            }
            Verdict::Desynced => {
                self.stats.desyncs += 1;
                tracing::warn!(
                    threshold = self.config.unmatched_threshold,
                    "UNMATCHED LINES EXCEEDED THRESHOLD"
                );
            }
        }
    }

    fn persist(&mut self, line: &str) {
        match writeln!(self.log, "{line}") {
            Ok(()) => self.stats.persisted += 1,
            Err(e) => {
                self.stats.write_errors += 1;
                tracing::error!(error = %e, "LOG WRITE FAILED");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_log_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "previous results\n").unwrap();
        assert!(matches!(create_log(&path), Err(IngestError::LogExists { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous results\n");
    }

    #[test]
    fn create_log_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("run.log");
        assert!(matches!(create_log(&path), Err(IngestError::LogFile { .. })));
    }
}
