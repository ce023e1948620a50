// HILBENCH RUN CONFIGURATION
// DEFAULTS MATCH THE BENCH WIRING: TARGET UART ON ttyUSB1, RESET BOARD ON ttyUSB0

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::schedule::ExperimentRange;

pub const DEFAULT_TTY_TELEMETRY: &str = "/dev/ttyUSB1";
pub const DEFAULT_TTY_CONTROL: &str   = "/dev/ttyUSB0";

pub const TELEMETRY_BAUD: u32 = 115_200;
pub const CONTROL_BAUD: u32   = 9_600;

pub const DEFAULT_MIN_OBSERVATIONS: u64   = 100;
pub const DEFAULT_UNMATCHED_THRESHOLD: u32 = 50;
pub const DEFAULT_RESET_COMMAND: u8       = b'r';

pub const DEFAULT_STALL_TIMEOUT: Duration  = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration  = Duration::from_secs(1);
pub const DEFAULT_WAIT_INTERVAL: Duration  = Duration::from_millis(500);
pub const DEFAULT_READ_TIMEOUT: Duration   = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_millis(500);

/// Telemetry side: where lines come from and how they are validated.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub tty: String,
    pub baud: u32,
    pub read_timeout: Duration,
    pub unmatched_threshold: u32,
    pub log_unmatched: bool,
    pub reconnect_delay: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tty: DEFAULT_TTY_TELEMETRY.to_string(),
            baud: TELEMETRY_BAUD,
            read_timeout: DEFAULT_READ_TIMEOUT,
            unmatched_threshold: DEFAULT_UNMATCHED_THRESHOLD,
            log_unmatched: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Control side: when to give up on an experiment and how to reset the target.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub tty: String,
    pub baud: u32,
    pub min_observations: u64,
    pub stall_timeout: Duration,
    pub poll_interval: Duration,
    pub reset_command: u8,
    // THE RESET BOARD NEVER TALKS BACK; BOUNDS A WEDGED WRITE
    pub write_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tty: DEFAULT_TTY_CONTROL.to_string(),
            baud: CONTROL_BAUD,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reset_command: DEFAULT_RESET_COMMAND,
            write_timeout: DEFAULT_CONTROL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub schedule: PathBuf,
    pub output: PathBuf,
    pub working_dir: PathBuf,
    pub range: ExperimentRange,
    pub wait_interval: Duration,
    pub ingest: IngestConfig,
    pub watchdog: WatchdogConfig,
}

impl RunConfig {
    // REJECTS SETTINGS THAT WOULD TURN A BOUNDED LOOP INTO A SPIN OR A HANG
    pub fn validate(&self) -> Result<()> {
        if self.range.count == 0 {
            bail!("experiment count must be at least 1");
        }
        if self.wait_interval.is_zero() {
            bail!("wait interval must be non-zero");
        }
        if self.ingest.read_timeout.is_zero() {
            bail!("telemetry read timeout must be non-zero");
        }
        if self.watchdog.write_timeout.is_zero() {
            bail!("control write timeout must be non-zero");
        }
        if self.watchdog.poll_interval.is_zero() {
            bail!("watchdog poll interval must be non-zero");
        }
        if self.watchdog.stall_timeout < self.watchdog.poll_interval {
            bail!(
                "stall timeout ({:?}) must not be shorter than the poll interval ({:?})",
                self.watchdog.stall_timeout,
                self.watchdog.poll_interval
            );
        }
        if self.ingest.tty == self.watchdog.tty {
            bail!("telemetry and control channels must be different devices");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            schedule: PathBuf::from("schedule.csv"),
            output: PathBuf::from("out.log"),
            working_dir: PathBuf::from("."),
            range: ExperimentRange::new(3, 2),
            wait_interval: DEFAULT_WAIT_INTERVAL,
            ingest: IngestConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_empty_range() {
        let mut c = config();
        c.range.count = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut c = config();
        c.watchdog.poll_interval = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_control_timeout() {
        let mut c = config();
        c.watchdog.write_timeout = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_shared_tty() {
        let mut c = config();
        c.watchdog.tty = c.ingest.tty.clone();
        assert!(c.validate().is_err());
    }
}
