use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use hilbench::config::{
    IngestConfig, RunConfig, WatchdogConfig, CONTROL_BAUD, DEFAULT_CONTROL_TIMEOUT,
    DEFAULT_MIN_OBSERVATIONS, DEFAULT_READ_TIMEOUT, DEFAULT_RECONNECT_DELAY, DEFAULT_TTY_CONTROL,
    DEFAULT_TTY_TELEMETRY, DEFAULT_UNMATCHED_THRESHOLD, DEFAULT_WAIT_INTERVAL, TELEMETRY_BAUD,
};
use hilbench::firmware::MakeBuild;
use hilbench::orchestrator;
use hilbench::schedule::{ExperimentRange, Schedule};
use hilbench::serial::SerialDevice;

use super::{parse_command_byte, parse_secs, DEFAULT_WORKING_DIR};

#[derive(Args)]
pub struct RunArgs {
    // SCHEDULE CSV, ONE ROW PER EXPERIMENT
    #[arg(long)]
    input_file: PathBuf,

    // TELEMETRY LOG; MUST NOT EXIST YET
    #[arg(long)]
    output_file: PathBuf,

    // FIRMWARE TREE CONTAINING benchmark_config.m4
    #[arg(long, default_value = DEFAULT_WORKING_DIR)]
    working_directory: PathBuf,

    // RESET BOARD
    #[arg(long, default_value = DEFAULT_TTY_CONTROL)]
    tty_reset: String,

    // TARGET UART
    #[arg(long, default_value = DEFAULT_TTY_TELEMETRY)]
    tty_logging: String,

    // ITERATIONS NEEDED BEFORE AN EXPERIMENT COUNTS AS DONE (STRICTLY MORE THAN THIS)
    #[arg(long, default_value_t = DEFAULT_MIN_OBSERVATIONS)]
    min_observations: u64,

    // FIRST EXPERIMENT NUMBER TO RUN
    #[arg(long, default_value_t = 1)]
    experiment_begin: u32,

    // NUMBER OF EXPERIMENT NUMBERS TO RUN FROM experiment_begin
    #[arg(long, default_value_t = 1)]
    experiment_count: u32,

    // SECONDS WITHOUT HEALTHY TELEMETRY BEFORE A RESET
    #[arg(long, default_value = "60", value_parser = parse_secs)]
    timeout: Duration,

    // WATCHDOG POLL INTERVAL IN SECONDS
    #[arg(long, default_value = "1", value_parser = parse_secs)]
    poll_interval: Duration,

    // CONSECUTIVE NON-ITERATION LINES TOLERATED BEFORE TELEMETRY IS PRESUMED DESYNCED
    #[arg(long, default_value_t = DEFAULT_UNMATCHED_THRESHOLD)]
    unmatched_threshold: u32,

    // ALSO PERSIST NON-ITERATION LINES SEEN WHILE TRACKING
    #[arg(long)]
    log_unmatched: bool,

    // BYTE SENT TO THE RESET BOARD
    #[arg(long, default_value = "r", value_parser = parse_command_byte)]
    reset_command: u8,

    // DUMP FULL PER-EXPERIMENT TABLE ON EXIT
    #[arg(long)]
    dump_log: bool,
}

impl RunArgs {
    fn config(&self) -> RunConfig {
        RunConfig {
            schedule: self.input_file.clone(),
            output: self.output_file.clone(),
            working_dir: self.working_directory.clone(),
            range: ExperimentRange::new(self.experiment_begin, self.experiment_count),
            wait_interval: DEFAULT_WAIT_INTERVAL,
            ingest: IngestConfig {
                tty: self.tty_logging.clone(),
                baud: TELEMETRY_BAUD,
                read_timeout: DEFAULT_READ_TIMEOUT,
                unmatched_threshold: self.unmatched_threshold,
                log_unmatched: self.log_unmatched,
                reconnect_delay: DEFAULT_RECONNECT_DELAY,
            },
            watchdog: WatchdogConfig {
                tty: self.tty_reset.clone(),
                baud: CONTROL_BAUD,
                min_observations: self.min_observations,
                stall_timeout: self.timeout,
                poll_interval: self.poll_interval,
                reset_command: self.reset_command,
                write_timeout: DEFAULT_CONTROL_TIMEOUT,
            },
        }
    }
}

pub fn run_campaign(args: RunArgs, shutdown: &AtomicBool) -> Result<()> {
    // GUARDS BEFORE ANY DEVICE OR FILE IS TOUCHED
    if !args.input_file.is_file() {
        bail!("input file {} does not exist", args.input_file.display());
    }
    if args.output_file.exists() {
        bail!("output file {} already exists", args.output_file.display());
    }

    let config = args.config();
    config.validate()?;

    let schedule = Schedule::load(&config.schedule)?;
    if schedule.is_empty() {
        tracing::warn!(schedule = %config.schedule.display(), "SCHEDULE HAS NO ROWS");
    }
    let selected = schedule.in_range(config.range).count();

    let builder = MakeBuild::new(&config.working_dir);
    builder.check_tree().context("firmware tree")?;

    let end = u64::from(config.range.begin) + u64::from(config.range.count);
    println!("HILBENCH v0.3.0");
    println!(
        "SCHEDULE:        {} ({} rows, {} in range)",
        config.schedule.display(),
        schedule.len(),
        selected
    );
    println!("RANGE:           [{}, {})", config.range.begin, end);
    println!("FIRMWARE:        {}", builder.working_dir().display());
    println!("OUTPUT:          {}", config.output.display());
    println!("TELEMETRY:       {} @ {}", config.ingest.tty, config.ingest.baud);
    println!("CONTROL:         {} @ {}", config.watchdog.tty, config.watchdog.baud);
    println!("MIN OBS:         {}", config.watchdog.min_observations);
    println!(
        "TIMEOUT:         {:.1}s (poll {:.1}s)",
        config.watchdog.stall_timeout.as_secs_f64(),
        config.watchdog.poll_interval.as_secs_f64()
    );
    println!();

    if selected == 0 {
        tracing::warn!("NO EXPERIMENTS IN RANGE");
    }

    let telemetry = SerialDevice::new(
        &config.ingest.tty,
        config.ingest.baud,
        config.ingest.read_timeout,
    );
    let control = SerialDevice::new(
        &config.watchdog.tty,
        config.watchdog.baud,
        config.watchdog.write_timeout,
    );

    let report =
        orchestrator::run_campaign(&config, &schedule, builder, telemetry, control, shutdown)?;

    if args.dump_log {
        report.log.dump();
    }
    report.log.summary();
    if let Some(s) = report.ingest {
        println!(
            "  LOG LINES:         {} persisted / {} read",
            s.persisted, s.lines
        );
        println!(
            "                     {} corrupt, {} desync, {} faults, {} write errors",
            s.corrupt, s.desyncs, s.faults, s.write_errors
        );
    }
    if let Some(w) = report.watchdog {
        println!(
            "  RESETS:            {} done / {} stalled ({} not sent)",
            w.done, w.stalled, w.reset_failures
        );
    }

    report.outcome?;
    println!("HILBENCH OUT.");
    Ok(())
}
