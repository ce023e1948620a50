use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Args;

use hilbench::config::{
    DEFAULT_READ_TIMEOUT, DEFAULT_TTY_TELEMETRY, DEFAULT_UNMATCHED_THRESHOLD, TELEMETRY_BAUD,
};
use hilbench::error::ChannelError;
use hilbench::progress::Tracker;
use hilbench::serial::{Open, SerialChannel, SerialDevice};

#[derive(Args)]
pub struct ProbeArgs {
    #[arg(long, default_value = DEFAULT_TTY_TELEMETRY)]
    tty_logging: String,

    #[arg(long, default_value_t = TELEMETRY_BAUD)]
    baud: u32,

    #[arg(long, default_value_t = DEFAULT_UNMATCHED_THRESHOLD)]
    unmatched_threshold: u32,
}

// ONE ROW PER TELEMETRY LINE: VERDICT, TRACKED ITERATION, RAW LINE.
// NOTHING IS PERSISTED AND NO RESET IS EVER SENT.
pub fn run_probe(args: ProbeArgs, shutdown: &AtomicBool) -> Result<()> {
    let mut device = SerialDevice::new(&args.tty_logging, args.baud, DEFAULT_READ_TIMEOUT);
    let mut channel = SerialChannel::new(device.open()?);
    let mut tracker = Tracker::new(args.unmatched_threshold);

    println!("PROBING {} @ {} (CTRL+C TO EXIT)", args.tty_logging, args.baud);
    println!("{:<10} {:>8}  LINE", "VERDICT", "ITER");

    while !shutdown.load(Ordering::Relaxed) {
        match channel.read_line() {
            Ok(line) => {
                let verdict = tracker.observe(&line);
                let snap = tracker.snapshot();
                println!("{:<10} {:>8}  {}", verdict.label(), snap.last_iteration, line);
            }
            Err(ChannelError::Timeout) => {}
            Err(ChannelError::Decode) => {
                tracker.fault();
                println!("{:<10} {:>8}  <undecodable>", "FAULT", "-");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let snap = tracker.snapshot();
    println!();
    println!(
        "LAST ITERATION {} ({})",
        snap.last_iteration,
        if snap.healthy { "HEALTHY" } else { "NOT TRACKING" }
    );
    Ok(())
}
