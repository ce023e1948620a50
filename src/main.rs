// HILBENCH v0.3.0 -- HARDWARE-IN-THE-LOOP BENCHMARK RUNNER
// BUILDS, DEPLOYS AND RESETS AN EMBEDDED TARGET ACROSS A SCHEDULE OF EXPERIMENTS
//
// SUBCOMMANDS:
//   run    THE CAMPAIGN
//   check  TOOLS, DEVICES, FIRMWARE TREE
//   probe  WATCH TELEMETRY WITH THE VALIDATOR'S VERDICTS
//   reset  SEND ONE RESET COMMAND

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "hilbench")]
#[command(about = "HILBENCH -- UNATTENDED HARDWARE-IN-THE-LOOP BENCHMARK RUNNER")]
struct Cli {
    // DEBUG OUTPUT (RUST_LOG OVERRIDES)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build, deploy and observe every experiment in range
    Run(cli::run::RunArgs),
    /// Verify build tools, serial devices and the firmware tree
    Check(cli::check::CheckArgs),
    /// Print telemetry lines with their validation verdict
    Probe(cli::probe::ProbeArgs),
    /// Send a single reset command to the target
    Reset(cli::reset::ResetArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    match cli.command {
        Command::Run(args) => cli::run::run_campaign(args, &SHUTDOWN),
        Command::Check(args) => cli::check::run_check(args),
        Command::Probe(args) => cli::probe::run_probe(args, &SHUTDOWN),
        Command::Reset(args) => cli::reset::run_reset(args),
    }
}
