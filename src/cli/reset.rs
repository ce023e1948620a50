use anyhow::{Context, Result};
use clap::Args;

use hilbench::config::{CONTROL_BAUD, DEFAULT_CONTROL_TIMEOUT, DEFAULT_TTY_CONTROL};
use hilbench::serial::{Open, SerialChannel, SerialDevice};

use super::parse_command_byte;

#[derive(Args)]
pub struct ResetArgs {
    #[arg(long, default_value = DEFAULT_TTY_CONTROL)]
    tty_reset: String,

    #[arg(long, default_value_t = CONTROL_BAUD)]
    baud: u32,

    #[arg(long, default_value = "r", value_parser = parse_command_byte)]
    reset_command: u8,
}

pub fn run_reset(args: ResetArgs) -> Result<()> {
    let mut device = SerialDevice::new(&args.tty_reset, args.baud, DEFAULT_CONTROL_TIMEOUT);
    let mut channel = SerialChannel::new(device.open()?);
    channel
        .write(&[args.reset_command])
        .with_context(|| format!("writing reset command to {}", args.tty_reset))?;
    tracing::info!(tty = %args.tty_reset, command = %(args.reset_command as char), "RESET SENT");
    Ok(())
}
