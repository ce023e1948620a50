use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use clap::Args;

use hilbench::config::{DEFAULT_TTY_CONTROL, DEFAULT_TTY_TELEMETRY};
use hilbench::firmware::MakeBuild;

use super::DEFAULT_WORKING_DIR;

#[derive(Args)]
pub struct CheckArgs {
    #[arg(long, default_value = DEFAULT_TTY_CONTROL)]
    tty_reset: String,

    #[arg(long, default_value = DEFAULT_TTY_TELEMETRY)]
    tty_logging: String,

    #[arg(long, default_value = DEFAULT_WORKING_DIR)]
    working_directory: PathBuf,
}

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn check_device(role: &str, path: &str) -> bool {
    let found = Path::new(path).exists();
    if found {
        println!("  {:<24}{} OK", role, path);
    } else {
        println!("  {:<24}{} NOT FOUND", role, path);
    }
    found
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    println!("HILBENCH DEPENDENCY CHECK");
    println!();

    let mut ok = true;
    for tool in ["make", "m4"] {
        if check_tool(tool) {
            println!("  {:<24}OK", tool);
        } else {
            println!("  {:<24}MISSING", tool);
            ok = false;
        }
    }
    println!();

    println!("SERIAL DEVICES:");
    ok &= check_device("telemetry", &args.tty_logging);
    ok &= check_device("control", &args.tty_reset);
    if args.tty_logging == args.tty_reset {
        println!(
            "  TELEMETRY AND CONTROL SHARE {} -- THEY MUST BE DIFFERENT DEVICES",
            args.tty_logging
        );
        ok = false;
    }
    // INFORMATIONAL ONLY; ENUMERATION IS UNSUPPORTED ON SOME HOSTS
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => println!("  (no serial ports enumerated)"),
        Ok(ports) => {
            for p in ports {
                println!("  seen: {}", p.port_name);
            }
        }
        Err(e) => println!("  port enumeration unavailable: {}", e),
    }
    println!();

    println!("FIRMWARE TREE:");
    match MakeBuild::new(&args.working_directory).check_tree() {
        Ok(()) => println!("  {:<24}OK", args.working_directory.display()),
        Err(e) => {
            println!("  {:<24}{}", args.working_directory.display(), e);
            ok = false;
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        if !check_tool("m4") || !check_tool("make") {
            println!("  Install build tools: apt install make m4");
        }
        std::process::exit(1);
    }

    Ok(())
}
