pub mod check;
pub mod probe;
pub mod reset;
pub mod run;

use std::time::Duration;

pub const DEFAULT_WORKING_DIR: &str = "../xRTOS_MMU_SEMAPHORE";

// "60", "0.5", "1.25" -> SECONDS
pub fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("not a number of seconds: {raw:?}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

// THE RESET BOARD LISTENS FOR ONE ASCII BYTE
pub fn parse_command_byte(raw: &str) -> Result<u8, String> {
    match raw.as_bytes() {
        [b] if b.is_ascii_graphic() => Ok(*b),
        _ => Err(format!("reset command must be one printable ASCII character, got {raw:?}")),
    }
}
