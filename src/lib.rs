// HILBENCH -- UNATTENDED HARDWARE-IN-THE-LOOP BENCHMARK CAMPAIGNS
// BUILD AN IMAGE PER SCHEDULED EXPERIMENT, WATCH THE TARGET'S TELEMETRY,
// RESET IT WHEN THE EXPERIMENT HAS ENOUGH DATA OR HAS STALLED, MOVE ON.
//
// THREADS:
//   MAIN      orchestrator.rs  BUILD, WAIT FOR ADVANCE, REPEAT
//   INGEST    ingest.rs        TELEMETRY TTY -> VALIDATION -> LOG FILE
//   WATCHDOG  watchdog.rs      PROGRESS -> DONE/STALLED -> RESET TTY + ADVANCE

pub mod config;
pub mod error;
pub mod event;
pub mod firmware;
pub mod ingest;
pub mod orchestrator;
pub mod policy;
pub mod progress;
pub mod schedule;
pub mod serial;
pub mod signal;
pub mod watchdog;
