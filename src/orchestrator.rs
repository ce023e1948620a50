// HILBENCH EXPERIMENT ORCHESTRATOR
// MAIN-THREAD SEQUENCER. PER IN-RANGE RECORD:
//   PREPARING -> BUILDING -> WAITING -> ADVANCING
// THEN DONE, OR FATAL ON AN ENVIRONMENT-LEVEL BUILD FAILURE.
//
// THE ONLY INPUT FROM THE BACKGROUND THREADS IS THE AdvanceSignal. THE
// ORCHESTRATOR DISARMS IT FOR PREPARING/BUILDING AND ARMS IT ON WAITING.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::RunConfig;
use crate::error::OrchestratorError;
use crate::event::{Outcome, RunLog};
use crate::firmware::Build;
use crate::ingest::{IngestStats, LogIngestor};
use crate::schedule::{ExperimentRange, ExperimentRecord, Schedule};
use crate::serial::Open;
use crate::signal::{Advance, AdvanceSignal};
use crate::watchdog::{ResetWatchdog, WatchdogStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preparing,
    Building,
    Waiting,
    Advancing,
    Done,
    Fatal,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Preparing => "PREPARING",
            Self::Building => "BUILDING",
            Self::Waiting => "WAITING",
            Self::Advancing => "ADVANCING",
            Self::Done => "DONE",
            Self::Fatal => "FATAL",
        }
    }
}

pub struct Orchestrator<'a, B> {
    builder: B,
    signal: AdvanceSignal,
    wait_interval: Duration,
    shutdown: &'a AtomicBool,
    phase: Phase,
    log: RunLog,
}

impl<'a, B: Build> Orchestrator<'a, B> {
    pub fn new(
        builder: B,
        signal: AdvanceSignal,
        wait_interval: Duration,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            builder,
            signal,
            wait_interval,
            shutdown,
            phase: Phase::Preparing,
            log: RunLog::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn into_log(self) -> RunLog {
        self.log
    }

    fn enter(&mut self, phase: Phase, experiment: u32) {
        self.phase = phase;
        tracing::info!(experiment, phase = phase.label(), "PHASE");
    }

    pub fn run(
        &mut self,
        schedule: &Schedule,
        range: ExperimentRange,
    ) -> Result<(), OrchestratorError> {
        for record in schedule.records() {
            if !range.contains(record.number) {
                tracing::debug!(experiment = record.number, "NOT IN RANGE");
                continue;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(OrchestratorError::Interrupted);
            }
            self.run_one(record)?;
        }

        self.phase = Phase::Done;
        tracing::info!("SCHEDULE EXHAUSTED");
        Ok(())
    }

    fn run_one(&mut self, record: &ExperimentRecord) -> Result<(), OrchestratorError> {
        let started = Instant::now();
        self.enter(Phase::Preparing, record.number);
        self.signal.disarm();
        tracing::info!(
            experiment = record.number,
            label = record.display_label(),
            "STARTING EXPERIMENT"
        );

        self.enter(Phase::Building, record.number);
        if let Err(e) = self.builder.build(record) {
            if e.is_fatal() {
                self.enter(Phase::Fatal, record.number);
                return Err(OrchestratorError::Build { experiment: record.number, source: e });
            }
            tracing::warn!(experiment = record.number, error = %e, "BUILD FAILED, SKIPPING");
            self.log.record(record, Outcome::BuildFailed, started.elapsed());
            return Ok(());
        }
        tracing::info!(experiment = record.number, "BUILD DONE");

        // AN ADVANCE RAISED WHILE BUILDING BELONGS TO THE PREVIOUS IMAGE
        if let Some(stale) = self.signal.take() {
            tracing::warn!(reason = stale.reason.label(), "DISCARDING ADVANCE RAISED DURING BUILD");
        }

        self.enter(Phase::Waiting, record.number);
        self.signal.arm();
        let advance = self.wait_for_advance()?;

        self.enter(Phase::Advancing, record.number);
        tracing::info!(
            experiment = record.number,
            reason = advance.reason.label(),
            "MOVING ON TO NEXT EXPERIMENT"
        );
        let elapsed = advance.at.saturating_duration_since(started);
        self.log.record(record, advance.reason.into(), elapsed);
        Ok(())
    }

    fn wait_for_advance(&self) -> Result<Advance, OrchestratorError> {
        loop {
            if let Some(advance) = self.signal.wait_timeout(self.wait_interval) {
                return Ok(advance);
            }
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(OrchestratorError::Interrupted);
            }
        }
    }
}

/// Everything a finished (or aborted) campaign leaves behind.
#[derive(Debug)]
pub struct CampaignReport {
    pub outcome: Result<(), OrchestratorError>,
    pub log: RunLog,
    pub ingest: Option<IngestStats>,
    pub watchdog: Option<WatchdogStats>,
}

/// Start both background loops, sequence the schedule, stop the loops.
///
/// Errors only if the loops cannot be started; a failed run is reported in
/// `CampaignReport::outcome` after the log file has been flushed and closed.
pub fn run_campaign<B, T, C>(
    config: &RunConfig,
    schedule: &Schedule,
    builder: B,
    telemetry: T,
    control: C,
    shutdown: &AtomicBool,
) -> Result<CampaignReport, OrchestratorError>
where
    B: Build,
    T: Open + 'static,
    C: Open + 'static,
{
    let ingestor = LogIngestor::start(telemetry, &config.output, &config.ingest)?;
    tracing::info!(
        log = %ingestor.log_path().display(),
        begin = config.range.begin,
        count = config.range.count,
        "CAMPAIGN STARTED"
    );
    let signal = AdvanceSignal::new();
    let watchdog =
        ResetWatchdog::start(control, ingestor.progress(), signal.clone(), &config.watchdog)?;

    let mut orchestrator = Orchestrator::new(builder, signal, config.wait_interval, shutdown);
    let outcome = orchestrator.run(schedule, config.range);
    let log = orchestrator.into_log();

    let ingest = ingestor
        .stop()
        .map_err(|e| tracing::error!(error = %e, "INGESTOR DID NOT STOP CLEANLY"))
        .ok();
    let watchdog = watchdog
        .stop()
        .map_err(|e| tracing::error!(error = %e, "WATCHDOG DID NOT STOP CLEANLY"))
        .ok();

    Ok(CampaignReport { outcome, log, ingest, watchdog })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::signal::AdvanceReason;

    // RAISES AN ADVANCE SHORTLY AFTER EACH SUCCESSFUL BUILD, LIKE A TARGET THAT BOOTS AND FINISHES
    struct Scripted {
        signal: AdvanceSignal,
        fail: Vec<(u32, bool)>,
        built: Vec<u32>,
    }

    impl Build for Scripted {
        fn build(&mut self, record: &ExperimentRecord) -> Result<(), BuildError> {
            self.built.push(record.number);
            if let Some(&(_, fatal)) = self.fail.iter().find(|(n, _)| *n == record.number) {
                return Err(if fatal {
                    BuildError::Environment("no toolchain".into())
                } else {
                    BuildError::Failed { step: "make install", message: "exit 2".into() }
                });
            }
            let s = self.signal.clone();
            let iterations = 100 + record.number as u64;
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                s.raise(Advance::now(AdvanceReason::Done { iterations }));
            });
            Ok(())
        }
    }

    fn schedule(numbers: &[u32]) -> Schedule {
        Schedule::new(
            numbers
                .iter()
                .map(|&number| ExperimentRecord { number, ..Default::default() })
                .collect(),
        )
    }

    fn orchestrator(fail: Vec<(u32, bool)>, shutdown: &AtomicBool) -> Orchestrator<'_, Scripted> {
        let signal = AdvanceSignal::new();
        let builder = Scripted { signal: signal.clone(), fail, built: Vec::new() };
        Orchestrator::new(builder, signal, Duration::from_millis(10), shutdown)
    }

    #[test]
    fn runs_only_records_in_range() {
        let shutdown = AtomicBool::new(false);
        let mut o = orchestrator(vec![], &shutdown);
        o.run(&schedule(&[1, 2, 3, 4, 5]), ExperimentRange::new(2, 3)).unwrap();
        assert_eq!(o.builder.built, vec![2, 3, 4]);
        assert_eq!(o.phase(), Phase::Done);
        let outcomes: Vec<Outcome> = o.log().entries().iter().map(|e| e.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Done { iterations: 102 },
                Outcome::Done { iterations: 103 },
                Outcome::Done { iterations: 104 },
            ]
        );
    }

    #[test]
    fn build_failure_skips_record() {
        let shutdown = AtomicBool::new(false);
        let mut o = orchestrator(vec![(2, false)], &shutdown);
        o.run(&schedule(&[1, 2, 3]), ExperimentRange::new(1, 3)).unwrap();
        assert_eq!(o.builder.built, vec![1, 2, 3]);
        assert_eq!(o.log().counts(), (2, 0, 1));
    }

    #[test]
    fn environment_failure_aborts() {
        let shutdown = AtomicBool::new(false);
        let mut o = orchestrator(vec![(2, true)], &shutdown);
        let err = o.run(&schedule(&[1, 2, 3]), ExperimentRange::new(1, 3)).unwrap_err();
        assert!(matches!(err, OrchestratorError::Build { experiment: 2, .. }));
        assert_eq!(o.phase(), Phase::Fatal);
        assert_eq!(o.builder.built, vec![1, 2]);
    }

    #[test]
    fn shutdown_interrupts_waiting() {
        // BUILD SUCCEEDS BUT NOTHING EVER ADVANCES
        struct Silent;
        impl Build for Silent {
            fn build(&mut self, _: &ExperimentRecord) -> Result<(), BuildError> {
                Ok(())
            }
        }

        let shutdown = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                shutdown.store(true, Ordering::Relaxed);
            });
            let wait = Duration::from_millis(10);
            let mut o = Orchestrator::new(Silent, AdvanceSignal::new(), wait, &shutdown);
            let err = o.run(&schedule(&[1]), ExperimentRange::new(1, 1)).unwrap_err();
            assert!(matches!(err, OrchestratorError::Interrupted));
            assert_eq!(o.phase(), Phase::Waiting);
        });
    }

    #[test]
    fn signal_disarmed_while_building() {
        struct Watching {
            signal: AdvanceSignal,
            seen: Vec<bool>,
        }
        impl Build for Watching {
            fn build(&mut self, _: &ExperimentRecord) -> Result<(), BuildError> {
                self.seen.push(self.signal.armed_since().is_some());
                let s = self.signal.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    s.raise(Advance::now(AdvanceReason::Done { iterations: 101 }));
                });
                Ok(())
            }
        }

        let shutdown = AtomicBool::new(false);
        let signal = AdvanceSignal::new();
        let builder = Watching { signal: signal.clone(), seen: Vec::new() };
        let wait = Duration::from_millis(10);
        let mut o = Orchestrator::new(builder, signal.clone(), wait, &shutdown);
        let before = signal.armed_since().unwrap();
        o.run(&schedule(&[1, 2]), ExperimentRange::new(1, 2)).unwrap();

        assert_eq!(o.builder.seen, vec![false, false]);
        assert!(signal.armed_since().unwrap() > before);
    }

    #[test]
    fn elapsed_ends_at_the_advance() {
        let shutdown = AtomicBool::new(false);
        let mut o = orchestrator(vec![], &shutdown);
        o.run(&schedule(&[1]), ExperimentRange::new(1, 1)).unwrap();
        let elapsed = o.log().entries()[0].elapsed;
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn stale_advance_is_discarded() {
        let shutdown = AtomicBool::new(false);
        let mut o = orchestrator(vec![], &shutdown);
        o.signal.raise(Advance::now(AdvanceReason::Stalled { waited: Duration::from_secs(61) }));
        o.run(&schedule(&[1]), ExperimentRange::new(1, 1)).unwrap();
        assert_eq!(o.log().entries()[0].outcome, Outcome::Done { iterations: 101 });
    }
}
