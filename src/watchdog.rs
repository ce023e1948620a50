// HILBENCH RESET WATCHDOG
// CONTROL THREAD: POLLS INGESTOR PROGRESS ON A FIXED CADENCE, DECIDES DONE OR
// STALLED (policy.rs), RESETS THE TARGET AND HANDS THE OUTCOME TO THE
// ORCHESTRATOR.
//
// A RESET THAT CANNOT BE SENT IS LOGGED AND THE ADVANCE IS STILL RAISED:
// THE CAMPAIGN MOVES ON AND THE TARGET MAY NEED A HAND RESET.
//
// NO DECISIONS WHILE THE AdvanceSignal IS DISARMED. THE STALL CLOCK STARTS
// OVER AT EACH ARMING.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::WatchdogConfig;
use crate::error::{ChannelError, WorkerError};
use crate::policy::{should_report_wait, Assessment, Decider};
use crate::progress::Progress;
use crate::serial::{Open, SerialChannel};
use crate::signal::{Advance, AdvanceReason, AdvanceSignal, StopFlag};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    pub ticks: u64,
    pub done: u64,
    pub stalled: u64,
    pub reset_failures: u64,
}

pub struct ResetWatchdog {
    stop: StopFlag,
    handle: Option<JoinHandle<WatchdogStats>>,
}

impl ResetWatchdog {
    pub fn start<O>(
        opener: O,
        progress: Progress,
        signal: AdvanceSignal,
        config: &WatchdogConfig,
    ) -> Result<Self, WorkerError>
    where
        O: Open + 'static,
    {
        let stop = StopFlag::new();
        let worker = WatchdogLoop {
            opener,
            control: None,
            progress,
            signal,
            stop: stop.clone(),
            config: config.clone(),
            stats: WatchdogStats::default(),
        };
        let handle = std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || worker.run())
            .map_err(|source| WorkerError::Spawn { name: "watchdog", source })?;

        tracing::info!(
            min_observations = config.min_observations,
            timeout_s = config.stall_timeout.as_secs_f64(),
            "WATCHDOG STARTED"
        );
        Ok(Self { stop, handle: Some(handle) })
    }

    /// Stop polling and release the control channel. Returns within one poll slice.
    pub fn stop(mut self) -> Result<WatchdogStats, WorkerError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<WatchdogStats, WorkerError> {
        self.stop.raise();
        match self.handle.take() {
            Some(h) => h.join().map_err(|_| WorkerError::Panicked("watchdog")),
            None => Ok(WatchdogStats::default()),
        }
    }
}

impl Drop for ResetWatchdog {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

struct WatchdogLoop<O: Open> {
    opener: O,
    control: Option<SerialChannel<O::Port>>,
    progress: Progress,
    signal: AdvanceSignal,
    stop: StopFlag,
    config: WatchdogConfig,
    stats: WatchdogStats,
}

impl<O: Open> WatchdogLoop<O> {
    fn run(mut self) -> WatchdogStats {
        // CONNECT EARLY SO A MISWIRED RESET BOARD SHOWS UP AT START, NOT AT THE FIRST RESET
        if let Err(e) = self.connect() {
            tracing::warn!(error = %e, "CONTROL CHANNEL UNAVAILABLE, WILL RETRY AT RESET");
        }

        let mut decider = Decider::new(
            self.config.min_observations,
            self.config.stall_timeout,
            Instant::now(),
        );
        let mut prev_wait = Duration::ZERO;
        let mut window: Option<Instant> = None;

        while !self.stop.sleep(self.config.poll_interval) {
            self.stats.ticks += 1;

            // DISARMED: THE NEXT IMAGE IS BEING BUILT, NOTHING TO JUDGE
            let Some(since) = self.signal.armed_since() else {
                if window.take().is_some() {
                    tracing::debug!("WATCHDOG PAUSED");
                }
                continue;
            };
            if window != Some(since) {
                tracing::debug!("WATCHDOG ARMED");
                decider.rearm(since);
                window = Some(since);
                prev_wait = Duration::ZERO;
            }

            let snapshot = self.progress.snapshot();
            let now = Instant::now();

            match decider.evaluate(&snapshot, now) {
                Assessment::Progressing { iteration } => {
                    tracing::debug!(iteration, "PROGRESS OK");
                    prev_wait = Duration::ZERO;
                }
                Assessment::Waiting { stalled_for } => {
                    if should_report_wait(prev_wait, stalled_for) {
                        tracing::info!("WAITING {} SECS", stalled_for.as_secs());
                    }
                    prev_wait = stalled_for;
                }
                Assessment::Done { iterations } => {
                    tracing::info!(iterations, "ENOUGH OBSERVATIONS");
                    self.stats.done += 1;
                    self.advance(AdvanceReason::Done { iterations });
                    decider.rearm(Instant::now());
                    prev_wait = Duration::ZERO;
                }
                Assessment::Stalled { waited } => {
                    tracing::warn!(secs = waited.as_secs_f64(), "STALL TIMEOUT REACHED");
                    self.stats.stalled += 1;
                    self.advance(AdvanceReason::Stalled { waited });
                    decider.rearm(Instant::now());
                    prev_wait = Duration::ZERO;
                }
            }
        }

        tracing::info!(
            done = self.stats.done,
            stalled = self.stats.stalled,
            "WATCHDOG STOPPED"
        );
        self.stats
    }

    fn connect(&mut self) -> Result<(), ChannelError> {
        if self.control.is_none() {
            let port = self.opener.open()?;
            tracing::info!(tty = self.opener.name(), "CONTROL CONNECTED");
            self.control = Some(SerialChannel::new(port));
        }
        Ok(())
    }

    fn send_reset(&mut self) -> Result<(), ChannelError> {
        self.connect()?;
        let command = [self.config.reset_command];
        match self.control.as_mut() {
            Some(ch) => ch.write(&command),
            None => Err(ChannelError::Closed),
        }
    }

    // INIT FIRST: NOTHING FROM THE RUN BEING ENDED MAY LEAK INTO THE NEXT ONE
    fn advance(&mut self, reason: AdvanceReason) {
        self.progress.force_init();

        match self.send_reset() {
            Ok(()) => tracing::info!(reason = reason.label(), "TARGET RESET"),
            Err(e) => {
                self.stats.reset_failures += 1;
                self.control = None;
                tracing::error!(error = %e, "RESET NOT SENT, TARGET MAY NEED A MANUAL RESET");
            }
        }

        if let Some(prev) = self.signal.raise(Advance::now(reason)) {
            tracing::debug!(reason = prev.reason.label(), "REPLACED UNCONSUMED ADVANCE");
        }
    }
}
