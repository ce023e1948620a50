// HILBENCH CROSS-THREAD SIGNALS
// StopFlag:      MAIN -> BACKGROUND LOOPS ("EXIT WITHIN ONE CYCLE")
// AdvanceSignal: WATCHDOG -> ORCHESTRATOR ("THIS EXPERIMENT IS OVER")
//                ORCHESTRATOR -> WATCHDOG ("THE CURRENT IMAGE IS RUNNING SINCE T")
//
// THE WATCHDOG ONLY JUDGES WHILE ARMED. THE ORCHESTRATOR DISARMS FOR
// PREPARING/BUILDING AND RE-ARMS WHEN WAITING BEGINS, SO A LONG BUILD NEVER
// COUNTS AGAINST THE STALL TIMEOUT AND NO RESET LANDS MID-BUILD.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// LONGEST UNINTERRUPTIBLE SLEEP IN ANY LOOP
const NAP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleep for `dur` in short slices. Returns true if stop was raised meanwhile.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if self.is_raised() {
                return true;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            std::thread::sleep(left.min(NAP_SLICE));
        }
    }
}

/// Why the watchdog ended an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    Done { iterations: u64 },
    Stalled { waited: Duration },
}

impl AdvanceReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Done { .. } => "DONE",
            Self::Stalled { .. } => "STALLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub reason: AdvanceReason,
    pub at: Instant,
}

impl Advance {
    pub fn now(reason: AdvanceReason) -> Self {
        Self {
            reason,
            at: Instant::now(),
        }
    }
}

/// Single-slot handoff. Raising while a value is pending replaces it.
///
/// Also carries the arming window: `Some(since)` while an experiment is being
/// observed, `None` while the next image is prepared. A new signal is armed.
#[derive(Debug, Clone)]
pub struct AdvanceSignal {
    inner: Arc<(Mutex<Option<Advance>>, Condvar)>,
    armed: Arc<Mutex<Option<Instant>>>,
}

impl Default for AdvanceSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvanceSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            armed: Arc::new(Mutex::new(Some(Instant::now()))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Advance>> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window(&self) -> MutexGuard<'_, Option<Instant>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a fresh observation window starting now.
    pub fn arm(&self) -> Instant {
        let now = Instant::now();
        *self.window() = Some(now);
        now
    }

    pub fn disarm(&self) {
        *self.window() = None;
    }

    pub fn armed_since(&self) -> Option<Instant> {
        *self.window()
    }

    /// Returns the advance that was still pending, if any.
    pub fn raise(&self, advance: Advance) -> Option<Advance> {
        let prev = self.slot().replace(advance);
        self.inner.1.notify_all();
        prev
    }

    pub fn is_raised(&self) -> bool {
        self.slot().is_some()
    }

    /// Take and clear the pending advance without waiting.
    pub fn take(&self) -> Option<Advance> {
        self.slot().take()
    }

    /// Wait at most `timeout` for an advance, then take and clear it.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Advance> {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut guard, _) = cvar
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_interrupts_sleep() {
        let stop = StopFlag::new();
        let s = stop.clone();
        let t = std::thread::spawn(move || {
            let start = Instant::now();
            let stopped = s.sleep(Duration::from_secs(10));
            (stopped, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(50));
        stop.raise();
        let (stopped, elapsed) = t.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn sleep_runs_full_duration_without_stop() {
        let stop = StopFlag::new();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_millis(120)));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn take_clears_the_slot() {
        let sig = AdvanceSignal::new();
        assert!(sig.take().is_none());
        sig.raise(Advance::now(AdvanceReason::Done { iterations: 101 }));
        assert!(sig.is_raised());
        let adv = sig.take().unwrap();
        assert_eq!(adv.reason, AdvanceReason::Done { iterations: 101 });
        assert!(!sig.is_raised());
    }

    #[test]
    fn raise_reports_replaced_advance() {
        let sig = AdvanceSignal::new();
        assert!(sig.raise(Advance::now(AdvanceReason::Done { iterations: 5 })).is_none());
        let stalled = AdvanceReason::Stalled { waited: Duration::from_secs(61) };
        let prev = sig.raise(Advance::now(stalled));
        assert_eq!(prev.unwrap().reason, AdvanceReason::Done { iterations: 5 });
    }

    #[test]
    fn wait_wakes_on_raise_from_other_thread() {
        let sig = AdvanceSignal::new();
        let s = sig.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            s.raise(Advance::now(AdvanceReason::Done { iterations: 7 }));
        });
        let adv = sig.wait_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(adv.reason.label(), "DONE");
        assert!(!sig.is_raised());
    }

    #[test]
    fn arming_window_restarts() {
        let sig = AdvanceSignal::new();
        let first = sig.armed_since().unwrap();
        sig.disarm();
        assert!(sig.armed_since().is_none());
        std::thread::sleep(Duration::from_millis(5));
        let second = sig.arm();
        assert!(second > first);
        assert_eq!(sig.clone().armed_since(), Some(second));
    }

    #[test]
    fn wait_times_out_empty() {
        let sig = AdvanceSignal::new();
        assert!(sig.wait_timeout(Duration::from_millis(20)).is_none());
    }
}
