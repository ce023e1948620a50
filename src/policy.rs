// HILBENCH ADVANCEMENT POLICY
// PURE-RUST MODULE: NO THREADS, NO CHANNELS, CLOCK INJECTED BY THE CALLER
// SHARED BETWEEN watchdog.rs AND THE OFFLINE TESTS
//
// EACH TICK:
//   HEALTHY   -> STALL CLOCK RESTARTS. DONE ONCE last_iteration > min_observations.
//   UNHEALTHY -> STALL CLOCK RUNS. STALLED ONCE IT EXCEEDS THE TIMEOUT.

use std::time::{Duration, Instant};

use crate::progress::ProgressSnapshot;

// STALL PROGRESS IS REPORTED ON THIS CADENCE
pub const WAIT_REPORT_EVERY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Progressing { iteration: u64 },
    Waiting { stalled_for: Duration },
    Done { iterations: u64 },
    Stalled { waited: Duration },
}

impl Assessment {
    pub fn ends_experiment(self) -> bool {
        matches!(self, Self::Done { .. } | Self::Stalled { .. })
    }
}

/// Stateless core of the decision.
pub fn assess(
    snapshot: &ProgressSnapshot,
    stalled_for: Duration,
    min_observations: u64,
    stall_timeout: Duration,
) -> Assessment {
    if snapshot.healthy {
        if snapshot.last_iteration > min_observations {
            Assessment::Done { iterations: snapshot.last_iteration }
        } else {
            Assessment::Progressing { iteration: snapshot.last_iteration }
        }
    } else if stalled_for > stall_timeout {
        Assessment::Stalled { waited: stalled_for }
    } else {
        Assessment::Waiting { stalled_for }
    }
}

/// Stall clock plus thresholds.
#[derive(Debug, Clone)]
pub struct Decider {
    min_observations: u64,
    stall_timeout: Duration,
    last_healthy: Instant,
}

impl Decider {
    pub fn new(min_observations: u64, stall_timeout: Duration, now: Instant) -> Self {
        Self {
            min_observations,
            stall_timeout,
            last_healthy: now,
        }
    }

    pub fn evaluate(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> Assessment {
        if snapshot.healthy {
            self.last_healthy = now;
        }
        let stalled_for = now.saturating_duration_since(self.last_healthy);
        assess(snapshot, stalled_for, self.min_observations, self.stall_timeout)
    }

    /// Restart the stall clock after a reset.
    pub fn rearm(&mut self, now: Instant) {
        self.last_healthy = now;
    }
}

/// True when the stall clock crossed a report boundary between two ticks.
pub fn should_report_wait(prev: Duration, now: Duration) -> bool {
    let every = WAIT_REPORT_EVERY.as_secs().max(1);
    now.as_secs() / every > prev.as_secs() / every
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(n: u64) -> ProgressSnapshot {
        ProgressSnapshot { last_iteration: n, healthy: true, consecutive_unmatched: 0 }
    }

    #[test]
    fn done_requires_strictly_more_than_min() {
        let t = Duration::from_secs(60);
        let at_min = assess(&healthy(100), Duration::ZERO, 100, t);
        assert_eq!(at_min, Assessment::Progressing { iteration: 100 });
        let past_min = assess(&healthy(101), Duration::ZERO, 100, t);
        assert_eq!(past_min, Assessment::Done { iterations: 101 });
    }

    #[test]
    fn unhealthy_iteration_count_is_ignored() {
        // A STALE COUNT ON AN UNHEALTHY SNAPSHOT NEVER COUNTS AS DONE
        let snap = ProgressSnapshot {
            last_iteration: 500,
            healthy: false,
            consecutive_unmatched: 0,
        };
        let a = assess(&snap, Duration::from_secs(1), 100, Duration::from_secs(60));
        assert_eq!(a, Assessment::Waiting { stalled_for: Duration::from_secs(1) });
    }

    #[test]
    fn report_boundaries() {
        assert!(!should_report_wait(Duration::from_secs(8), Duration::from_secs(9)));
        assert!(should_report_wait(Duration::from_secs(9), Duration::from_secs(10)));
        assert!(!should_report_wait(Duration::from_secs(10), Duration::from_secs(11)));
        assert!(should_report_wait(Duration::from_millis(19_900), Duration::from_millis(20_100)));
    }
}
