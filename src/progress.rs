// HILBENCH TELEMETRY VALIDATION
// PURE STATE MACHINE: ZERO I/O, TESTABLE OFFLINE
//
// INIT      iteration=0, NOT HEALTHY
// TRACKING  iteration=N, HEALTHY
//
// A LINE CARRYING "iteration: N" IS LOGICAL IF N == CUR, N == CUR + 1 OR N == 1.
// ANYTHING ELSE IS CORRUPTION AND DROPS BACK TO INIT WITHOUT PERSISTING THE LINE.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use regex::Regex;

pub const ITERATION_PATTERN: &str = r"iteration: ([0-9]+)";

fn iteration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ITERATION_PATTERN).expect("static iteration pattern"))
}

/// Extract the iteration number from a telemetry line, if it carries one.
///
/// A match whose digits overflow `u64` is treated as no match.
pub fn parse_iteration(line: &str) -> Option<u64> {
    iteration_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Copy of the ingestor's progress, handed to the watchdog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub last_iteration: u64,
    pub healthy: bool,
    pub consecutive_unmatched: u32,
}

/// What the state machine made of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Logical iteration. The raw line belongs in the log.
    Accepted(u64),
    /// Non-logical jump. State dropped to INIT.
    Corrupt(u64),
    /// No iteration in the line. `tracking` is the state after counting it.
    Unmatched { tracking: bool },
    /// Too many unmatched lines in a row. State dropped to INIT.
    Desynced,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Self::Accepted(_) => "ACCEPT",
            Self::Corrupt(_) => "CORRUPT",
            Self::Unmatched { .. } => "NOMATCH",
            Self::Desynced => "DESYNC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tracker {
    state: ProgressSnapshot,
    unmatched_threshold: u32,
}

impl Tracker {
    pub fn new(unmatched_threshold: u32) -> Self {
        Self {
            state: ProgressSnapshot::default(),
            unmatched_threshold,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state.healthy
    }

    pub fn is_logical(&self, iteration: u64) -> bool {
        let cur = self.state.last_iteration;
        iteration == cur || iteration == cur.saturating_add(1) || iteration == 1
    }

    pub fn observe(&mut self, line: &str) -> Verdict {
        match parse_iteration(line) {
            Some(n) => self.observe_iteration(n),
            None => self.observe_unmatched(),
        }
    }

    pub fn observe_iteration(&mut self, iteration: u64) -> Verdict {
        if self.is_logical(iteration) {
            self.state = ProgressSnapshot {
                last_iteration: iteration,
                healthy: true,
                consecutive_unmatched: 0,
            };
            Verdict::Accepted(iteration)
        } else {
            self.force_init();
            Verdict::Corrupt(iteration)
        }
    }

    // EXACTLY AT THE THRESHOLD IS STILL TOLERATED; ONE MORE DESYNCS
    pub fn observe_unmatched(&mut self) -> Verdict {
        self.state.consecutive_unmatched = self.state.consecutive_unmatched.saturating_add(1);
        if self.state.consecutive_unmatched > self.unmatched_threshold {
            self.force_init();
            Verdict::Desynced
        } else {
            Verdict::Unmatched { tracking: self.state.healthy }
        }
    }

    /// Decode or read failure on the channel.
    pub fn fault(&mut self) {
        self.force_init();
    }

    pub fn force_init(&mut self) {
        self.state = ProgressSnapshot::default();
    }
}

/// Shared handle to the tracker. Every access is one short critical section.
#[derive(Debug, Clone)]
pub struct Progress {
    inner: Arc<Mutex<Tracker>>,
}

impl Progress {
    pub fn new(unmatched_threshold: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tracker::new(unmatched_threshold))),
        }
    }

    // A PANIC WHILE HOLDING THE LOCK CANNOT LEAVE THE TRACKER HALF-WRITTEN:
    // EVERY MUTATION IS A SINGLE ASSIGNMENT OF Copy FIELDS
    fn lock(&self) -> MutexGuard<'_, Tracker> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    pub fn observe(&self, line: &str) -> Verdict {
        self.lock().observe(line)
    }

    pub fn fault(&self) {
        self.lock().fault();
    }

    pub fn force_init(&self) {
        self.lock().force_init();
    }
}
