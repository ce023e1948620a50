// HILBENCH RUN LOG
// ONE ENTRY PER SCHEDULED EXPERIMENT: HOW IT ENDED AND HOW LONG IT TOOK.
// DUMPED AND SUMMARIZED AT EXIT.

use std::time::Duration;

use crate::schedule::ExperimentRecord;
use crate::signal::AdvanceReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done { iterations: u64 },
    Stalled { waited: Duration },
    BuildFailed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Done { .. } => "DONE",
            Self::Stalled { .. } => "STALLED",
            Self::BuildFailed => "BUILD_FAILED",
        }
    }
}

impl From<AdvanceReason> for Outcome {
    fn from(reason: AdvanceReason) -> Self {
        match reason {
            AdvanceReason::Done { iterations } => Self::Done { iterations },
            AdvanceReason::Stalled { waited } => Self::Stalled { waited },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub number: u32,
    pub label: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<Entry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &ExperimentRecord, outcome: Outcome, elapsed: Duration) {
        self.entries.push(Entry {
            number: record.number,
            label: record.display_label().to_string(),
            outcome,
            elapsed,
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    // (DONE, STALLED, BUILD_FAILED)
    pub fn counts(&self) -> (usize, usize, usize) {
        self.entries.iter().fold((0, 0, 0), |(d, s, b), e| match e.outcome {
            Outcome::Done { .. } => (d + 1, s, b),
            Outcome::Stalled { .. } => (d, s + 1, b),
            Outcome::BuildFailed => (d, s, b + 1),
        })
    }

    // FULL TABLE, ONE ROW PER EXPERIMENT
    pub fn dump(&self) {
        if self.entries.is_empty() {
            return;
        }

        println!(
            "\n{:<6} {:<14} {:<12} {:>10}  {}",
            "EXP", "OUTCOME", "DETAIL", "ELAPSED_S", "LABEL"
        );
        println!("{}", "-".repeat(72));
        for e in &self.entries {
            let detail = match e.outcome {
                Outcome::Done { iterations } => format!("{iterations} it"),
                Outcome::Stalled { waited } => format!("{:.0}s idle", waited.as_secs_f64()),
                Outcome::BuildFailed => "-".to_string(),
            };
            println!(
                "{:<6} {:<14} {:<12} {:>10.1}  {}",
                e.number,
                e.outcome.label(),
                detail,
                e.elapsed.as_secs_f64(),
                e.label
            );
        }
        println!("TOTAL EXPERIMENTS: {}", self.entries.len());
    }

    pub fn summary(&self) {
        let (done, stalled, failed) = self.counts();
        let total: Duration = self.entries.iter().map(|e| e.elapsed).sum();
        let iterations: u64 = self
            .entries
            .iter()
            .map(|e| match e.outcome {
                Outcome::Done { iterations } => iterations,
                _ => 0,
            })
            .sum();

        println!("\n{}", "=".repeat(50));
        println!("HILBENCH SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  EXPERIMENTS:       {}", self.entries.len());
        println!("  DONE:              {}", done);
        println!("  STALLED:           {}", stalled);
        println!("  BUILD FAILED:      {}", failed);
        println!("  ITERATIONS:        {}", iterations);
        println!("  ELAPSED:           {:.1}s", total.as_secs_f64());
    }
}
