// HILBENCH FIRMWARE BUILD
// EXTERNAL COLLABORATOR: TURN ONE SCHEDULE ROW INTO AN INSTALLED IMAGE.
//
// MAKE PIPELINE (RUN IN THE FIRMWARE TREE):
//   1. make clean
//   2. m4 <DEFINES> benchmark_config.m4 > benchmark_config.h
//   3. make <VARS> install
//
// A STEP THAT RUNS AND FAILS SKIPS THE RECORD. A TREE OR TOOL THAT IS NOT
// THERE AT ALL ABORTS THE CAMPAIGN: EVERY LATER RECORD WOULD FAIL THE SAME WAY.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::BuildError;
use crate::schedule::ExperimentRecord;

pub const M4_TEMPLATE: &str = "benchmark_config.m4";
pub const CONFIG_HEADER: &str = "benchmark_config.h";
const BENCHMARK_CONFIG: &str = "-DBENCHMARK_CONFIG_M4";

// LAST LINES OF STDERR KEPT IN A FAILURE MESSAGE
const STDERR_TAIL: usize = 5;

pub trait Build {
    fn build(&mut self, record: &ExperimentRecord) -> Result<(), BuildError>;
}

impl<B: Build + ?Sized> Build for &mut B {
    fn build(&mut self, record: &ExperimentRecord) -> Result<(), BuildError> {
        (**self).build(record)
    }
}

/// Arguments derived from one record (the PREPARING step).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    pub m4_defines: Vec<String>,
    pub make_vars: Vec<String>,
}

// m4 CHOKES ON QUOTED ARGUMENTS; THE SHEET QUOTES SELECTORS LIKE 'bsort'
fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix('\'').unwrap_or(s);
    s.strip_suffix('\'').unwrap_or(s)
}

impl BuildParams {
    pub fn from_record(record: &ExperimentRecord) -> Self {
        let mut m4 = Vec::new();
        let mut make = Vec::new();

        if let Some(series) = &record.series {
            m4.push(format!("-Dconfig_series={}", strip_quotes(series)));
        }
        if let Some(bench) = &record.benchmarks {
            m4.push(format!("-Dconfig_benchmarks={}", strip_quotes(bench)));
        }
        if let Some(label) = &record.label {
            m4.push(format!("-Dexp_label={label}"));
        }
        if record.enable_mmu {
            m4.push("-Dmmu_enable".to_string());
        }
        if record.enable_screen {
            m4.push("-Dscreen_enable".to_string());
        }
        if let Some(n) = record.disparity_inputsize {
            m4.push(format!("-Ddisparity_inputsize={n}"));
        }
        if let Some(n) = record.bsort_inputsize {
            m4.push(format!("-Dbsort_inputsize={n}"));
        }
        if let Some(n) = record.matmult_inputsize {
            m4.push(format!("-Dmatmult_inputsize={n}"));
        }
        if let Some(hz) = record.tick_rate_hz {
            m4.push(format!("-Dtick_rate_hz={hz}"));
        }
        for (core, pmu) in record.pmu_cores().into_iter().enumerate() {
            if let Some(pmu) = pmu {
                m4.push(format!("-Dpmu_core{core}={}", strip_quotes(pmu)));
            }
        }

        if record.no_cache_mgmt {
            make.push("NO_CACHE_MGMT=-DNO_CACHE_MGMT".to_string());
        }
        if let Some(n) = record.datasize {
            make.push(format!("SYNBENCH_DATASIZE=-DSYNBENCH_DATASIZE={n}"));
        }
        make.push(format!("BENCHMARK_CONFIG={BENCHMARK_CONFIG}"));

        Self { m4_defines: m4, make_vars: make }
    }
}

pub struct MakeBuild {
    working_dir: PathBuf,
}

impl MakeBuild {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into() }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The firmware tree must exist and carry the config template.
    pub fn check_tree(&self) -> Result<(), BuildError> {
        if !self.working_dir.is_dir() {
            return Err(BuildError::Environment(format!(
                "working directory {} does not exist",
                self.working_dir.display()
            )));
        }
        let template = self.working_dir.join(M4_TEMPLATE);
        if !template.is_file() {
            return Err(BuildError::Environment(format!("{} not found", template.display())));
        }
        Ok(())
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.working_dir)
            .env("BENCHMARK_CONFIG", BENCHMARK_CONFIG);
        cmd
    }

    fn step(&self, step: &'static str, cmd: &mut Command) -> Result<String, BuildError> {
        tracing::debug!(step, cmd = ?cmd, "RUNNING");
        let output = cmd.output().map_err(|e| spawn_error(step, e))?;
        check_output(step, output)
    }
}

impl Build for MakeBuild {
    fn build(&mut self, record: &ExperimentRecord) -> Result<(), BuildError> {
        self.check_tree()?;
        let params = BuildParams::from_record(record);

        tracing::info!("RUN MAKE CLEAN");
        let out = self.step("make clean", self.command("make").arg("clean"))?;
        log_lines(&out);

        tracing::info!(defines = ?params.m4_defines, "WRITING {CONFIG_HEADER}");
        let header = self.step(
            "m4",
            self.command("m4").args(&params.m4_defines).arg(M4_TEMPLATE),
        )?;
        std::fs::write(self.working_dir.join(CONFIG_HEADER), header).map_err(|e| {
            BuildError::Failed { step: "write header", message: e.to_string() }
        })?;

        tracing::info!(vars = ?params.make_vars, "PERFORMING COMPILATION");
        let out = self.step(
            "make install",
            self.command("make").args(&params.make_vars).arg("install"),
        )?;
        log_lines(&out);
        Ok(())
    }
}

fn spawn_error(step: &'static str, e: io::Error) -> BuildError {
    BuildError::Environment(format!("cannot run {step}: {e}"))
}

fn check_output(step: &'static str, output: Output) -> Result<String, BuildError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join(" | ");
        return Err(BuildError::Failed {
            step,
            message: format!("{} ({tail})", output.status),
        });
    }
    String::from_utf8(output.stdout).map_err(|_| BuildError::Failed {
        step,
        message: "output is not valid UTF-8".to_string(),
    })
}

fn log_lines(out: &str) {
    for line in out.lines() {
        tracing::debug!("{line}");
    }
}
