// HILBENCH EXPERIMENT SCHEDULE
// ONE CSV ROW PER EXPERIMENT, HEADERS AS EXPORTED FROM THE PLANNING SHEET.
// READ ONCE AT START, IMMUTABLE AFTERWARDS.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::{de, Deserialize, Deserializer};

use crate::error::ScheduleError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExperimentRecord {
    #[serde(rename = "experiment number", deserialize_with = "whole")]
    pub number: u32,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(rename = "benchmark series", default)]
    pub series: Option<String>,
    #[serde(rename = "benchmark configuration", default)]
    pub benchmarks: Option<String>,
    #[serde(rename = "disable cache", default, deserialize_with = "flag")]
    pub disable_cache: bool,
    #[serde(rename = "enable mmu", default, deserialize_with = "flag")]
    pub enable_mmu: bool,
    #[serde(rename = "enable screen", default, deserialize_with = "flag")]
    pub enable_screen: bool,
    #[serde(rename = "no cache management", default, deserialize_with = "flag")]
    pub no_cache_mgmt: bool,
    #[serde(rename = "synbench datasize", default, deserialize_with = "opt_whole")]
    pub datasize: Option<u64>,
    #[serde(rename = "experiment label", default)]
    pub label: Option<String>,
    #[serde(rename = "pmu core 0", default)]
    pub pmu_core0: Option<String>,
    #[serde(rename = "pmu core 1", default)]
    pub pmu_core1: Option<String>,
    #[serde(rename = "pmu core 2", default)]
    pub pmu_core2: Option<String>,
    #[serde(rename = "pmu core 3", default)]
    pub pmu_core3: Option<String>,
    #[serde(rename = "disparity inputsize", default, deserialize_with = "opt_whole")]
    pub disparity_inputsize: Option<u64>,
    #[serde(rename = "bsort inputsize", default, deserialize_with = "opt_whole")]
    pub bsort_inputsize: Option<u64>,
    #[serde(rename = "matmult inputsize", default, deserialize_with = "opt_whole")]
    pub matmult_inputsize: Option<u64>,
    #[serde(rename = "tick rate hz", default, deserialize_with = "opt_whole")]
    pub tick_rate_hz: Option<u64>,
}

impl ExperimentRecord {
    pub fn pmu_cores(&self) -> [Option<&str>; 4] {
        [
            self.pmu_core0.as_deref(),
            self.pmu_core1.as_deref(),
            self.pmu_core2.as_deref(),
            self.pmu_core3.as_deref(),
        ]
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }
}

/// Half-open range `[begin, begin + count)` over experiment numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentRange {
    pub begin: u32,
    pub count: u32,
}

impl ExperimentRange {
    pub fn new(begin: u32, count: u32) -> Self {
        Self { begin, count }
    }

    pub fn contains(&self, number: u32) -> bool {
        number >= self.begin && number - self.begin < self.count
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    records: Vec<ExperimentRecord>,
}

impl Schedule {
    pub fn new(records: Vec<ExperimentRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> Result<Self, ScheduleError> {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(path)
            .map_err(|source| ScheduleError::Read { path: path.to_path_buf(), source })?;
        Self::collect(reader)
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, ScheduleError> {
        Self::collect(ReaderBuilder::new().trim(Trim::All).from_reader(rdr))
    }

    fn collect<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, ScheduleError> {
        let mut records = Vec::new();
        for (idx, row) in reader.deserialize().enumerate() {
            // +2: ONE FOR THE HEADER, ONE FOR 1-BASED ROWS
            let record = row.map_err(|source| ScheduleError::Row { row: idx + 2, source })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ExperimentRecord] {
        &self.records
    }

    pub fn in_range(&self, range: ExperimentRange) -> impl Iterator<Item = &ExperimentRecord> {
        self.records.iter().filter(move |r| range.contains(r.number))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// SPREADSHEET EXPORTS WRITE INTEGER COLUMNS WITH GAPS AS FLOATS ("64.0")
fn parse_whole(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

fn whole<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw = String::deserialize(d)?;
    parse_whole(raw.trim())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("not an experiment number: {raw:?}")))
}

fn opt_whole<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("nan") => Ok(None),
        Some(raw) => parse_whole(raw.trim())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("not a whole number: {raw:?}"))),
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "0.0" | "false" | "no" | "n" => Ok(false),
        "1" | "1.0" | "true" | "yes" | "y" => Ok(true),
        _ => Err(de::Error::custom(format!("not a boolean: {raw:?}"))),
    }
}
