//! Benchmark telemetry
//!
//! Each render cycle every process measures the duration of a fixed set of
//! phases. The aggregator reduces each phase across all processes to
//! min/max/average on the coordinating process, which appends one row per
//! cycle to a CSV sink until the sample budget is exhausted.
//!
//! # Components
//!
//! - [`Phase`] - The benchmark phases in column order
//! - [`AggregatedTiming`] - One phase reduced across processes
//! - [`BenchmarkSink`] - Buffered CSV writer
//! - [`TelemetryAggregator`] - Budget, row bookkeeping and the collective calls
//! - [`Collective`] - The gather primitive the reduction is built on

pub mod collective;

pub use collective::{Collective, LocalCollective, SoloCollective, ROOT_RANK};

use crate::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rows written before the benchmark sink closes
pub const BENCHMARK_SAMPLE_BUDGET: u32 = 1440;

/// Initial value of the benchmark run-step counter; rows are written from
/// run step 0 on, so the first ten render cycles warm up
pub const BENCHMARK_PREROLL: i64 = -10;

/// A measured phase of one render cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Simulation,
    Visualization,
    Kernel,
    Merge,
    VideoSend,
    Copy,
    Sorting,
    Buffer,
    Advection,
    AdvectionBorder,
    OptimizationBuffer,
}

impl Phase {
    /// All phases in CSV column order
    pub const ALL: [Phase; 11] = [
        Phase::Simulation,
        Phase::Visualization,
        Phase::Kernel,
        Phase::Merge,
        Phase::VideoSend,
        Phase::Copy,
        Phase::Sorting,
        Phase::Buffer,
        Phase::Advection,
        Phase::AdvectionBorder,
        Phase::OptimizationBuffer,
    ];

    /// Column label
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Simulation => "sim",
            Phase::Visualization => "vis",
            Phase::Kernel => "kernel",
            Phase::Merge => "merge",
            Phase::VideoSend => "videoSend",
            Phase::Copy => "copy",
            Phase::Sorting => "sorting",
            Phase::Buffer => "buffer",
            Phase::Advection => "advection",
            Phase::AdvectionBorder => "advectionBorder",
            Phase::OptimizationBuffer => "optimizationBuffer",
        }
    }
}

/// One phase duration measured on one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSample {
    pub phase: Phase,
    pub micros: u64,
}

impl TimingSample {
    pub fn new(phase: Phase, micros: u64) -> Self {
        Self { phase, micros }
    }
}

/// One phase reduced across all processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTiming {
    pub phase: Phase,
    pub min: u64,
    pub max: u64,
    /// Integer mean, truncated
    pub average: u64,
}

impl AggregatedTiming {
    /// Reduce the gathered values; `None` for an empty set
    pub fn from_values(phase: Phase, values: &[u64]) -> Option<Self> {
        let min = *values.iter().min()?;
        let max = *values.iter().max()?;
        let sum: u128 = values.iter().map(|&v| v as u128).sum();
        let average = (sum / values.len() as u128) as u64;
        Some(Self {
            phase,
            min,
            max,
            average,
        })
    }
}

/// CSV header line (without newline)
pub fn csv_header() -> String {
    let mut header = String::from("Timestep");
    for phase in Phase::ALL {
        let p = phase.label();
        let _ = write!(header, ",min-{p},max-{p},average-{p}");
    }
    header
}

/// Buffered CSV writer for benchmark rows
pub struct BenchmarkSink {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    rows_written: u32,
}

impl BenchmarkSink {
    /// Create (truncate) the file and write the header
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create benchmark file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", csv_header())?;
        info!(
            "Benchmark sink opened: {:?} (started {})",
            path,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }

    /// Append one row: run step followed by min,max,average per phase
    pub fn write_row(&mut self, run_step: i64, timings: &[AggregatedTiming]) -> Result<()> {
        let Some(ref mut writer) = self.writer else {
            return Ok(());
        };
        let mut row = run_step.to_string();
        for t in timings {
            let _ = write!(row, ",{},{},{}", t.min, t.max, t.average);
        }
        writeln!(writer, "{}", row)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u32 {
        self.rows_written
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close; later writes are ignored
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush benchmark file {:?}: {}", self.path, e);
            }
            info!(
                "Benchmark sink closed after {} rows: {:?}",
                self.rows_written, self.path
            );
        }
    }
}

impl Drop for BenchmarkSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Collects per-cycle phase timings and writes the aggregated rows
///
/// Active only when a sink path is configured. Every process runs an
/// aggregator with the same configuration so the collective calls match;
/// only the coordinating process opens the sink.
pub struct TelemetryAggregator {
    sink: Option<BenchmarkSink>,
    active: bool,
    rows: u32,
    budget: u32,
}

impl TelemetryAggregator {
    /// `path` is the benchmark file; `None` leaves the aggregator inactive
    pub fn new(rank: u32, path: Option<&Path>, budget: u32) -> Self {
        let Some(path) = path else {
            return Self::inactive();
        };

        let sink = if rank == ROOT_RANK {
            match BenchmarkSink::create(path) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    // keep aggregating so peers' gathers still have a partner
                    warn!("Benchmark rows will be discarded: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            sink,
            active: budget > 0,
            rows: 0,
            budget,
        }
    }

    /// An aggregator that never records
    pub fn inactive() -> Self {
        Self {
            sink: None,
            active: false,
            rows: 0,
            budget: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Rows recorded so far (counted on every process)
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Gather one phase and reduce it; `Some` on the coordinating process only
    pub fn record(
        &self,
        collective: &dyn Collective,
        phase: Phase,
        micros: u64,
    ) -> Result<Option<AggregatedTiming>> {
        if !self.active {
            return Ok(None);
        }
        let gathered = collective.gather(micros)?;
        Ok(gathered.and_then(|values| AggregatedTiming::from_values(phase, &values)))
    }

    /// Record one benchmark row
    ///
    /// Phases absent from `samples` count as zero. Returns whether a row was
    /// recorded; pre-roll steps (`run_step < 0`) and calls after the budget
    /// is exhausted are no-ops.
    pub fn record_step(
        &mut self,
        collective: &dyn Collective,
        run_step: i64,
        samples: &[TimingSample],
    ) -> Result<bool> {
        if !self.active || run_step < 0 {
            return Ok(false);
        }

        let mut aggregated = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let micros = samples
                .iter()
                .find(|s| s.phase == phase)
                .map(|s| s.micros)
                .unwrap_or(0);
            if let Some(timing) = self.record(collective, phase, micros)? {
                aggregated.push(timing);
            }
        }

        if let Some(ref mut sink) = self.sink {
            // counted whether or not the write lands, like every peer does
            if let Err(e) = sink.write_row(run_step, &aggregated) {
                warn!("Benchmark row for run step {} discarded: {}", run_step, e);
            }
        }
        self.rows += 1;
        debug!("Benchmark row {} recorded (run step {})", self.rows, run_step);

        if self.rows >= self.budget {
            self.close();
        }
        Ok(true)
    }

    /// Stop aggregating and close the sink; idempotent
    pub fn close(&mut self) {
        self.active = false;
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_aggregate_truncates_average() {
        let t = AggregatedTiming::from_values(Phase::Kernel, &[1, 2]).unwrap();
        assert_eq!((t.min, t.max, t.average), (1, 2, 1));
        assert!(AggregatedTiming::from_values(Phase::Kernel, &[]).is_none());
    }

    #[test]
    fn test_header_columns() {
        let header = csv_header();
        assert!(header.starts_with("Timestep,min-sim,max-sim,average-sim,min-vis"));
        assert!(header.ends_with("average-optimizationBuffer"));
        assert_eq!(header.split(',').count(), 1 + 3 * Phase::ALL.len());
    }

    #[test]
    fn test_inactive_without_path() {
        let mut agg = TelemetryAggregator::new(0, None, BENCHMARK_SAMPLE_BUDGET);
        assert!(!agg.is_active());
        assert!(!agg.record_step(&SoloCollective, 0, &[]).unwrap());
    }

    #[test]
    fn test_preroll_rows_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.csv");
        let mut agg = TelemetryAggregator::new(0, Some(&path), 4);
        assert!(!agg.record_step(&SoloCollective, BENCHMARK_PREROLL, &[]).unwrap());
        assert!(agg.record_step(&SoloCollective, 0, &[]).unwrap());
        assert_eq!(agg.rows(), 1);
    }

    #[test]
    fn test_budget_closes_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.csv");
        let mut agg = TelemetryAggregator::new(0, Some(&path), 2);
        let samples = [
            TimingSample::new(Phase::Simulation, 100),
            TimingSample::new(Phase::Visualization, 40),
        ];
        for step in 0..5 {
            agg.record_step(&SoloCollective, step, &samples).unwrap();
        }
        assert!(!agg.is_active());
        assert_eq!(agg.rows(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,100,100,100,40,40,40,0,0,0"));
        assert!(lines[2].starts_with("1,"));
    }

    #[test]
    fn test_unwritable_sink_keeps_aggregating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("bench.csv");
        let mut agg = TelemetryAggregator::new(0, Some(&path), 3);
        assert!(agg.is_active());
        assert!(agg.record_step(&SoloCollective, 0, &[]).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_still_counts_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.csv");
        File::create(&path).unwrap();
        // unbuffered writes to a read-only handle fail on every row
        let sink = BenchmarkSink {
            writer: Some(BufWriter::with_capacity(0, File::open(&path).unwrap())),
            path: path.clone(),
            rows_written: 0,
        };
        let mut agg = TelemetryAggregator {
            sink: Some(sink),
            active: true,
            rows: 0,
            budget: 2,
        };

        assert!(agg.record_step(&SoloCollective, 0, &[]).unwrap());
        assert_eq!(agg.rows(), 1);
        assert!(agg.is_active());
        assert!(agg.record_step(&SoloCollective, 1, &[]).unwrap());
        assert_eq!(agg.rows(), 2);
        assert!(!agg.is_active());
    }
}
