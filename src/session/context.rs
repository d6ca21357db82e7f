//! Per-process session context

use crate::telemetry::{Collective, BENCHMARK_PREROLL};
use std::time::{Duration, Instant};

/// Rank, process group and the counters a session keeps across steps
pub struct SessionContext {
    collective: Box<dyn Collective>,
    /// Steps since the last render
    pub(crate) step_counter: u32,
    /// Benchmark run step, negative during pre-roll
    pub(crate) run_step: i64,
    pub(crate) last_notify: Option<Instant>,
    pub(crate) simulation_time: Duration,
    pub(crate) drawing_time: Duration,
    pub(crate) cell_count: u64,
    pub(crate) particle_count: u64,
    /// Whether at least one frame was rendered
    pub(crate) has_rendered: bool,
}

impl SessionContext {
    pub fn new(collective: Box<dyn Collective>) -> Self {
        Self {
            collective,
            step_counter: 0,
            run_step: BENCHMARK_PREROLL,
            last_notify: None,
            simulation_time: Duration::ZERO,
            drawing_time: Duration::ZERO,
            cell_count: 0,
            particle_count: 0,
            has_rendered: false,
        }
    }

    pub fn rank(&self) -> u32 {
        self.collective.rank()
    }

    pub fn size(&self) -> u32 {
        self.collective.size()
    }

    /// Whether this is the coordinating process
    pub fn is_root(&self) -> bool {
        self.collective.is_root()
    }

    pub fn collective(&self) -> &dyn Collective {
        self.collective.as_ref()
    }

    pub fn run_step(&self) -> i64 {
        self.run_step
    }

    pub fn cell_count(&self) -> u64 {
        self.cell_count
    }

    pub fn particle_count(&self) -> u64 {
        self.particle_count
    }

    /// Duration of the last render
    pub fn drawing_time(&self) -> Duration {
        self.drawing_time
    }

    /// Time between the previous two notifications
    pub fn simulation_time(&self) -> Duration {
        self.simulation_time
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .field("step_counter", &self.step_counter)
            .field("run_step", &self.run_step)
            .field("has_rendered", &self.has_rendered)
            .finish()
    }
}
