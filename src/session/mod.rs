//! Visualization session
//!
//! [`VisSession`] is driven by the simulation once per step. It decides
//! whether the step is rendered, keeps the renderer's view of the domain
//! current, refreshes the sources, hands them to the render pipeline and
//! applies the viewer's reply. While the viewer keeps the run paused the
//! session renders in a loop and the simulation does not advance.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──start──► Connecting ◄──render failure (retry)──┐
//!        │                     │                                  │
//!        │                 connected                              │
//!        │                     ▼                                  │
//!        └──start──────► Active(Rendering ⇄ Paused) ──────────────┘
//!                              │            │
//!                           shutdown    exit / fatal
//!                              ▼            ▼
//!                          Disabled     Terminated
//! ```

pub mod context;
pub mod types;

pub use context::SessionContext;
pub use types::{ActiveMode, SessionState, StepOutcome};

use crate::config::{ReconnectPolicy, VisConfig};
use crate::control::{
    benchmark_rotation_message, handshake_message, metadata_descriptions, write_interval,
    ControlMessage, ControlState, RunMetadata,
};
use crate::error::{Result, VisError};
use crate::pipeline::RenderPipeline;
use crate::source::{SimulationData, SourceRegistry, StepContext};
use crate::telemetry::{Phase, TelemetryAggregator, TimingSample, BENCHMARK_SAMPLE_BUDGET};
use crate::topology::{GridDecomposition, TopologyTracker};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One process's visualization session
pub struct VisSession<P: RenderPipeline> {
    config: VisConfig,
    ctx: SessionContext,
    pipeline: P,
    sources: SourceRegistry,
    state: SessionState,
    control: ControlState,
    topology: Option<TopologyTracker>,
    telemetry: TelemetryAggregator,
    meta: Map<String, Value>,
    direct_pause: bool,
    released: bool,
}

impl<P: RenderPipeline> VisSession<P> {
    pub fn new(config: VisConfig, ctx: SessionContext, pipeline: P, sources: SourceRegistry) -> Self {
        let direct_pause = config.direct_pause;
        Self {
            config,
            ctx,
            pipeline,
            sources,
            state: SessionState::Uninitialized,
            control: ControlState::default(),
            topology: None,
            telemetry: TelemetryAggregator::inactive(),
            meta: Map::new(),
            direct_pause,
            released: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    pub fn config(&self) -> &VisConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    pub fn telemetry(&self) -> &TelemetryAggregator {
        &self.telemetry
    }

    /// Metadata attached to the next frame
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn topology(&self) -> Option<&TopologyTracker> {
        self.topology.as_ref()
    }

    /// Initialize the session and connect to the viewer
    ///
    /// A session whose configuration has no notification period is disabled
    /// here and stays inert. An invalid configuration disables the session
    /// and is returned as an error.
    pub fn start(&mut self, grid: &dyn GridDecomposition) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            warn!("Session already started ({})", self.state.display_name());
            return Ok(());
        }

        if let Err(e) = self.config.validate() {
            self.disable(&format!("invalid configuration: {}", e));
            return Err(e);
        }
        if !self.config.is_enabled() {
            self.disable("disabled by configuration");
            return Ok(());
        }

        let size = u64::from(self.ctx.size());
        let local_cells = grid.local_domain().volume();
        self.ctx.cell_count = local_cells * size;
        self.ctx.particle_count = local_cells
            * u64::from(self.config.typical_particles_per_cell)
            * self.sources.particle_source_count() as u64
            * size;

        let mut tracker = TopologyTracker::new(grid);
        self.pipeline.update_position(tracker.window().local_offset);
        let neighbours = tracker.update_neighbours(grid);
        self.pipeline.update_neighbours(&neighbours.table);
        if self.ctx.is_root() {
            debug!("Initial neighbour table: {:?}", neighbours.table.to_wire());
        }
        self.topology = Some(tracker);

        self.meta = metadata_descriptions();
        self.pipeline.set_quality(self.config.quality);

        info!(
            "Starting visualization '{}' on rank {} of {} ({}, {} cells, {} particles)",
            self.config.name,
            self.ctx.rank(),
            self.ctx.size(),
            self.config.endpoint(),
            self.ctx.cell_count,
            self.ctx.particle_count
        );

        match self.pipeline.connect(self.config.reconnect) {
            Ok(()) => self.on_connected(),
            Err(e) => match self.config.reconnect {
                ReconnectPolicy::FailFast => {
                    self.disable(&format!("init failed: {}", e));
                    return Ok(());
                }
                ReconnectPolicy::RetryOnRender => {
                    warn!("Viewer not reachable, retrying on next render: {}", e);
                    self.state = SessionState::Connecting;
                }
            },
        }

        self.telemetry = TelemetryAggregator::new(
            self.ctx.rank(),
            self.config.timings_filename.as_deref(),
            BENCHMARK_SAMPLE_BUDGET,
        );
        Ok(())
    }

    /// Drive the session for one simulation step
    pub fn on_step(
        &mut self,
        step: u32,
        data: &mut dyn SimulationData,
        grid: &dyn GridDecomposition,
    ) -> Result<StepOutcome> {
        if !self.state.accepts_steps() {
            return Ok(StepOutcome::Inactive);
        }
        if !self.config.period.includes(step) {
            return Ok(StepOutcome::NotScheduled);
        }

        if self.telemetry.is_active() {
            data.wait_for_pending();
        }

        let now = Instant::now();
        self.ctx.simulation_time = self
            .ctx
            .last_notify
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        self.ctx.step_counter += 1;

        if self.ctx.step_counter < self.control.render_interval {
            self.finish_notify();
            return Ok(StepOutcome::Skipped);
        }
        self.ctx.step_counter = 0;

        let mut cycles = 0;
        loop {
            if !self.ensure_connected() {
                self.finish_notify();
                return Ok(StepOutcome::Interrupted);
            }

            if let Err(e) = self.render_cycle(step, data, grid) {
                if self.recover(e)? {
                    // render the same step again once reconnected
                    continue;
                }
                self.finish_notify();
                return Ok(StepOutcome::Interrupted);
            }
            cycles += 1;

            if self.direct_pause {
                self.direct_pause = false;
                self.control.paused = true;
                self.sync_mode();
            }
            if !self.control.paused {
                break;
            }
        }

        self.finish_notify();
        Ok(StepOutcome::Rendered { cycles })
    }

    /// Disconnect, drop all snapshots and close the benchmark sink
    ///
    /// Idempotent. A terminated session stays terminated, anything else
    /// becomes disabled.
    pub fn shutdown(&mut self) {
        if !self.released {
            info!("Visualization session on rank {} shutting down", self.ctx.rank());
        }
        self.release();
        if self.state != SessionState::Terminated {
            self.state = SessionState::Disabled;
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pipeline.disconnect();
        self.sources.clear_snapshots();
        self.telemetry.close();
        self.topology = None;
    }

    fn disable(&mut self, reason: &str) {
        info!("Visualization disabled: {}", reason);
        self.state = SessionState::Disabled;
        self.release();
    }

    fn sync_mode(&mut self) {
        if self.state.is_active() {
            self.state = SessionState::Active(if self.control.paused {
                ActiveMode::Paused
            } else {
                ActiveMode::Rendering
            });
        }
    }

    fn on_connected(&mut self) {
        self.state = SessionState::Active(ActiveMode::Rendering);
        self.sync_mode();
        if self.ctx.is_root() {
            self.pipeline.push_message(handshake_message());
        }
        info!("Rank {} connected to {}", self.ctx.rank(), self.config.endpoint());
    }

    /// Block until connected; `false` if the session gave up
    fn ensure_connected(&mut self) -> bool {
        if self.state != SessionState::Connecting {
            return true;
        }
        let mut attempts = 0u32;
        loop {
            match self.pipeline.connect(self.config.reconnect) {
                Ok(()) => {
                    if attempts > 0 {
                        info!("Reconnected after {} failed attempts", attempts);
                    }
                    self.on_connected();
                    return true;
                }
                Err(e) => match self.config.reconnect {
                    ReconnectPolicy::FailFast => {
                        self.disable(&format!("reconnect failed: {}", e));
                        return false;
                    }
                    ReconnectPolicy::RetryOnRender => {
                        attempts += 1;
                        if attempts == 1 {
                            warn!("Reconnect to {} failed: {}", self.config.endpoint(), e);
                        } else {
                            debug!("Reconnect attempt {} failed: {}", attempts, e);
                        }
                        std::thread::sleep(self.config.reconnect_delay());
                    }
                },
            }
        }
    }

    /// Every notified step advances the run step, rendered or not
    fn finish_notify(&mut self) {
        self.ctx.run_step += 1;
        self.ctx.last_notify = Some(Instant::now());
    }

    /// Route a failed render cycle
    ///
    /// `Ok(true)` means the step should be rendered again after
    /// reconnecting, `Ok(false)` that the session gave up on the viewer.
    /// Errors that are not a lost viewer link end the session and are
    /// returned.
    fn recover(&mut self, e: VisError) -> Result<bool> {
        if e.is_fatal() {
            warn!("Visualization terminated on rank {}: {}", self.ctx.rank(), e);
            self.state = SessionState::Terminated;
            self.release();
            return Err(e);
        }
        if !e.is_connection_loss() {
            self.disable(&format!("render cycle failed: {}", e));
            return Err(e);
        }

        self.control.paused = false;
        match self.config.reconnect {
            ReconnectPolicy::RetryOnRender => {
                warn!("Render failed on rank {}, reconnecting: {}", self.ctx.rank(), e);
                self.pipeline.disconnect();
                self.state = SessionState::Connecting;
                Ok(true)
            }
            ReconnectPolicy::FailFast => {
                self.disable(&format!("render failed: {}", e));
                Ok(false)
            }
        }
    }

    fn render_cycle(
        &mut self,
        step: u32,
        data: &mut dyn SimulationData,
        grid: &dyn GridDecomposition,
    ) -> Result<()> {
        if grid.moving_window() {
            if let Some(tracker) = self.topology.as_mut() {
                let window = tracker.update_window(step, grid);
                self.pipeline.update_position(window.offset);
                let neighbours = tracker.update_neighbours(grid);
                if !neighbours.changed.is_empty() {
                    debug!(
                        "Rank {}: {} neighbour slots changed at step {}",
                        self.ctx.rank(),
                        neighbours.changed.len(),
                        step
                    );
                }
                self.pipeline.update_neighbours(&neighbours.table);
            }
        }

        if self.ctx.is_root() && self.ctx.has_rendered {
            RunMetadata {
                time_step: step,
                drawing_time_us: self.ctx.drawing_time.as_micros() as u64,
                simulation_time_us: self.ctx.simulation_time.as_micros() as u64,
                cell_count: self.ctx.cell_count,
                particle_count: self.ctx.particle_count,
            }
            .write_into(&mut self.meta);
        }

        self.sources
            .refresh_all(&mut StepContext::new(step, data))?;

        let paused = self.control.paused;
        let started = Instant::now();
        let reply = self.pipeline.render(step, &self.sources, &self.meta, paused)?;
        self.ctx.drawing_time = started.elapsed();
        self.ctx.has_rendered = true;

        self.benchmark(paused)?;

        if let Some(reply) = reply {
            self.apply_reply(&reply)?;
        }
        Ok(())
    }

    fn benchmark(&mut self, paused: bool) -> Result<()> {
        if !self.telemetry.is_active() || paused || self.ctx.run_step < 0 {
            return Ok(());
        }
        if self.ctx.is_root() {
            self.pipeline
                .push_message(benchmark_rotation_message(self.ctx.run_step));
        }

        let mut samples = vec![
            TimingSample::new(Phase::Simulation, self.ctx.simulation_time.as_micros() as u64),
            TimingSample::new(Phase::Visualization, self.ctx.drawing_time.as_micros() as u64),
        ];
        samples.extend(self.pipeline.timings().samples());
        self.telemetry
            .record_step(self.ctx.collective(), self.ctx.run_step, &samples)?;
        Ok(())
    }

    fn apply_reply(&mut self, reply: &Value) -> Result<()> {
        let msg = ControlMessage::decode(reply);
        if msg.is_empty() {
            return Ok(());
        }
        let applied = self.control.apply(&msg);

        if applied.pause_toggled {
            info!(
                "Rank {}: viewer {} the simulation",
                self.ctx.rank(),
                if self.control.paused { "paused" } else { "resumed" }
            );
            self.sync_mode();
        }
        if let Some(interval) = applied.interval {
            debug!("Render interval set to {}", interval);
            if self.ctx.is_root() {
                write_interval(&mut self.meta, interval);
            }
        }
        if applied.exit_requested {
            return Err(VisError::ExitRequested);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::period::StepPeriod;
    use crate::host::{HostSimulation, StaticDecomposition};
    use crate::pipeline::{LoopbackPipeline, LoopbackViewer};
    use crate::source::FieldSource;
    use crate::telemetry::SoloCollective;
    use serde_json::json;

    fn setup(config: VisConfig) -> (VisSession<LoopbackPipeline>, LoopbackViewer, HostSimulation) {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        let sources = SourceRegistry::new()
            .with(FieldSource::vector("E", true))
            .unwrap();
        let session = VisSession::new(
            config,
            SessionContext::new(Box::new(SoloCollective)),
            pipelines.remove(0),
            sources,
        );
        let mut sim = HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2]);
        sim.insert_vector_field("E", |_| [1.0, 0.0, 0.0]);
        (session, viewer, sim)
    }

    fn grid() -> StaticDecomposition {
        StaticDecomposition::new([1, 1, 1], [4, 4, 4], [0, 0, 0])
    }

    #[test]
    fn test_empty_period_disables() {
        let config = VisConfig {
            period: StepPeriod::disabled(),
            ..Default::default()
        };
        let (mut session, _viewer, mut sim) = setup(config);
        let g = grid();
        session.start(&g).unwrap();
        assert_eq!(session.state(), SessionState::Disabled);
        assert_eq!(session.on_step(0, &mut sim, &g).unwrap(), StepOutcome::Inactive);
        assert_eq!(sim.wait_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VisConfig {
            quality: 0,
            ..Default::default()
        };
        let (mut session, _viewer, _sim) = setup(config);
        assert!(session.start(&grid()).is_err());
        assert_eq!(session.state(), SessionState::Disabled);
    }

    #[test]
    fn test_renders_and_attaches_metadata_after_first_frame() {
        let (mut session, viewer, mut sim) = setup(VisConfig::default());
        let g = grid();
        session.start(&g).unwrap();
        assert!(session.state().is_active());
        assert_eq!(session.context().cell_count(), 64);

        assert_eq!(
            session.on_step(0, &mut sim, &g).unwrap(),
            StepOutcome::Rendered { cycles: 1 }
        );
        // first frame carries the field descriptions
        assert_eq!(session.metadata()["time step"], json!("Time step"));

        session.on_step(1, &mut sim, &g).unwrap();
        assert_eq!(session.metadata()["time step"], json!(1));
        assert_eq!(session.metadata()["cell count"], json!(64));

        let frames: Vec<_> = viewer.drain().into_iter().filter(|e| e.is_frame()).collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_interval_from_viewer() {
        let (mut session, viewer, mut sim) = setup(VisConfig::default());
        let g = grid();
        session.start(&g).unwrap();
        viewer.send(json!({"interval": 3}));

        let outcomes: Vec<_> = (0..7)
            .map(|s| session.on_step(s, &mut sim, &g).unwrap().rendered())
            .collect();
        assert_eq!(outcomes, vec![true, false, false, true, false, false, true]);
        assert_eq!(session.metadata()["interval"], json!(3));
    }

    #[test]
    fn test_run_step_advances_on_skipped_steps() {
        let (mut session, viewer, mut sim) = setup(VisConfig::default());
        let g = grid();
        session.start(&g).unwrap();
        viewer.send(json!({"interval": 5}));

        let rendered = (0..10)
            .filter(|&s| session.on_step(s, &mut sim, &g).unwrap().rendered())
            .count();
        assert_eq!(rendered, 2);
        assert_eq!(
            session.context().run_step(),
            crate::telemetry::BENCHMARK_PREROLL + 10
        );
    }

    #[test]
    fn test_exit_terminates() {
        let (mut session, viewer, mut sim) = setup(VisConfig::default());
        let g = grid();
        session.start(&g).unwrap();
        viewer.send(json!({"exit": 1}));
        let err = session.on_step(0, &mut sim, &g).unwrap_err();
        assert!(matches!(err, VisError::ExitRequested));
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(session.on_step(1, &mut sim, &g).unwrap(), StepOutcome::Inactive);
        session.shutdown();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_missing_quantity_is_fatal() {
        let (mut session, _viewer, _sim) = setup(VisConfig::default());
        let mut empty = HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2]);
        let g = grid();
        session.start(&g).unwrap();
        assert!(session.on_step(0, &mut empty, &g).is_err());
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_not_scheduled_step() {
        let config = VisConfig {
            period: "10".parse().unwrap(),
            ..Default::default()
        };
        let (mut session, _viewer, mut sim) = setup(config);
        let g = grid();
        session.start(&g).unwrap();
        assert_eq!(session.on_step(3, &mut sim, &g).unwrap(), StepOutcome::NotScheduled);
        assert!(session.on_step(10, &mut sim, &g).unwrap().rendered());
    }

    #[test]
    fn test_shutdown_idempotent() {
        let (mut session, viewer, mut sim) = setup(VisConfig::default());
        let g = grid();
        session.start(&g).unwrap();
        session.on_step(0, &mut sim, &g).unwrap();
        session.shutdown();
        session.shutdown();
        assert_eq!(session.state(), SessionState::Disabled);
        assert!(session.sources().iter().all(|s| !s.is_ready()));
        let disconnects = viewer
            .drain()
            .into_iter()
            .filter(|e| matches!(e, crate::pipeline::ViewerEvent::Disconnected { .. }))
            .count();
        assert_eq!(disconnects, 1);
    }
}
