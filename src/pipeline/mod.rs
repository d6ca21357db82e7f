//! Render pipeline interface
//!
//! The session drives an external renderer that composites the partial
//! images of all processes and streams them to the viewer. The session only
//! sees this narrow trait: geometry updates, one `render` call per cycle
//! that returns the viewer's reply, and phase timings for the benchmark.
//!
//! [`loopback`] provides an in-process implementation with a scriptable
//! viewer on the other end of a channel pair.

pub mod loopback;

pub use loopback::{LoopbackPipeline, LoopbackViewer, ViewerEvent};

use crate::config::ReconnectPolicy;
use crate::error::Result;
use crate::source::SourceRegistry;
use crate::telemetry::{Phase, TimingSample};
use crate::topology::NeighbourTable;
use crate::types::Int3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Durations of the pipeline's internal phases for the last render,
/// microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimings {
    pub kernel: u64,
    pub merge: u64,
    pub video_send: u64,
    pub copy: u64,
    pub sorting: u64,
    pub buffer: u64,
    pub advection: u64,
    pub advection_border: u64,
    pub optimization_buffer: u64,
}

impl PipelineTimings {
    /// As telemetry samples, in column order
    pub fn samples(&self) -> [TimingSample; 9] {
        [
            TimingSample::new(Phase::Kernel, self.kernel),
            TimingSample::new(Phase::Merge, self.merge),
            TimingSample::new(Phase::VideoSend, self.video_send),
            TimingSample::new(Phase::Copy, self.copy),
            TimingSample::new(Phase::Sorting, self.sorting),
            TimingSample::new(Phase::Buffer, self.buffer),
            TimingSample::new(Phase::Advection, self.advection),
            TimingSample::new(Phase::AdvectionBorder, self.advection_border),
            TimingSample::new(Phase::OptimizationBuffer, self.optimization_buffer),
        ]
    }
}

/// The external renderer as seen by one process
pub trait RenderPipeline: Send {
    /// Try to reach the visualization endpoint once
    fn connect(&mut self, policy: ReconnectPolicy) -> Result<()>;

    /// Release the connection; safe to call when not connected
    fn disconnect(&mut self);

    /// Image compression quality, 1..=100
    fn set_quality(&mut self, quality: u32);

    /// Offset of the local subdomain inside the global window
    fn update_position(&mut self, offset: Int3);

    fn update_neighbours(&mut self, table: &NeighbourTable);

    /// Queue a message for the viewer, sent with the next frame
    fn push_message(&mut self, message: Value);

    /// Render one frame from `sources` and return the viewer's reply
    ///
    /// With `paused` set the call blocks until the viewer sends the next
    /// message.
    fn render(
        &mut self,
        step: u32,
        sources: &SourceRegistry,
        meta: &Map<String, Value>,
        paused: bool,
    ) -> Result<Option<Value>>;

    /// Phase timings of the last render
    fn timings(&self) -> PipelineTimings;
}

impl<P: RenderPipeline + ?Sized> RenderPipeline for Box<P> {
    fn connect(&mut self, policy: ReconnectPolicy) -> Result<()> {
        (**self).connect(policy)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn set_quality(&mut self, quality: u32) {
        (**self).set_quality(quality)
    }

    fn update_position(&mut self, offset: Int3) {
        (**self).update_position(offset)
    }

    fn update_neighbours(&mut self, table: &NeighbourTable) {
        (**self).update_neighbours(table)
    }

    fn push_message(&mut self, message: Value) {
        (**self).push_message(message)
    }

    fn render(
        &mut self,
        step: u32,
        sources: &SourceRegistry,
        meta: &Map<String, Value>,
        paused: bool,
    ) -> Result<Option<Value>> {
        (**self).render(step, sources, meta, paused)
    }

    fn timings(&self) -> PipelineTimings {
        (**self).timings()
    }
}
