//! Control-plane codec
//!
//! Translates between the viewer's JSON messages and typed values:
//! inbound steering patches ([`ControlMessage`]), the outbound run metadata
//! attached to every frame, the initial handshake and the camera feedback
//! sent while benchmarking.

pub mod message;

pub use message::{AppliedControl, ControlMessage, ControlState, RenderSettings};

use message::{floats, KEY_INTERVAL, KEY_ROTATION_AXIS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const META_TIME_STEP: &str = "time step";
pub const META_DRAWING_TIME: &str = "drawing time";
pub const META_SIMULATION_TIME: &str = "simulation time";
pub const META_CELL_COUNT: &str = "cell count";
pub const META_PARTICLE_COUNT: &str = "particle count";

/// Per-frame metadata published by the coordinating process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub time_step: u32,
    /// Duration of the previous render, microseconds
    pub drawing_time_us: u64,
    /// Simulation time between the previous two calls, microseconds
    pub simulation_time_us: u64,
    pub cell_count: u64,
    pub particle_count: u64,
}

impl RunMetadata {
    /// Write every field into the outbound metadata object
    pub fn write_into(&self, meta: &mut Map<String, Value>) {
        meta.insert(META_TIME_STEP.into(), Value::from(self.time_step));
        meta.insert(META_DRAWING_TIME.into(), Value::from(self.drawing_time_us));
        meta.insert(
            META_SIMULATION_TIME.into(),
            Value::from(self.simulation_time_us),
        );
        meta.insert(META_CELL_COUNT.into(), Value::from(self.cell_count));
        meta.insert(META_PARTICLE_COUNT.into(), Value::from(self.particle_count));
    }
}

/// Echo the effective render interval to all viewers
pub fn write_interval(meta: &mut Map<String, Value>, interval: u32) {
    meta.insert(KEY_INTERVAL.into(), Value::from(interval));
}

/// Human-readable descriptions of the metadata fields
pub fn metadata_descriptions() -> Map<String, Value> {
    let mut meta = Map::new();
    for (key, description) in [
        (META_TIME_STEP, "Time step"),
        (META_DRAWING_TIME, "Drawing time in us"),
        (META_SIMULATION_TIME, "Simulation time in us"),
        (META_CELL_COUNT, "Total numbers of cells"),
        (META_PARTICLE_COUNT, "Total numbers of particles"),
    ] {
        meta.insert(key.into(), Value::from(description));
    }
    meta
}

/// The default rendering configuration sent once after connecting
pub fn handshake_message() -> Value {
    RenderSettings::default().to_message()
}

/// Camera rotation axis steered during a benchmark run
///
/// x for the first 360 run steps, then y, then z, then all three axes.
pub fn benchmark_rotation(run_step: i64) -> [f32; 4] {
    match run_step {
        s if s < 360 => [1.0, 0.0, 0.0, 1.0],
        s if s < 720 => [0.0, 1.0, 0.0, 1.0],
        s if s < 1080 => [0.0, 0.0, 1.0, 1.0],
        _ => [1.0, 1.0, 1.0, 1.0],
    }
}

/// [`benchmark_rotation`] as a viewer message
pub fn benchmark_rotation_message(run_step: i64) -> Value {
    let mut obj = Map::new();
    obj.insert(KEY_ROTATION_AXIS.into(), floats(&benchmark_rotation(run_step)));
    Value::Object(obj)
}
