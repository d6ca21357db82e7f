//! # insitu-steer: In-situ visualization control plane
//!
//! Connects a distributed particle-in-cell simulation to a remote
//! visualization service. Each process exposes its fields and particle
//! species as generic sources, keeps the renderer informed about where its
//! subdomain sits in a (possibly moving) window, and accepts steering
//! commands from the viewer: pause, render cadence, camera and transfer
//! function parameters, and exit.
//!
//! ## Architecture
//!
//! - **Source**: Per-category adapters (fields, derived fields, particles)
//!   behind one sampling interface, held in a `SourceRegistry`
//! - **Topology**: Neighbour table and moving-window offset tracking
//! - **Control**: JSON codec for viewer messages and outbound metadata
//! - **Telemetry**: Cross-process min/max/average reduction of phase timings
//!   written to a benchmark CSV
//! - **Session**: Per-step lifecycle wiring all of the above to a
//!   `RenderPipeline`
//!
//! The simulation, the renderer, the domain decomposition and the process
//! group are external collaborators expressed as traits. The `host`,
//! `pipeline::loopback` and `telemetry::LocalCollective` modules implement
//! them in-process.
//!
//! ## Example
//!
//! ```ignore
//! use insitu_steer::{
//!     config::VisConfig,
//!     host::{HostSimulation, StaticDecomposition},
//!     pipeline::LoopbackViewer,
//!     session::{SessionContext, VisSession},
//!     source::{FieldSource, SourceRegistry},
//!     telemetry::SoloCollective,
//! };
//!
//! let (viewer, mut pipelines) = LoopbackViewer::new(1);
//! let sources = SourceRegistry::new().with(FieldSource::vector("E", true))?;
//! let mut session = VisSession::new(
//!     VisConfig::default(),
//!     SessionContext::new(Box::new(SoloCollective)),
//!     pipelines.remove(0),
//!     sources,
//! );
//! let grid = StaticDecomposition::new([1, 1, 1], [32, 32, 32], [0, 0, 0]);
//! session.start(&grid)?;
//!
//! let mut sim = HostSimulation::new([32, 32, 32], [1, 1, 1], [8, 8, 4]);
//! for step in 0..100 {
//!     sim.insert_vector_field("E", |[x, _, _]| [x as f32, 0.0, 0.0]);
//!     session.on_step(step, &mut sim, &grid)?;
//! }
//! session.shutdown();
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod telemetry;
pub mod topology;
pub mod types;

// Re-export commonly used types
pub use config::{ReconnectPolicy, StepPeriod, VisConfig};
pub use control::{ControlMessage, ControlState, RenderSettings};
pub use error::{Result, ResultExt, VisError};
pub use pipeline::{PipelineTimings, RenderPipeline};
pub use session::{SessionContext, SessionState, StepOutcome, VisSession};
pub use source::{DataSource, SimulationData, SourceRegistry};
pub use telemetry::Collective;
pub use topology::{Exchange, GridDecomposition, NeighbourTable, TopologyTracker};
pub use types::{DomainBox, DomainWindow, FeatureVector, SourceDescriptor};
