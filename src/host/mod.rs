//! In-process reference collaborators
//!
//! Simple implementations of the simulation-side interfaces so the session
//! can be driven without a physics code: [`HostSimulation`] holds fields and
//! particle species in host memory, [`StaticDecomposition`] describes a
//! regular process grid with an optional moving window.

pub mod grid;
pub mod simulation;

pub use grid::StaticDecomposition;
pub use simulation::{HostSimulation, Solver};
