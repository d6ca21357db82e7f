//! Source adapters
//!
//! Every field, vector field, derived field and particle species the session
//! exposes to the renderer is wrapped in a source adapter with a uniform
//! interface: a static [`SourceDescriptor`], a `refresh` that pulls the
//! current step's data from the simulation, and index-addressed sampling.
//!
//! # Components
//!
//! - [`SimulationData`] - The simulation's data registry (external collaborator)
//! - [`DataSource`] - Interface every adapter implements
//! - [`FieldSource`] / [`DerivedFieldSource`] / [`ParticleSource`] - Built-in adapters
//! - [`SourceRegistry`] - Name-indexed set of adapters refreshed each render cycle
//!
//! # Synchronization
//!
//! Simulation kernels run asynchronously to the host. An enabled refresh
//! always calls [`SimulationData::wait_for_pending`] before the new data is
//! exposed, so no sample can observe a buffer that is still being written.

pub mod buffer;
pub mod particle;
pub mod registry;

pub use buffer::{FieldBuffer, FieldLayout};
pub use particle::{Particle, ParticleArena, ParticleCursor, ParticleView, PARTICLE_RADIUS};
pub use registry::{AnySource, SourceRegistry};

use crate::error::{Result, VisError};
use crate::types::{FeatureVector, SourceDescriptor};
use std::sync::Arc;

/// A quantity computed on demand from a particle species
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedQuantity {
    /// Species the quantity is computed from
    pub species: String,
    /// Particle filter name (e.g. `"all"`)
    pub filter: String,
    /// Reduction name (e.g. `"Density"`, `"Energy"`)
    pub solver: String,
}

impl DerivedQuantity {
    pub fn new(
        species: impl Into<String>,
        filter: impl Into<String>,
        solver: impl Into<String>,
    ) -> Self {
        Self {
            species: species.into(),
            filter: filter.into(),
            solver: solver.into(),
        }
    }

    /// Display name, `"<species> <filter> <solver>"`
    pub fn name(&self) -> String {
        format!("{} {} {}", self.species, self.filter, self.solver)
    }
}

/// The simulation's live data registry
///
/// Buffers are looked up by quantity name. Implementations publish a new
/// snapshot each step before the session refreshes its sources.
pub trait SimulationData {
    /// Current snapshot of a field by quantity name
    fn field(&self, quantity: &str) -> Option<Arc<FieldBuffer>>;

    /// Recompute a derived quantity for `step` and return the result
    fn compute_derived(&mut self, quantity: &DerivedQuantity, step: u32)
        -> Option<Arc<FieldBuffer>>;

    /// Current particle storage of a species
    fn particles(&self, species: &str) -> Option<Arc<ParticleArena>>;

    /// Block until all outstanding asynchronous simulation work has finished
    fn wait_for_pending(&mut self);
}

/// Per-refresh context handed to every source
pub struct StepContext<'a> {
    pub step: u32,
    pub data: &'a mut dyn SimulationData,
}

impl<'a> StepContext<'a> {
    pub fn new(step: u32, data: &'a mut dyn SimulationData) -> Self {
        Self { step, data }
    }
}

/// Uniform interface of a source adapter
pub trait DataSource: Send {
    /// Static description of the source
    fn descriptor(&self) -> &SourceDescriptor;

    /// Pull the current step's data. A disabled refresh leaves the previous
    /// snapshot untouched.
    fn refresh(&mut self, enabled: bool, ctx: &mut StepContext<'_>) -> Result<()>;

    /// Sample at a physical cell index; `None` before the first refresh or
    /// outside the exposed region
    fn sample(&self, index: [i32; 3]) -> Option<FeatureVector>;

    /// Whether at least one refresh has completed
    fn is_ready(&self) -> bool;

    /// Drop the held snapshot
    fn release(&mut self);
}

/// Whether `index` lies within the physical domain widened by the exposed
/// guard width
fn within_exposed(layout: &FieldLayout, guard_width: u32, index: [i32; 3]) -> bool {
    (0..3).all(|axis| {
        let lo = -(guard_width as i64);
        let hi = layout.interior[axis] as i64 + guard_width as i64;
        let i = index[axis] as i64;
        i >= lo && i < hi
    })
}

/// Adapter over a simulation field (scalar or vector)
#[derive(Debug)]
pub struct FieldSource {
    quantity: String,
    descriptor: SourceDescriptor,
    snapshot: Option<Arc<FieldBuffer>>,
}

impl FieldSource {
    /// A 3-component field, e.g. `E` → `"E field"`
    pub fn vector(quantity: impl Into<String>, persistent: bool) -> Self {
        let quantity = quantity.into();
        let descriptor = SourceDescriptor::vector(format!("{} field", quantity), persistent);
        Self {
            quantity,
            descriptor,
            snapshot: None,
        }
    }

    /// A 3-component field registered as a vector field (rendered as
    /// streamlines), e.g. `B` → `"B vector field"`
    pub fn vector_field(quantity: impl Into<String>, persistent: bool) -> Self {
        let quantity = quantity.into();
        let descriptor =
            SourceDescriptor::vector(format!("{} vector field", quantity), persistent);
        Self {
            quantity,
            descriptor,
            snapshot: None,
        }
    }

    /// A 1-component field
    pub fn scalar(quantity: impl Into<String>, persistent: bool) -> Self {
        let quantity = quantity.into();
        let descriptor = SourceDescriptor::scalar(format!("{} field", quantity), persistent);
        Self {
            quantity,
            descriptor,
            snapshot: None,
        }
    }

    /// Expose `width` guard cells around the physical domain
    pub fn with_guard_width(mut self, width: u32) -> Self {
        self.descriptor = self.descriptor.with_guard_width(width);
        self
    }

    pub fn quantity(&self) -> &str {
        &self.quantity
    }
}

impl DataSource for FieldSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn refresh(&mut self, enabled: bool, ctx: &mut StepContext<'_>) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        let buffer = ctx
            .data
            .field(&self.quantity)
            .ok_or_else(|| VisError::MissingQuantity(self.quantity.clone()))?;
        if buffer.layout().components != self.descriptor.feature_dim() {
            return Err(VisError::ComponentMismatch {
                quantity: self.quantity.clone(),
                found: buffer.layout().components,
                expected: self.descriptor.feature_dim(),
            });
        }
        ctx.data.wait_for_pending();
        self.snapshot = Some(buffer);
        Ok(())
    }

    fn sample(&self, index: [i32; 3]) -> Option<FeatureVector> {
        let buffer = self.snapshot.as_ref()?;
        if !within_exposed(buffer.layout(), self.descriptor.guard_width(), index) {
            return None;
        }
        buffer.get(index)
    }

    fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    fn release(&mut self) {
        self.snapshot = None;
    }
}

/// Adapter over a quantity derived from a particle species
///
/// Refreshing triggers the recomputation, so the source is never persistent.
#[derive(Debug)]
pub struct DerivedFieldSource {
    quantity: DerivedQuantity,
    descriptor: SourceDescriptor,
    snapshot: Option<Arc<FieldBuffer>>,
}

impl DerivedFieldSource {
    pub fn new(quantity: DerivedQuantity) -> Self {
        let descriptor = SourceDescriptor::scalar(quantity.name(), false);
        Self {
            quantity,
            descriptor,
            snapshot: None,
        }
    }

    pub fn quantity(&self) -> &DerivedQuantity {
        &self.quantity
    }
}

impl DataSource for DerivedFieldSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn refresh(&mut self, enabled: bool, ctx: &mut StepContext<'_>) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        let step = ctx.step;
        let buffer = ctx
            .data
            .compute_derived(&self.quantity, step)
            .ok_or_else(|| VisError::MissingQuantity(self.quantity.name()))?;
        ctx.data.wait_for_pending();
        self.snapshot = Some(buffer);
        Ok(())
    }

    fn sample(&self, index: [i32; 3]) -> Option<FeatureVector> {
        let buffer = self.snapshot.as_ref()?;
        if !within_exposed(buffer.layout(), self.descriptor.guard_width(), index) {
            return None;
        }
        buffer.get(index).map(|v| FeatureVector::Scalar(v.as_slice()[0]))
    }

    fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    fn release(&mut self) {
        self.snapshot = None;
    }
}

/// Adapter over a particle species
///
/// Particles are read through [`ParticleSource::begin_cell`]; cell sampling
/// is not defined for particle sources.
#[derive(Debug)]
pub struct ParticleSource {
    species: String,
    descriptor: SourceDescriptor,
    snapshot: Option<Arc<ParticleArena>>,
}

impl ParticleSource {
    pub fn new(species: impl Into<String>) -> Self {
        let species = species.into();
        let descriptor = SourceDescriptor::vector(format!("{} particle", species), false);
        Self {
            species,
            descriptor,
            snapshot: None,
        }
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    /// Iterate the particles of a physical bucket; `None` before the first
    /// refresh or for an out-of-range bucket
    pub fn begin_cell(&self, bucket: [u32; 3]) -> Option<ParticleCursor<'_>> {
        self.snapshot.as_ref()?.cursor(bucket)
    }

    /// Particles held by the current snapshot
    pub fn particle_count(&self) -> usize {
        self.snapshot.as_ref().map(|a| a.len()).unwrap_or(0)
    }

    /// The current snapshot
    pub fn arena(&self) -> Option<&ParticleArena> {
        self.snapshot.as_deref()
    }
}

impl DataSource for ParticleSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn refresh(&mut self, enabled: bool, ctx: &mut StepContext<'_>) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        let arena = ctx
            .data
            .particles(&self.species)
            .ok_or_else(|| VisError::MissingQuantity(self.species.clone()))?;
        ctx.data.wait_for_pending();
        self.snapshot = Some(arena);
        Ok(())
    }

    fn sample(&self, _index: [i32; 3]) -> Option<FeatureVector> {
        None
    }

    fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    fn release(&mut self) {
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSimulation;

    fn sim() -> HostSimulation {
        HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2])
    }

    #[test]
    fn test_sample_before_refresh_is_none() {
        let source = FieldSource::vector("E", true);
        assert!(!source.is_ready());
        assert_eq!(source.sample([0, 0, 0]), None);
    }

    #[test]
    fn test_refresh_exposes_physical_indices() {
        let mut data = sim();
        data.insert_vector_field("E", |[x, y, z]| [x as f32, y as f32, z as f32]);
        let mut source = FieldSource::vector("E", true);
        source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap();
        assert_eq!(source.descriptor().name, "E field");
        assert_eq!(source.sample([3, 2, 1]), Some(FeatureVector::Vector([3.0, 2.0, 1.0])));
        // guard not exposed by default
        assert_eq!(source.sample([-1, 0, 0]), None);
        assert_eq!(source.sample([4, 0, 0]), None);
    }

    #[test]
    fn test_exposed_guard_width() {
        let mut data = sim();
        data.insert_scalar_field("rho", |_| 1.0);
        let mut source = FieldSource::scalar("rho", true).with_guard_width(1);
        source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap();
        assert_eq!(source.sample([-1, 0, 0]), Some(FeatureVector::Scalar(0.0)));
        assert_eq!(source.sample([-2, 0, 0]), None);
    }

    #[test]
    fn test_refresh_waits_for_pending_work() {
        let mut data = sim();
        data.insert_scalar_field("rho", |_| 1.0);
        data.enqueue_work();
        assert!(data.has_pending_work());
        let mut source = FieldSource::scalar("rho", true);
        source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap();
        assert!(!data.has_pending_work());
        assert_eq!(data.wait_count(), 1);
    }

    #[test]
    fn test_disabled_refresh_keeps_previous_snapshot() {
        let mut data = sim();
        data.insert_scalar_field("rho", |_| 1.0);
        let mut source = FieldSource::scalar("rho", true);
        source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap();

        data.insert_scalar_field("rho", |_| 5.0);
        data.enqueue_work();
        source
            .refresh(false, &mut StepContext::new(1, &mut data))
            .unwrap();
        assert_eq!(source.sample([0, 0, 0]), Some(FeatureVector::Scalar(1.0)));
        // a disabled refresh does not synchronize
        assert!(data.has_pending_work());
    }

    #[test]
    fn test_missing_quantity_is_fatal() {
        let mut data = sim();
        let mut source = FieldSource::vector("B", true);
        let err = source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap_err();
        assert!(matches!(err, VisError::MissingQuantity(ref q) if q == "B"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_component_mismatch_rejected() {
        let mut data = sim();
        data.insert_scalar_field("E", |_| 1.0);
        let mut source = FieldSource::vector("E", true);
        let err = source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap_err();
        assert!(matches!(
            err,
            VisError::ComponentMismatch { found: 1, expected: 3, .. }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_derived_density_recomputed() {
        let mut data = sim();
        data.insert_uniform_species("e", 1, [0.0, 0.0, 1.0]);
        let mut source = DerivedFieldSource::new(DerivedQuantity::new("e", "all", "Density"));
        assert_eq!(source.descriptor().name, "e all Density");
        assert!(!source.descriptor().is_persistent());
        source
            .refresh(true, &mut StepContext::new(3, &mut data))
            .unwrap();
        assert_eq!(source.sample([0, 0, 0]), Some(FeatureVector::Scalar(1.0)));
        assert_eq!(data.derived_computations(), 1);
    }

    #[test]
    fn test_particle_source_iterates_bucket() {
        let mut data = sim();
        data.insert_uniform_species("e", 1, [1.0, 2.0, 3.0]);
        let mut source = ParticleSource::new("e");
        assert!(source.begin_cell([0, 0, 0]).is_none());
        source
            .refresh(true, &mut StepContext::new(0, &mut data))
            .unwrap();
        assert_eq!(source.descriptor().name, "e particle");
        // one particle per cell, 8 cells per bucket
        let views: Vec<_> = source.begin_cell([1, 1, 1]).unwrap().collect();
        assert_eq!(views.len(), 8);
        assert!(views.iter().all(|v| v.attribute == [1.0, 2.0, 3.0]));
        assert!(views
            .iter()
            .all(|v| v.position.iter().all(|&c| (0.0..1.0).contains(&c))));
        assert_eq!(source.sample([0, 0, 0]), None);
        assert_eq!(source.particle_count(), 64);
    }
}
