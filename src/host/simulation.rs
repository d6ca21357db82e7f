//! Host-resident simulation data

use crate::source::{
    DerivedQuantity, FieldBuffer, FieldLayout, Particle, ParticleArena, SimulationData,
};
use crate::types::{FeatureVector, Size3, DIMENSIONS};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Reductions understood by [`HostSimulation::compute_derived`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    /// Particles per cell
    Density,
    /// Alias of density kept for the counter naming
    Counter,
    /// Kinetic energy `0.5 |p|²` per cell
    Energy,
}

impl Solver {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Density" => Some(Solver::Density),
            "Counter" => Some(Solver::Counter),
            "Energy" => Some(Solver::Energy),
            _ => None,
        }
    }

    fn weight(&self, particle: &Particle) -> f32 {
        match self {
            Solver::Density | Solver::Counter => 1.0,
            Solver::Energy => {
                let p = particle.momentum;
                0.5 * (p[0] * p[0] + p[1] * p[1] + p[2] * p[2])
            }
        }
    }
}

/// Fields and particle species of one process, held in host memory
///
/// Asynchronous device work is modelled by a pending-work counter: work is
/// enqueued by the caller (or by a derived computation) and retired by
/// [`SimulationData::wait_for_pending`].
#[derive(Debug)]
pub struct HostSimulation {
    local_size: Size3,
    guard: Size3,
    bucket_size: Size3,
    fields: HashMap<String, Arc<FieldBuffer>>,
    species: HashMap<String, Arc<ParticleArena>>,
    pending: u32,
    waits: u32,
    derived: u32,
}

impl HostSimulation {
    /// `local_size` and `guard` in cells, `bucket_size` the cells per bucket
    pub fn new(local_size: Size3, guard: Size3, bucket_size: Size3) -> Self {
        Self {
            local_size,
            guard,
            bucket_size,
            fields: HashMap::new(),
            species: HashMap::new(),
            pending: 0,
            waits: 0,
            derived: 0,
        }
    }

    pub fn local_size(&self) -> Size3 {
        self.local_size
    }

    /// Physical cells per process
    pub fn local_cells(&self) -> u64 {
        self.local_size.iter().map(|&s| s as u64).product()
    }

    fn layout(&self, components: u8) -> FieldLayout {
        FieldLayout::new(self.local_size, self.guard, components)
    }

    /// Publish a new snapshot of a 1-component field
    pub fn insert_scalar_field<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut([u32; 3]) -> f32,
    {
        let buffer = FieldBuffer::from_fn(self.layout(1), |cell| FeatureVector::Scalar(f(cell)));
        self.fields.insert(name.to_string(), Arc::new(buffer));
    }

    /// Publish a new snapshot of a 3-component field
    pub fn insert_vector_field<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut([u32; 3]) -> [f32; 3],
    {
        let buffer = FieldBuffer::from_fn(self.layout(3), |cell| FeatureVector::Vector(f(cell)));
        self.fields.insert(name.to_string(), Arc::new(buffer));
    }

    /// An empty arena shaped for this process
    pub fn empty_arena(&self) -> ParticleArena {
        let mut interior = [0; DIMENSIONS];
        let mut guard = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            interior[axis] = self.local_size[axis] / self.bucket_size[axis].max(1);
            guard[axis] = u32::from(self.guard[axis] > 0);
        }
        ParticleArena::new(self.bucket_size, interior, guard)
    }

    /// Publish a new snapshot of a species
    pub fn insert_species(&mut self, name: &str, arena: ParticleArena) {
        self.species.insert(name.to_string(), Arc::new(arena));
    }

    /// Fill a species with `per_cell` particles in every physical cell, all
    /// carrying `momentum`
    pub fn insert_uniform_species(&mut self, name: &str, per_cell: u32, momentum: [f32; 3]) {
        let mut arena = self.empty_arena();
        let interior = arena.interior_buckets();
        let capacity = arena.frame_capacity() as u16;
        for z in 0..interior[2] {
            for y in 0..interior[1] {
                for x in 0..interior[0] {
                    for local_cell in 0..capacity {
                        for k in 0..per_cell {
                            let along = (k as f32 + 0.5) / per_cell as f32;
                            arena.push(
                                [x, y, z],
                                Particle {
                                    local_cell,
                                    in_cell: [along, 0.5, 0.5],
                                    momentum,
                                },
                            );
                        }
                    }
                }
            }
        }
        self.insert_species(name, arena);
    }

    /// Record one unit of outstanding asynchronous work
    pub fn enqueue_work(&mut self) {
        self.pending += 1;
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending > 0
    }

    /// Number of synchronization points reached
    pub fn wait_count(&self) -> u32 {
        self.waits
    }

    /// Number of derived quantities computed
    pub fn derived_computations(&self) -> u32 {
        self.derived
    }

    /// Particles held across all species
    pub fn particle_count(&self) -> usize {
        self.species.values().map(|a| a.len()).sum()
    }
}

impl SimulationData for HostSimulation {
    fn field(&self, quantity: &str) -> Option<Arc<FieldBuffer>> {
        self.fields.get(quantity).cloned()
    }

    fn compute_derived(
        &mut self,
        quantity: &DerivedQuantity,
        step: u32,
    ) -> Option<Arc<FieldBuffer>> {
        let solver = Solver::parse(&quantity.solver)?;
        let arena = self.species.get(&quantity.species)?;

        let mut buffer = FieldBuffer::zeros(self.layout(1));
        let bucket_size = arena.bucket_size();
        arena.for_each_particle(|bucket, particle| {
            let cell = arena.decode_local_cell(particle.local_cell);
            let mut index = [0i32; DIMENSIONS];
            for axis in 0..DIMENSIONS {
                index[axis] = (bucket[axis] * bucket_size[axis] + cell[axis]) as i32;
            }
            buffer.accumulate(index, solver.weight(particle));
        });

        self.derived += 1;
        self.enqueue_work();
        debug!(
            "Computed '{}' at step {} (sum {:.3})",
            quantity.name(),
            step,
            buffer.interior_sum()
        );
        Some(Arc::new(buffer))
    }

    fn particles(&self, species: &str) -> Option<Arc<ParticleArena>> {
        self.species.get(species).cloned()
    }

    fn wait_for_pending(&mut self) {
        self.pending = 0;
        self.waits += 1;
    }
}
