//! Name-indexed set of source adapters
//!
//! Built-in adapters are held in the [`AnySource`] enum so the per-step
//! refresh loop dispatches without a vtable; external adapters go through
//! the `Plugin` variant.

use super::{DataSource, DerivedFieldSource, FieldSource, ParticleSource, StepContext};
use crate::error::{Result, ResultExt, VisError};
use crate::types::{FeatureVector, SourceDescriptor};
use tracing::debug;

/// Either a built-in adapter (enum dispatch) or a plugin (trait object)
pub enum AnySource {
    Field(FieldSource),
    Derived(DerivedFieldSource),
    Particles(ParticleSource),
    Plugin(Box<dyn DataSource>),
}

impl AnySource {
    pub fn descriptor(&self) -> &SourceDescriptor {
        match self {
            AnySource::Field(s) => s.descriptor(),
            AnySource::Derived(s) => s.descriptor(),
            AnySource::Particles(s) => s.descriptor(),
            AnySource::Plugin(s) => s.descriptor(),
        }
    }

    pub fn refresh(&mut self, enabled: bool, ctx: &mut StepContext<'_>) -> Result<()> {
        match self {
            AnySource::Field(s) => s.refresh(enabled, ctx),
            AnySource::Derived(s) => s.refresh(enabled, ctx),
            AnySource::Particles(s) => s.refresh(enabled, ctx),
            AnySource::Plugin(s) => s.refresh(enabled, ctx),
        }
    }

    pub fn sample(&self, index: [i32; 3]) -> Option<FeatureVector> {
        match self {
            AnySource::Field(s) => s.sample(index),
            AnySource::Derived(s) => s.sample(index),
            AnySource::Particles(s) => s.sample(index),
            AnySource::Plugin(s) => s.sample(index),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            AnySource::Field(s) => s.is_ready(),
            AnySource::Derived(s) => s.is_ready(),
            AnySource::Particles(s) => s.is_ready(),
            AnySource::Plugin(s) => s.is_ready(),
        }
    }

    pub fn release(&mut self) {
        match self {
            AnySource::Field(s) => s.release(),
            AnySource::Derived(s) => s.release(),
            AnySource::Particles(s) => s.release(),
            AnySource::Plugin(s) => s.release(),
        }
    }

    /// The particle adapter, if this is one
    pub fn as_particles(&self) -> Option<&ParticleSource> {
        match self {
            AnySource::Particles(s) => Some(s),
            _ => None,
        }
    }
}

impl From<FieldSource> for AnySource {
    fn from(source: FieldSource) -> Self {
        AnySource::Field(source)
    }
}

impl From<DerivedFieldSource> for AnySource {
    fn from(source: DerivedFieldSource) -> Self {
        AnySource::Derived(source)
    }
}

impl From<ParticleSource> for AnySource {
    fn from(source: ParticleSource) -> Self {
        AnySource::Particles(source)
    }
}

struct Entry {
    source: AnySource,
    enabled: bool,
}

/// Ordered collection of sources, unique by name
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<Entry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; names must be unique
    pub fn register(&mut self, source: impl Into<AnySource>) -> Result<()> {
        let source = source.into();
        let name = source.descriptor().name.clone();
        if self.position(&name).is_some() {
            return Err(VisError::Config(format!("Duplicate source name '{}'", name)));
        }
        debug!("Registered source '{}'", name);
        self.entries.push(Entry {
            source,
            enabled: true,
        });
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, source: impl Into<AnySource>) -> Result<Self> {
        self.register(source)?;
        Ok(self)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.source.descriptor().name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enable or disable extraction for a source; returns `false` if unknown
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries[i].enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.position(name)
            .map(|i| self.entries[i].enabled)
            .unwrap_or(false)
    }

    /// Refresh every source in registration order
    pub fn refresh_all(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        for entry in &mut self.entries {
            let enabled = entry.enabled;
            entry
                .source
                .refresh(enabled, ctx)
                .with_context(|| format!("Failed to refresh '{}'", entry.source.descriptor().name))?;
        }
        Ok(())
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<&SourceDescriptor> {
        self.entries.iter().map(|e| e.source.descriptor()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AnySource> {
        self.position(name).map(|i| &self.entries[i].source)
    }

    /// Particle adapter by display name (`"<species> particle"`)
    pub fn particle(&self, name: &str) -> Option<&ParticleSource> {
        self.get(name).and_then(AnySource::as_particles)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnySource> {
        self.entries.iter().map(|e| &e.source)
    }

    /// Number of particle species registered
    pub fn particle_source_count(&self) -> usize {
        self.iter().filter(|s| s.as_particles().is_some()).count()
    }

    /// Drop every held snapshot
    pub fn clear_snapshots(&mut self) {
        for entry in &mut self.entries {
            entry.source.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSimulation;
    use crate::source::DerivedQuantity;

    fn registry() -> SourceRegistry {
        SourceRegistry::new()
            .with(FieldSource::vector("E", true))
            .unwrap()
            .with(DerivedFieldSource::new(DerivedQuantity::new("e", "all", "Density")))
            .unwrap()
            .with(ParticleSource::new("e"))
            .unwrap()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = registry();
        assert!(reg.register(FieldSource::vector("E", false)).is_err());
        // same quantity, different category, different name
        assert!(reg.register(FieldSource::vector_field("E", false)).is_ok());
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_descriptor_order_and_lookup() {
        let reg = registry();
        let names: Vec<_> = reg.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["E field", "e all Density", "e particle"]);
        assert!(reg.particle("e particle").is_some());
        assert!(reg.particle("E field").is_none());
        assert_eq!(reg.particle_source_count(), 1);
    }

    #[test]
    fn test_refresh_all_and_release() {
        let mut data = HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2]);
        data.insert_vector_field("E", |_| [1.0, 0.0, 0.0]);
        data.insert_uniform_species("e", 1, [0.0; 3]);

        let mut reg = registry();
        reg.refresh_all(&mut StepContext::new(0, &mut data)).unwrap();
        assert!(reg.iter().all(AnySource::is_ready));

        reg.clear_snapshots();
        assert!(reg.iter().all(|s| !s.is_ready()));
    }

    #[test]
    fn test_disabled_source_not_refreshed() {
        let mut data = HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2]);
        data.insert_vector_field("E", |_| [1.0, 0.0, 0.0]);
        data.insert_uniform_species("e", 1, [0.0; 3]);

        let mut reg = registry();
        assert!(reg.set_enabled("e all Density", false));
        assert!(!reg.set_enabled("nope", false));
        reg.refresh_all(&mut StepContext::new(0, &mut data)).unwrap();
        assert!(!reg.get("e all Density").unwrap().is_ready());
        assert_eq!(data.derived_computations(), 0);
    }

    #[test]
    fn test_missing_quantity_propagates_as_fatal() {
        let mut data = HostSimulation::new([4, 4, 4], [1, 1, 1], [2, 2, 2]);
        let mut reg = registry();
        let err = reg
            .refresh_all(&mut StepContext::new(0, &mut data))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("E field"));
    }
}
