//! Test data builders for creating test objects

use insitu_steer::config::{ReconnectPolicy, StepPeriod, VisConfig};
use insitu_steer::host::{HostSimulation, StaticDecomposition};
use insitu_steer::source::{FieldSource, SourceRegistry};
use std::path::PathBuf;

/// Local subdomain used by the single-process fixtures
pub const LOCAL_SIZE: [u32; 3] = [4, 4, 4];

/// Builder for creating test configurations
pub struct ConfigBuilder {
    config: VisConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: VisConfig {
                name: "test".to_string(),
                reconnect_delay_ms: 1,
                ..Default::default()
            },
        }
    }

    pub fn period(mut self, period: &str) -> Self {
        self.config.period = period.parse().unwrap_or_else(|_| StepPeriod::disabled());
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn direct_pause(mut self, direct_pause: bool) -> Self {
        self.config.direct_pause = direct_pause;
        self
    }

    pub fn timings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.timings_filename = Some(path.into());
        self
    }

    pub fn build(self) -> VisConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-process grid over [`LOCAL_SIZE`]
pub fn solo_grid() -> StaticDecomposition {
    StaticDecomposition::new([1, 1, 1], LOCAL_SIZE, [0, 0, 0])
}

/// A simulation holding a uniform `E` field
pub fn field_simulation() -> HostSimulation {
    let mut sim = HostSimulation::new(LOCAL_SIZE, [1, 1, 1], [2, 2, 2]);
    sim.insert_vector_field("E", |_| [1.0, 0.0, 0.0]);
    sim
}

/// A registry exposing the `E` field only
pub fn field_sources() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry
        .register(FieldSource::vector("E", true))
        .expect("register E");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .period("5")
            .reconnect(ReconnectPolicy::FailFast)
            .direct_pause(true)
            .build();

        assert!(config.is_enabled());
        assert!(config.period.includes(10));
        assert!(!config.period.includes(3));
        assert_eq!(config.reconnect, ReconnectPolicy::FailFast);
        assert!(config.direct_pause);
        assert!(!config.is_benchmarking());
    }
}
