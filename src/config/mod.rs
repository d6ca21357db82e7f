//! Configuration module for insitu-steer
//!
//! This module holds the visualization session configuration: which steps are
//! visualized, where the viewer endpoint lives, framebuffer and image quality
//! settings, the reconnect policy, and the optional benchmark sink.
//!
//! Configuration is plain data. It can be built in code, deserialized from a
//! TOML file, or left at the defaults, which mirror the simulation's
//! command-line defaults.
//!
//! # Example
//!
//! ```ignore
//! use insitu_steer::config::VisConfig;
//!
//! let config = VisConfig::load("vis.toml")?;
//! config.validate()?;
//! ```
//!
//! A minimal TOML file:
//!
//! ```toml
//! period = "10"
//! url = "viewer.cluster.local"
//! port = 2460
//! reconnect = "fail_fast"
//! timings_filename = "timings.csv"
//! ```

pub mod period;

pub use period::StepPeriod;

use crate::error::{Result, ResultExt, VisError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default viewer endpoint host
pub const DEFAULT_URL: &str = "localhost";

/// Default viewer endpoint port
pub const DEFAULT_PORT: u16 = 2460;

/// Default framebuffer width per process
pub const DEFAULT_WIDTH: u32 = 1024;

/// Default framebuffer height per process
pub const DEFAULT_HEIGHT: u32 = 768;

/// Default image (JPEG) quality
pub const DEFAULT_QUALITY: u32 = 90;

/// Default delay between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Typical number of macro particles per cell, used to estimate the
/// particle count reported to the viewer
pub const DEFAULT_TYPICAL_PARTICLES_PER_CELL: u32 = 2;

/// What to do when the viewer endpoint cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Retry on every render step; blocks the step until connected
    #[default]
    RetryOnRender,
    /// Disable visualization permanently on the first failure
    FailFast,
}

impl ReconnectPolicy {
    /// Display name for the policy
    pub fn display_name(&self) -> &'static str {
        match self {
            ReconnectPolicy::RetryOnRender => "Retry on render",
            ReconnectPolicy::FailFast => "Fail fast",
        }
    }
}

/// Visualization session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisConfig {
    /// Steps on which the session is notified; empty disables visualization
    pub period: StepPeriod,

    /// Name of the simulation as shown by the viewer
    pub name: String,

    /// Viewer endpoint host
    pub url: String,

    /// Viewer endpoint port
    pub port: u16,

    /// Framebuffer width per process
    pub width: u32,

    /// Framebuffer height per process
    pub height: u32,

    /// Pause right after the first rendered frame
    pub direct_pause: bool,

    /// Image quality (1-100)
    pub quality: u32,

    /// Reconnect behaviour when the endpoint is unreachable
    pub reconnect: ReconnectPolicy,

    /// Delay between reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,

    /// Benchmark CSV sink; benchmarking is off when unset
    pub timings_filename: Option<PathBuf>,

    /// Typical particles per cell, for the reported particle count
    pub typical_particles_per_cell: u32,

    /// Directory for log files (binary only)
    pub log_dir: Option<PathBuf>,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            period: StepPeriod::every_step(),
            name: String::from("default"),
            url: DEFAULT_URL.to_string(),
            port: DEFAULT_PORT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            direct_pause: false,
            quality: DEFAULT_QUALITY,
            reconnect: ReconnectPolicy::default(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            timings_filename: None,
            typical_particles_per_cell: DEFAULT_TYPICAL_PARTICLES_PER_CELL,
            log_dir: None,
        }
    }
}

impl VisConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VisError::Config(format!(
                "Framebuffer size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(VisError::Config(format!(
                "Quality must be within 1..=100, got {}",
                self.quality
            )));
        }
        if self.url.trim().is_empty() {
            return Err(VisError::Config("Viewer url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether visualization is switched on at all
    pub fn is_enabled(&self) -> bool {
        !self.period.is_disabled()
    }

    /// Whether a benchmark sink is configured
    pub fn is_benchmarking(&self) -> bool {
        self.timings_filename.is_some()
    }

    /// Delay between reconnect attempts
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// `host:port` of the viewer endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.url, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VisConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.endpoint(), "localhost:2460");
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.quality, 90);
        assert_eq!(config.reconnect, ReconnectPolicy::RetryOnRender);
        assert!(!config.direct_pause);
        assert!(config.is_enabled());
        assert!(!config.is_benchmarking());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = VisConfig::from_toml(
            r#"
            period = "5"
            url = "viewer"
            reconnect = "fail_fast"
            timings_filename = "t.csv"
            "#,
        )
        .unwrap();
        assert!(config.period.includes(10));
        assert!(!config.period.includes(11));
        assert_eq!(config.url, "viewer");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.reconnect, ReconnectPolicy::FailFast);
        assert!(config.is_benchmarking());
    }

    #[test]
    fn test_empty_period_disables() {
        let config = VisConfig::from_toml(r#"period = """#).unwrap();
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_bad_period_rejected() {
        assert!(VisConfig::from_toml(r#"period = "x""#).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = VisConfig::default();
        config.quality = 0;
        assert!(config.validate().is_err());

        let mut config = VisConfig::default();
        config.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = VisConfig::load("/nonexistent/vis.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
