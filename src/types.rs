//! Core data types for insitu-steer
//!
//! This module contains the small value types shared by the source, topology
//! and session layers.
//!
//! # Main Types
//!
//! - [`SourceDescriptor`] - Static description of one registered data source
//! - [`FeatureVector`] - A 1- or 3-component sample value
//! - [`DomainBox`] - An offset/size pair in cell units
//! - [`DomainWindow`] - The geometry the renderer needs for one subdomain

use serde::{Deserialize, Serialize};

/// Three integer components, one per spatial axis (x, y, z).
pub type Int3 = [i64; 3];

/// Three unsigned components, one per spatial axis (x, y, z).
pub type Size3 = [u32; 3];

/// Number of spatial axes handled by the control plane.
pub const DIMENSIONS: usize = 3;

/// Static description of a registered source
///
/// Created once when the session registers its sources; the feature
/// dimension and persistence flag never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Display name, e.g. `"E field"` or `"e particle"`
    pub name: String,
    /// Number of components per sample (1 or 3)
    feature_dim: u8,
    /// Whether the renderer may keep this source's data between frames
    persistent: bool,
    /// Halo width (cells) the source exposes around the physical domain
    guard_width: u32,
}

impl SourceDescriptor {
    /// Create a descriptor for a scalar (1-component) source
    pub fn scalar(name: impl Into<String>, persistent: bool) -> Self {
        Self {
            name: name.into(),
            feature_dim: 1,
            persistent,
            guard_width: 0,
        }
    }

    /// Create a descriptor for a vector (3-component) source
    pub fn vector(name: impl Into<String>, persistent: bool) -> Self {
        Self {
            name: name.into(),
            feature_dim: 3,
            persistent,
            guard_width: 0,
        }
    }

    /// Expose a halo of `width` cells around the physical domain
    pub fn with_guard_width(mut self, width: u32) -> Self {
        self.guard_width = width;
        self
    }

    pub fn feature_dim(&self) -> u8 {
        self.feature_dim
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn guard_width(&self) -> u32 {
        self.guard_width
    }
}

/// A sampled value: one component for scalar quantities, three for vectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureVector {
    Scalar(f32),
    Vector([f32; 3]),
}

impl FeatureVector {
    /// Number of components
    pub fn dim(&self) -> usize {
        match self {
            FeatureVector::Scalar(_) => 1,
            FeatureVector::Vector(_) => 3,
        }
    }

    /// Components as a slice
    pub fn as_slice(&self) -> &[f32] {
        match self {
            FeatureVector::Scalar(v) => std::slice::from_ref(v),
            FeatureVector::Vector(v) => v,
        }
    }

    /// Euclidean magnitude (absolute value for scalars)
    pub fn magnitude(&self) -> f32 {
        self.as_slice().iter().map(|c| c * c).sum::<f32>().sqrt()
    }
}

/// An axis-aligned box in cell units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainBox {
    pub offset: Size3,
    pub size: Size3,
}

impl DomainBox {
    pub fn new(offset: Size3, size: Size3) -> Self {
        Self { offset, size }
    }

    /// Number of cells in the box
    pub fn volume(&self) -> u64 {
        self.size.iter().map(|&s| s as u64).product()
    }
}

/// Geometry of one subdomain as seen by the remote renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainWindow {
    pub global_size: Size3,
    pub local_size: Size3,
    pub local_offset: Int3,
}
