//! Host-visible field snapshots
//!
//! A [`FieldBuffer`] is one step's copy of a simulation field including its
//! guard region. Buffers are shared as `Arc` snapshots: the simulation
//! publishes a fresh buffer each step and sources swap their handle on
//! refresh, so a buffer is never mutated while a reader holds it.

use crate::types::{FeatureVector, Size3, DIMENSIONS};

/// Shape of a field buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Physical (non-guard) cells per axis
    pub interior: Size3,
    /// Guard cells on each side, per axis
    pub guard: Size3,
    /// Components per cell (1 or 3)
    pub components: u8,
}

impl FieldLayout {
    pub fn new(interior: Size3, guard: Size3, components: u8) -> Self {
        Self {
            interior,
            guard,
            components,
        }
    }

    /// Cells per axis including guards on both sides
    pub fn total(&self) -> Size3 {
        let mut total = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            total[axis] = self.interior[axis] + 2 * self.guard[axis];
        }
        total
    }

    /// Total number of cells including guards
    pub fn total_cells(&self) -> usize {
        self.total().iter().map(|&s| s as usize).product()
    }

    /// Linear cell index for an index given in physical coordinates
    /// (`[0, 0, 0]` is the first non-guard cell). Guard cells are reachable
    /// with negative indices or indices past the interior.
    pub fn linear_index(&self, physical: [i32; 3]) -> Option<usize> {
        let total = self.total();
        let mut linear = 0usize;
        let mut stride = 1usize;
        for axis in 0..DIMENSIONS {
            let shifted = physical[axis] as i64 + self.guard[axis] as i64;
            if shifted < 0 || shifted >= total[axis] as i64 {
                return None;
            }
            linear += shifted as usize * stride;
            stride *= total[axis] as usize;
        }
        Some(linear)
    }
}

/// One step's copy of a field, x-fastest, components interleaved
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBuffer {
    layout: FieldLayout,
    data: Vec<f32>,
}

impl FieldBuffer {
    /// A zero-filled buffer
    pub fn zeros(layout: FieldLayout) -> Self {
        Self {
            data: vec![0.0; layout.total_cells() * layout.components as usize],
            layout,
        }
    }

    /// Build a buffer by evaluating `f` at every physical cell; guard cells
    /// stay zero
    pub fn from_fn<F>(layout: FieldLayout, mut f: F) -> Self
    where
        F: FnMut([u32; 3]) -> FeatureVector,
    {
        let mut buffer = Self::zeros(layout);
        for z in 0..layout.interior[2] {
            for y in 0..layout.interior[1] {
                for x in 0..layout.interior[0] {
                    let value = f([x, y, z]);
                    buffer.set([x as i32, y as i32, z as i32], value);
                }
            }
        }
        buffer
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Read the value at a physical index
    pub fn get(&self, physical: [i32; 3]) -> Option<FeatureVector> {
        let cell = self.layout.linear_index(physical)?;
        let start = cell * self.layout.components as usize;
        match self.layout.components {
            1 => Some(FeatureVector::Scalar(self.data[start])),
            3 => Some(FeatureVector::Vector([
                self.data[start],
                self.data[start + 1],
                self.data[start + 2],
            ])),
            _ => None,
        }
    }

    /// Write the value at a physical index; extra or missing components are
    /// truncated or zero-filled to the buffer's width
    pub fn set(&mut self, physical: [i32; 3], value: FeatureVector) -> bool {
        let Some(cell) = self.layout.linear_index(physical) else {
            return false;
        };
        let width = self.layout.components as usize;
        let start = cell * width;
        let src = value.as_slice();
        for c in 0..width {
            self.data[start + c] = src.get(c).copied().unwrap_or(0.0);
        }
        true
    }

    /// Add `amount` to the first component at a physical index
    pub fn accumulate(&mut self, physical: [i32; 3], amount: f32) -> bool {
        let Some(cell) = self.layout.linear_index(physical) else {
            return false;
        };
        self.data[cell * self.layout.components as usize] += amount;
        true
    }

    /// Reset all values to zero
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Sum of the first component over the physical cells
    pub fn interior_sum(&self) -> f64 {
        let [nx, ny, nz] = self.layout.interior;
        let mut sum = 0.0f64;
        for z in 0..nz as i32 {
            for y in 0..ny as i32 {
                for x in 0..nx as i32 {
                    if let Some(v) = self.get([x, y, z]) {
                        sum += v.as_slice()[0] as f64;
                    }
                }
            }
        }
        sum
    }
}
