//! Particle storage and per-cell iteration
//!
//! Particles are grouped by bucket (a block of cells, the "supercell").
//! Each bucket owns a chain of fixed-capacity frames stored in one arena;
//! a bucket records the index of its first and last frame and each frame
//! records the index of the next one. Frame capacity equals the number of
//! cells in a bucket.
//!
//! Iteration is an index-based cursor over that chain: it never allocates,
//! moves forward only, and crosses frame boundaries transparently.

use crate::types::{Size3, DIMENSIONS};

/// Radius every particle is drawn with, in bucket-relative units
pub const PARTICLE_RADIUS: f32 = 0.2;

/// One macro particle as stored in a frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Linear index (x fastest) of the particle's cell inside its bucket
    pub local_cell: u16,
    /// Position inside the cell, each component in `[0, 1)`
    pub in_cell: [f32; 3],
    pub momentum: [f32; 3],
}

/// What a renderer sees for one particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleView {
    /// Position normalized to the bucket, each component in `[0, 1)`
    pub position: [f32; 3],
    /// Per-particle attribute (momentum)
    pub attribute: [f32; 3],
    pub radius: f32,
}

#[derive(Debug, Clone)]
struct Frame {
    particles: Vec<Particle>,
    next: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    head: Option<u32>,
    tail: Option<u32>,
    count: u32,
}

/// Arena of particle frames for one species on one process
#[derive(Debug, Clone)]
pub struct ParticleArena {
    bucket_size: Size3,
    /// Buckets per axis, guard buckets included
    grid: Size3,
    /// Guard buckets on each side, per axis
    guard: Size3,
    frames: Vec<Frame>,
    buckets: Vec<Bucket>,
}

impl ParticleArena {
    /// Create an empty arena
    ///
    /// `interior_buckets` is the number of physical buckets per axis,
    /// `guard` the number of guard buckets on each side.
    pub fn new(bucket_size: Size3, interior_buckets: Size3, guard: Size3) -> Self {
        let mut grid = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            grid[axis] = interior_buckets[axis] + 2 * guard[axis];
        }
        let bucket_count = grid.iter().map(|&g| g as usize).product();
        Self {
            bucket_size,
            grid,
            guard,
            frames: Vec::new(),
            buckets: vec![Bucket::default(); bucket_count],
        }
    }

    /// Cells per bucket along each axis
    pub fn bucket_size(&self) -> Size3 {
        self.bucket_size
    }

    /// Physical buckets per axis
    pub fn interior_buckets(&self) -> Size3 {
        let mut interior = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            interior[axis] = self.grid[axis] - 2 * self.guard[axis];
        }
        interior
    }

    pub fn guard(&self) -> Size3 {
        self.guard
    }

    /// Maximum number of particles in one frame
    pub fn frame_capacity(&self) -> usize {
        self.bucket_size.iter().map(|&s| s as usize).product()
    }

    /// Number of allocated frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total number of particles
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.count as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode a linear in-bucket cell index into per-axis cell coordinates
    pub fn decode_local_cell(&self, local_cell: u16) -> [u32; 3] {
        let [sx, sy, _] = self.bucket_size;
        let idx = local_cell as u32;
        [idx % sx, (idx / sx) % sy, idx / (sx * sy)]
    }

    /// Encode per-axis in-bucket cell coordinates into a linear index
    pub fn encode_local_cell(&self, cell: [u32; 3]) -> Option<u16> {
        let [sx, sy, sz] = self.bucket_size;
        if cell[0] >= sx || cell[1] >= sy || cell[2] >= sz {
            return None;
        }
        u16::try_from(cell[0] + cell[1] * sx + cell[2] * sx * sy).ok()
    }

    /// Bucket slot for a bucket coordinate given in arena coordinates
    /// (guard buckets included)
    fn bucket_slot(&self, total: [u32; 3]) -> Option<usize> {
        if (0..DIMENSIONS).any(|a| total[a] >= self.grid[a]) {
            return None;
        }
        let [gx, gy, _] = self.grid;
        Some(total[0] as usize + total[1] as usize * gx as usize + total[2] as usize * (gx * gy) as usize)
    }

    fn physical_to_total(&self, bucket: [u32; 3]) -> [u32; 3] {
        let mut total = bucket;
        for axis in 0..DIMENSIONS {
            total[axis] += self.guard[axis];
        }
        total
    }

    /// Append a particle to a physical bucket, allocating a new frame when
    /// the bucket's last frame is full. Returns `false` for an out-of-range
    /// bucket or cell.
    pub fn push(&mut self, bucket: [u32; 3], particle: Particle) -> bool {
        if particle.local_cell as usize >= self.frame_capacity() {
            return false;
        }
        let Some(slot) = self.bucket_slot(self.physical_to_total(bucket)) else {
            return false;
        };

        let capacity = self.frame_capacity();
        let tail_has_room = self.buckets[slot]
            .tail
            .map(|t| self.frames[t as usize].particles.len() < capacity)
            .unwrap_or(false);

        if !tail_has_room {
            let index = self.frames.len() as u32;
            self.frames.push(Frame {
                particles: Vec::with_capacity(capacity),
                next: None,
            });
            let b = &mut self.buckets[slot];
            match b.tail {
                Some(t) => self.frames[t as usize].next = Some(index),
                None => b.head = Some(index),
            }
            b.tail = Some(index);
        }

        let b = &mut self.buckets[slot];
        if let Some(t) = b.tail {
            self.frames[t as usize].particles.push(particle);
            b.count += 1;
        }
        true
    }

    /// Number of particles in a physical bucket
    pub fn bucket_len(&self, bucket: [u32; 3]) -> usize {
        self.bucket_slot(self.physical_to_total(bucket))
            .map(|s| self.buckets[s].count as usize)
            .unwrap_or(0)
    }

    /// Start iterating the particles of a physical bucket
    pub fn cursor(&self, bucket: [u32; 3]) -> Option<ParticleCursor<'_>> {
        let slot = self.bucket_slot(self.physical_to_total(bucket))?;
        let b = self.buckets[slot];
        Some(ParticleCursor {
            arena: self,
            frame: b.head,
            slot: 0,
            remaining: b.count as usize,
        })
    }

    /// Visit every particle with its physical bucket coordinate
    pub fn for_each_particle<F>(&self, mut f: F)
    where
        F: FnMut([u32; 3], &Particle),
    {
        let interior = self.interior_buckets();
        for z in 0..interior[2] {
            for y in 0..interior[1] {
                for x in 0..interior[0] {
                    let bucket = [x, y, z];
                    let Some(slot) = self.bucket_slot(self.physical_to_total(bucket)) else {
                        continue;
                    };
                    let mut frame = self.buckets[slot].head;
                    while let Some(f_idx) = frame {
                        let fr = &self.frames[f_idx as usize];
                        for p in &fr.particles {
                            f(bucket, p);
                        }
                        frame = fr.next;
                    }
                }
            }
        }
    }

    fn view(&self, particle: &Particle) -> ParticleView {
        let cell = self.decode_local_cell(particle.local_cell);
        let mut position = [0.0f32; 3];
        for axis in 0..DIMENSIONS {
            position[axis] =
                (particle.in_cell[axis] + cell[axis] as f32) * (1.0 / self.bucket_size[axis] as f32);
        }
        ParticleView {
            position,
            attribute: particle.momentum,
            radius: PARTICLE_RADIUS,
        }
    }
}

/// Forward-only cursor over one bucket's particles
///
/// Borrowing the arena ties the cursor to one step's snapshot; it is not
/// `Clone` and is meant to be consumed by a single reader.
pub struct ParticleCursor<'a> {
    arena: &'a ParticleArena,
    frame: Option<u32>,
    slot: usize,
    remaining: usize,
}

impl ParticleCursor<'_> {
    /// Particles left to visit
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Iterator for ParticleCursor<'_> {
    type Item = ParticleView;

    fn next(&mut self) -> Option<ParticleView> {
        while self.remaining > 0 {
            let frame = &self.arena.frames[self.frame? as usize];
            if self.slot < frame.particles.len() {
                let view = self.arena.view(&frame.particles[self.slot]);
                self.slot += 1;
                self.remaining -= 1;
                return Some(view);
            }
            self.frame = frame.next;
            self.slot = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ParticleCursor<'_> {}
