//! Regular process grid with an optional moving window

use crate::topology::{Exchange, GridDecomposition, WindowGeometry, WINDOW_ADVANCE_AXIS};
use crate::types::{DomainBox, Size3, DIMENSIONS};
use std::cell::Cell;

/// A decomposition of the global domain into equally sized subdomains
///
/// With a moving window the window advances one cell along y every
/// `slide_every` steps. Each time a full slice of subdomains has been passed,
/// the process grid rotates along y by one row: the process that held the
/// trailing row takes over the newly entered row at the leading edge.
#[derive(Debug, Clone)]
pub struct StaticDecomposition {
    proc_grid: Size3,
    local_size: Size3,
    /// Position of this process at step 0
    home: Size3,
    periodic: [bool; 3],
    moving: bool,
    slide_every: u32,
    step: Cell<u32>,
}

impl StaticDecomposition {
    pub fn new(proc_grid: Size3, local_size: Size3, position: Size3) -> Self {
        Self {
            proc_grid,
            local_size,
            home: position,
            periodic: [true; 3],
            moving: false,
            slide_every: 1,
            step: Cell::new(0),
        }
    }

    /// The decomposition as seen by `rank` (x fastest)
    pub fn for_rank(proc_grid: Size3, local_size: Size3, rank: u32) -> Self {
        let [gx, gy, _] = proc_grid;
        let position = [rank % gx, (rank / gx) % gy, rank / (gx * gy)];
        Self::new(proc_grid, local_size, position)
    }

    pub fn with_periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn with_moving_window(mut self, moving: bool) -> Self {
        self.moving = moving;
        // the axis the window moves along is never periodic
        if moving {
            self.periodic[WINDOW_ADVANCE_AXIS] = false;
        }
        self
    }

    /// Steps per cell of window movement
    pub fn with_slide_every(mut self, steps: u32) -> Self {
        self.slide_every = steps.max(1);
        self
    }

    /// Current simulation step, used for the process position
    pub fn set_step(&self, step: u32) {
        self.step.set(step);
    }

    pub fn rank(&self) -> u32 {
        self.rank_at(self.home)
    }

    pub fn process_count(&self) -> u32 {
        self.proc_grid.iter().product()
    }

    fn rank_at(&self, position: Size3) -> u32 {
        let [gx, gy, _] = self.proc_grid;
        position[0] + position[1] * gx + position[2] * gx * gy
    }

    /// Cells slid so far, split into full slices and the remainder
    fn slide(&self, step: u32) -> (u32, u32) {
        if !self.moving {
            return (0, 0);
        }
        let cells = step / self.slide_every;
        let ly = self.local_size[WINDOW_ADVANCE_AXIS].max(1);
        (cells / ly, cells % ly)
    }

    /// Grid row currently held by a process whose home row is `home_y`
    fn effective_row(&self, home_y: u32, step: u32) -> u32 {
        let gy = self.proc_grid[WINDOW_ADVANCE_AXIS];
        let (slices, _) = self.slide(step);
        (home_y + gy - slices % gy) % gy
    }

    fn home_row(&self, effective_y: u32, step: u32) -> u32 {
        let gy = self.proc_grid[WINDOW_ADVANCE_AXIS];
        let (slices, _) = self.slide(step);
        (effective_y + slices) % gy
    }

    fn position_at(&self, step: u32) -> Size3 {
        let mut position = self.home;
        position[WINDOW_ADVANCE_AXIS] = self.effective_row(self.home[WINDOW_ADVANCE_AXIS], step);
        position
    }
}

impl GridDecomposition for StaticDecomposition {
    fn global_size(&self) -> Size3 {
        let mut size = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            size[axis] = self.proc_grid[axis] * self.local_size[axis];
        }
        size
    }

    fn local_domain(&self) -> DomainBox {
        let position = self.process_position();
        let mut offset = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            offset[axis] = position[axis] * self.local_size[axis];
        }
        DomainBox::new(offset, self.local_size)
    }

    fn process_position(&self) -> Size3 {
        self.position_at(self.step.get())
    }

    fn neighbour_rank(&self, exchange: Exchange) -> Option<u32> {
        let step = self.step.get();
        let position = self.position_at(step);
        let offset = exchange.offset();
        let mut target = [0u32; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            let extent = self.proc_grid[axis] as i64;
            let p = position[axis] as i64 + offset[axis] as i64;
            target[axis] = if (0..extent).contains(&p) {
                p as u32
            } else if self.periodic[axis] {
                p.rem_euclid(extent) as u32
            } else {
                return None;
            };
        }
        target[WINDOW_ADVANCE_AXIS] = self.home_row(target[WINDOW_ADVANCE_AXIS], step);
        Some(self.rank_at(target))
    }

    fn moving_window(&self) -> bool {
        self.moving
    }

    fn window(&self, step: u32) -> WindowGeometry {
        let global_size = self.global_size();
        let position = self.position_at(step);
        let gy = self.proc_grid[WINDOW_ADVANCE_AXIS];
        let ly = self.local_size[WINDOW_ADVANCE_AXIS];
        let (slices, sub) = self.slide(step);

        let mut global = DomainBox::new([0; DIMENSIONS], global_size);
        let mut local = DomainBox::default();
        for axis in 0..DIMENSIONS {
            local.offset[axis] = position[axis] * self.local_size[axis];
            local.size[axis] = self.local_size[axis];
        }

        if self.moving {
            // the window trails the leading edge by one slice of subdomains
            if gy > 1 {
                global.size[WINDOW_ADVANCE_AXIS] = (gy - 1) * ly;
            }
            global.offset[WINDOW_ADVANCE_AXIS] = slices * ly + sub;

            let row = position[WINDOW_ADVANCE_AXIS];
            let (offset, size) = if row == 0 {
                (0, ly - sub)
            } else if row == gy - 1 {
                (row * ly - sub, sub)
            } else {
                (row * ly - sub, ly)
            };
            local.offset[WINDOW_ADVANCE_AXIS] = offset;
            local.size[WINDOW_ADVANCE_AXIS] = size;
        }

        WindowGeometry { global, local }
    }
}
