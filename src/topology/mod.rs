//! Topology and moving-window tracking
//!
//! The remote renderer composites the partial images of all processes, so it
//! needs to know where each subdomain sits and who its neighbours are. Both
//! can change during a moving-window run: the window slides along the
//! advance axis and the process that is "first" along that axis changes.
//!
//! The grid subsystem owns the geometry and is queried read-only through the
//! [`GridDecomposition`] trait. [`TopologyTracker`] derives the values the
//! renderer needs and remembers the previous ones so callers can tell what
//! changed.

pub mod exchange;

pub use exchange::{Exchange, NeighbourTable, EXCHANGE_COUNT, NEIGHBOUR_SLOTS};

use crate::types::{DomainBox, DomainWindow, Int3, Size3, DIMENSIONS};

/// Axis along which the moving window advances (y)
pub const WINDOW_ADVANCE_AXIS: usize = 1;

/// Geometry of the moving window at one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    /// The window in global coordinates
    pub global: DomainBox,
    /// This process's part of the window, offset in window coordinates
    pub local: DomainBox,
}

/// Read-only view of the domain decomposition
///
/// Implemented by the grid subsystem; every process derives its own view
/// independently from shared decomposition metadata.
pub trait GridDecomposition {
    /// Size of the simulated global domain in cells
    fn global_size(&self) -> Size3;

    /// This process's subdomain (without guard cells)
    fn local_domain(&self) -> DomainBox;

    /// Position of this process in the process grid
    fn process_position(&self) -> Size3;

    /// Rank owning the neighbouring subdomain in direction `exchange`
    fn neighbour_rank(&self, exchange: Exchange) -> Option<u32>;

    /// Whether the run uses a moving window
    fn moving_window(&self) -> bool;

    /// Window geometry at `step`
    fn window(&self, step: u32) -> WindowGeometry;
}

/// Result of [`TopologyTracker::update_window`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    /// Local offset to report to the renderer
    pub offset: Int3,
    /// Whether the offset differs from the previous update
    pub changed: bool,
}

/// Result of [`TopologyTracker::update_neighbours`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourUpdate {
    pub table: NeighbourTable,
    /// Directions whose rank changed since the previous update
    pub changed: Vec<Exchange>,
}

/// Tracks the local offset and neighbour table of one process
#[derive(Debug, Clone, Default)]
pub struct TopologyTracker {
    window: DomainWindow,
    neighbours: NeighbourTable,
    initialized: bool,
}

impl TopologyTracker {
    /// Capture the initial geometry from the decomposition
    pub fn new(grid: &dyn GridDecomposition) -> Self {
        let local = grid.local_domain();
        let window = DomainWindow {
            global_size: grid.window(0).global.size,
            local_size: local.size,
            local_offset: local.offset.map(i64::from),
        };
        Self {
            window,
            neighbours: NeighbourTable::empty(),
            initialized: false,
        }
    }

    /// Current window as last reported
    pub fn window(&self) -> DomainWindow {
        self.window
    }

    /// Current neighbour table as last reported
    pub fn neighbours(&self) -> &NeighbourTable {
        &self.neighbours
    }

    /// Whether this process sits at the leading edge of the moving window
    pub fn is_leading_edge(grid: &dyn GridDecomposition) -> bool {
        grid.process_position()[WINDOW_ADVANCE_AXIS] == 0
    }

    /// Recompute the local offset for `step`
    ///
    /// Processes at the leading edge expose the window slid to the newly
    /// entered upstream cells (window offset + window size - local size);
    /// all others report the window offset unchanged. Without a moving
    /// window the offset stays at the static local domain offset.
    pub fn update_window(&mut self, step: u32, grid: &dyn GridDecomposition) -> WindowUpdate {
        if !grid.moving_window() {
            return WindowUpdate {
                offset: self.window.local_offset,
                changed: false,
            };
        }

        let window = grid.window(step);
        let local = grid.local_domain();
        let leading = Self::is_leading_edge(grid);

        let mut offset: Int3 = [0; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            let window_offset = i64::from(window.local.offset[axis]);
            offset[axis] = if leading {
                window_offset + i64::from(window.local.size[axis]) - i64::from(local.size[axis])
            } else {
                window_offset
            };
        }

        let changed = offset != self.window.local_offset;
        self.window.local_offset = offset;
        self.window.global_size = window.global.size;
        self.window.local_size = local.size;

        WindowUpdate { offset, changed }
    }

    /// Query the rank of every neighbouring subdomain
    pub fn update_neighbours(&mut self, grid: &dyn GridDecomposition) -> NeighbourUpdate {
        let mut table = NeighbourTable::empty();
        for exchange in Exchange::neighbours() {
            table.set(exchange, grid.neighbour_rank(exchange));
        }

        let changed = if self.initialized {
            self.neighbours.diff(&table)
        } else {
            table.iter().map(|(ex, _)| ex).collect()
        };

        self.neighbours = table;
        self.initialized = true;

        NeighbourUpdate { table, changed }
    }
}
