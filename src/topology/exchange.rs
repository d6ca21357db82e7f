//! Exchange directions and the neighbour table
//!
//! Directions are encoded as base-3 digits, one per axis: digit 1 is the
//! positive and digit 2 the negative neighbour along that axis. This gives
//! 27 codes, where 0 is the process itself and 1..=26 are the spatial
//! neighbours (faces, edges and corners).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of exchange codes including the self slot
pub const EXCHANGE_COUNT: usize = 27;

/// Number of neighbour slots (all exchanges except self)
pub const NEIGHBOUR_SLOTS: usize = EXCHANGE_COUNT - 1;

/// A direction towards a neighbouring subdomain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exchange(u8);

impl Exchange {
    pub const SELF: Exchange = Exchange(0);
    pub const RIGHT: Exchange = Exchange(1);
    pub const LEFT: Exchange = Exchange(2);
    pub const BOTTOM: Exchange = Exchange(3);
    pub const TOP: Exchange = Exchange(6);
    pub const BACK: Exchange = Exchange(9);
    pub const FRONT: Exchange = Exchange(18);

    /// Build from a raw code, `None` if out of range
    pub fn from_code(code: u8) -> Option<Self> {
        ((code as usize) < EXCHANGE_COUNT).then_some(Self(code))
    }

    /// Build from a per-axis offset in `{-1, 0, 1}`
    pub fn from_offset(offset: [i8; 3]) -> Option<Self> {
        let mut code = 0u8;
        let mut weight = 1u8;
        for o in offset {
            code += match o {
                0 => 0,
                1 => weight,
                -1 => 2 * weight,
                _ => return None,
            };
            weight *= 3;
        }
        Some(Self(code))
    }

    /// Per-axis offset of this direction
    pub fn offset(self) -> [i8; 3] {
        let mut code = self.0;
        let mut out = [0i8; 3];
        for axis in out.iter_mut() {
            *axis = match code % 3 {
                1 => 1,
                2 => -1,
                _ => 0,
            };
            code /= 3;
        }
        out
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Whether this is the self slot
    pub fn is_self(self) -> bool {
        self.0 == 0
    }

    /// All 26 neighbour directions in code order
    pub fn neighbours() -> impl Iterator<Item = Exchange> {
        (1..EXCHANGE_COUNT as u8).map(Exchange)
    }

    /// The direction pointing the opposite way
    pub fn opposite(self) -> Exchange {
        let [x, y, z] = self.offset();
        // offsets are in {-1, 0, 1}, so negation stays in range
        Exchange::from_offset([-x, -y, -z]).unwrap_or(Exchange::SELF)
    }

    fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.offset();
        write!(f, "Exchange({}: {:+},{:+},{:+})", self.0, x, y, z)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rank of the process owning each neighbouring subdomain
///
/// `None` marks a missing neighbour (non-periodic domain boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NeighbourTable {
    ranks: [Option<u32>; NEIGHBOUR_SLOTS],
}

impl NeighbourTable {
    /// A table with no neighbours at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rank in direction `exchange`; always `None` for the self slot
    pub fn get(&self, exchange: Exchange) -> Option<u32> {
        exchange.slot().and_then(|s| self.ranks[s])
    }

    /// Set the rank in direction `exchange`; the self slot is ignored
    pub fn set(&mut self, exchange: Exchange, rank: Option<u32>) {
        if let Some(s) = exchange.slot() {
            self.ranks[s] = rank;
        }
    }

    /// Iterate over `(direction, rank)` for all 26 slots
    pub fn iter(&self) -> impl Iterator<Item = (Exchange, Option<u32>)> + '_ {
        Exchange::neighbours().zip(self.ranks.iter().copied())
    }

    /// Number of slots with a neighbour
    pub fn neighbour_count(&self) -> usize {
        self.ranks.iter().filter(|r| r.is_some()).count()
    }

    /// Directions whose rank differs between `self` and `other`
    pub fn diff(&self, other: &NeighbourTable) -> Vec<Exchange> {
        self.iter()
            .zip(other.iter())
            .filter(|((_, a), (_, b))| a != b)
            .map(|((ex, _), _)| ex)
            .collect()
    }

    /// Wire form with 27 entries (self slot included) and `-1` as the
    /// missing-neighbour sentinel
    pub fn to_wire(&self) -> [i64; EXCHANGE_COUNT] {
        let mut out = [-1i64; EXCHANGE_COUNT];
        for (ex, rank) in self.iter() {
            out[ex.code() as usize] = rank.map(i64::from).unwrap_or(-1);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_codes() {
        assert_eq!(Exchange::from_offset([1, 0, 0]), Some(Exchange::RIGHT));
        assert_eq!(Exchange::from_offset([-1, 0, 0]), Some(Exchange::LEFT));
        assert_eq!(Exchange::from_offset([0, 1, 0]), Some(Exchange::BOTTOM));
        assert_eq!(Exchange::from_offset([0, -1, 0]), Some(Exchange::TOP));
        assert_eq!(Exchange::from_offset([0, 0, 1]), Some(Exchange::BACK));
        assert_eq!(Exchange::from_offset([0, 0, -1]), Some(Exchange::FRONT));
        assert_eq!(Exchange::from_offset([0, 0, 0]), Some(Exchange::SELF));
        assert_eq!(Exchange::from_offset([2, 0, 0]), None);
    }

    #[test]
    fn test_offset_roundtrip_all_codes() {
        for code in 0..EXCHANGE_COUNT as u8 {
            let ex = Exchange::from_code(code).unwrap();
            assert_eq!(Exchange::from_offset(ex.offset()), Some(ex));
        }
        assert_eq!(Exchange::from_code(27), None);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(Exchange::RIGHT.opposite(), Exchange::LEFT);
        assert_eq!(Exchange::TOP.opposite(), Exchange::BOTTOM);
        let corner = Exchange::from_offset([1, -1, 1]).unwrap();
        assert_eq!(corner.opposite().offset(), [-1, 1, -1]);
    }

    #[test]
    fn test_neighbours_excludes_self() {
        let all: Vec<_> = Exchange::neighbours().collect();
        assert_eq!(all.len(), NEIGHBOUR_SLOTS);
        assert!(all.iter().all(|e| !e.is_self()));
    }

    #[test]
    fn test_table_set_get_diff() {
        let mut a = NeighbourTable::empty();
        a.set(Exchange::RIGHT, Some(4));
        a.set(Exchange::SELF, Some(99));
        assert_eq!(a.get(Exchange::RIGHT), Some(4));
        assert_eq!(a.get(Exchange::SELF), None);
        assert_eq!(a.neighbour_count(), 1);

        let mut b = a;
        b.set(Exchange::TOP, Some(7));
        assert_eq!(a.diff(&b), vec![Exchange::TOP]);

        let wire = b.to_wire();
        assert_eq!(wire[0], -1);
        assert_eq!(wire[1], 4);
        assert_eq!(wire[6], 7);
        assert_eq!(wire[2], -1);
    }
}
