//! Cross-process gather
//!
//! The telemetry reduction needs exactly one collective: every process
//! contributes a value and the coordinating process (rank 0) receives all of
//! them in rank order. [`LocalCollective`] provides it for a group of ranks
//! running as threads in one process.

use crate::error::{Result, VisError};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Values a peer may send ahead of the coordinating process
const GATHER_CHANNEL_CAPACITY: usize = 256;

/// Rank of the coordinating process
pub const ROOT_RANK: u32 = 0;

/// A process group supporting a gather to the coordinating process
///
/// Every member must call [`gather`](Collective::gather) the same number of
/// times in the same order, or the group deadlocks.
pub trait Collective: Send {
    /// This process's rank
    fn rank(&self) -> u32;

    /// Number of processes in the group
    fn size(&self) -> u32;

    /// Contribute `value`; the coordinating process receives all values in
    /// rank order, every other process receives `None`
    fn gather(&self, value: u64) -> Result<Option<Vec<u64>>>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }
}

/// The trivial group of one process
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloCollective;

impl Collective for SoloCollective {
    fn rank(&self) -> u32 {
        ROOT_RANK
    }

    fn size(&self) -> u32 {
        1
    }

    fn gather(&self, value: u64) -> Result<Option<Vec<u64>>> {
        Ok(Some(vec![value]))
    }
}

enum Role {
    /// One receiver per peer, indexed by `rank - 1`
    Root(Vec<Receiver<u64>>),
    Peer(Sender<u64>),
}

/// In-process group member backed by crossbeam channels
///
/// Each peer owns a dedicated channel to the root, so values of successive
/// gathers cannot interleave across peers.
pub struct LocalCollective {
    rank: u32,
    size: u32,
    role: Role,
}

impl LocalCollective {
    /// Create the members of a group of `size` ranks, index = rank
    pub fn group(size: u32) -> Vec<LocalCollective> {
        let size = size.max(1);
        let mut receivers = Vec::with_capacity(size as usize - 1);
        let mut peers = Vec::with_capacity(size as usize);

        for rank in 1..size {
            let (tx, rx) = bounded(GATHER_CHANNEL_CAPACITY);
            receivers.push(rx);
            peers.push(LocalCollective {
                rank,
                size,
                role: Role::Peer(tx),
            });
        }

        let mut members = Vec::with_capacity(size as usize);
        members.push(LocalCollective {
            rank: ROOT_RANK,
            size,
            role: Role::Root(receivers),
        });
        members.extend(peers);
        members
    }

    fn error(&self, message: impl Into<String>) -> VisError {
        VisError::Collective {
            rank: self.rank,
            message: message.into(),
        }
    }
}

impl Collective for LocalCollective {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn gather(&self, value: u64) -> Result<Option<Vec<u64>>> {
        match &self.role {
            Role::Root(receivers) => {
                let mut values = Vec::with_capacity(self.size as usize);
                values.push(value);
                for (i, rx) in receivers.iter().enumerate() {
                    let v = rx
                        .recv()
                        .map_err(|_| self.error(format!("rank {} left the group", i + 1)))?;
                    values.push(v);
                }
                Ok(Some(values))
            }
            Role::Peer(tx) => {
                tx.send(value)
                    .map_err(|_| self.error("coordinating process left the group"))?;
                Ok(None)
            }
        }
    }
}
