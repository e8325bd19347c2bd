//! Immutable tree snapshots

use crate::tree::Node;
use std::sync::Arc;
use std::time::SystemTime;

/// Frozen view of the tree at one mutation
///
/// Cloning is cheap: the node graph is shared with the live tree until the
/// tree mutates the affected spine.
#[derive(Debug, Clone)]
pub struct Snapshot {
    seq: u64,
    taken_at: SystemTime,
    root: Arc<Node>,
}

impl Snapshot {
    pub fn new(seq: u64, root: Arc<Node>) -> Self {
        Self {
            seq,
            taken_at: SystemTime::now(),
            root,
        }
    }

    /// Sequence number; strictly increasing across published snapshots
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    /// Root directory node
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }
}
