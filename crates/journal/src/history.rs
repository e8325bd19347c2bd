//! Bounded history of recent snapshots

use copycast_core::Snapshot;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of snapshots, oldest evicted first
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<Snapshot>,
}

impl HistoryBuffer {
    /// Default number of retained snapshots
    pub const DEFAULT_CAPACITY: usize = 5;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a snapshot, evicting the oldest when full
    ///
    /// Returns the evicted snapshot, if any.
    pub fn push(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        if self.capacity == 0 {
            return Some(snapshot);
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(snapshot);
        evicted
    }

    /// Snapshots oldest first
    pub fn to_vec(&self) -> Vec<Snapshot> {
        self.entries.iter().cloned().collect()
    }

    /// Look up a retained snapshot by sequence number
    pub fn get(&self, seq: u64) -> Option<&Snapshot> {
        self.entries.iter().find(|s| s.seq() == seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
