//! Per-path write-stability debouncing
//!
//! Prevents reading a file while it is still being written. Every path is in
//! one of two states:
//! - `Idle` (no entry)
//! - `AwaitingStability` (entry with the time of the last observed write)
//!
//! Each new write resets the timer. [`Debouncer::poll`] emits a path once no
//! write has been seen for the stability window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What the settled path should be reported as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// File appeared during live watching
    Added,
    /// Existing file was written
    Changed,
}

/// State of a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    Idle,
    AwaitingStability { last_write: Instant, kind: PendingKind },
}

/// Per-path debouncer
#[derive(Debug)]
pub struct Debouncer {
    /// Quiet period required before a path is emitted
    stability: Duration,

    /// Paths currently awaiting stability
    pending: HashMap<PathBuf, (Instant, PendingKind)>,
}

impl Debouncer {
    pub fn new(stability: Duration) -> Self {
        Self {
            stability,
            pending: HashMap::new(),
        }
    }

    /// Record a write observed at `now`
    ///
    /// A pending creation stays a creation when written again.
    pub fn record(&mut self, path: PathBuf, kind: PendingKind, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|(last_write, pending_kind)| {
                *last_write = now;
                if *pending_kind == PendingKind::Changed {
                    *pending_kind = kind;
                }
            })
            .or_insert((now, kind));
    }

    /// Forget a path (it was removed); returns its pending kind if any
    pub fn cancel(&mut self, path: &Path) -> Option<PendingKind> {
        self.pending.remove(path).map(|(_, kind)| kind)
    }

    /// Forget every path at or below `dir`
    pub fn cancel_under(&mut self, dir: &Path) -> usize {
        let before = self.pending.len();
        self.pending.retain(|path, _| !path.starts_with(dir));
        before - self.pending.len()
    }

    /// Current state of `path`
    pub fn state(&self, path: &Path) -> StabilityState {
        match self.pending.get(path) {
            Some(&(last_write, kind)) => StabilityState::AwaitingStability { last_write, kind },
            None => StabilityState::Idle,
        }
    }

    /// Take every path that has been quiet for the stability window
    ///
    /// Returned paths go back to `Idle`. Output is sorted by path so parents
    /// come before their children.
    pub fn poll(&mut self, now: Instant) -> Vec<(PathBuf, PendingKind)> {
        let stability = self.stability;
        let mut settled: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, (last_write, _))| now.saturating_duration_since(*last_write) >= stability)
            .map(|(path, (_, kind))| (path.clone(), *kind))
            .collect();

        for (path, _) in &settled {
            self.pending.remove(path);
        }

        settled.sort_by(|a, b| a.0.cmp(&b.0));
        settled
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
