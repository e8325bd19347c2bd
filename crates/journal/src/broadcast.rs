//! Snapshot fan-out to subscribers
//!
//! Every successful mutation becomes one [`Snapshot`] that is appended to the
//! history and pushed to all subscribers. Queue policy: subscribers share a
//! bounded ring (tokio `broadcast`) with drop-oldest semantics. A subscriber
//! that falls more than `subscriber_buffer` snapshots behind skips the oldest
//! ones and carries on; publishing never waits for anyone.

use crate::history::HistoryBuffer;
use copycast_core::{Snapshot, Tree};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace, warn};

/// Broadcaster tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Number of snapshots kept for history queries (default: 5)
    pub history_depth: usize,
    /// Snapshots a subscriber may lag behind before the oldest are dropped (default: 64)
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            history_depth: HistoryBuffer::DEFAULT_CAPACITY,
            subscriber_buffer: 64,
        }
    }
}

/// Identifies a subscriber in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct State {
    current: Snapshot,
    history: HistoryBuffer,
}

/// Publishes snapshots and keeps the recent history
pub struct Broadcaster {
    /// Publishing and subscribing both hold this lock, so a new subscriber's
    /// baseline and its live stream never overlap or leave a gap
    state: Mutex<State>,
    sender: broadcast::Sender<Snapshot>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create a broadcaster whose current snapshot is `baseline`
    ///
    /// The baseline is not part of the history; only mutations are.
    pub fn new(config: &BroadcastConfig, baseline: Snapshot) -> Self {
        let (sender, _) = broadcast::channel(config.subscriber_buffer.max(1));
        Self {
            state: Mutex::new(State {
                current: baseline,
                history: HistoryBuffer::new(config.history_depth),
            }),
            sender,
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a successful mutation of `tree` and push it to subscribers
    pub fn on_mutation(&self, tree: &Tree) -> Snapshot {
        let mut state = self.state.lock();
        let snapshot = tree.snapshot(state.current.seq() + 1);

        state.history.push(snapshot.clone());
        state.current = snapshot.clone();

        // Err only means nobody is listening right now
        let delivered = self.sender.send(snapshot.clone()).unwrap_or(0);
        trace!("Published snapshot {} to {} subscribers", snapshot.seq(), delivered);

        snapshot
    }

    /// Subscribe to future snapshots
    ///
    /// The returned subscription yields the current snapshot first.
    pub fn subscribe(&self) -> Subscription {
        let state = self.state.lock();
        let rx = self.sender.subscribe();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!("Subscriber {} connected at snapshot {}", id, state.current.seq());

        Subscription {
            id,
            baseline: Some(state.current.clone()),
            rx,
            missed: 0,
        }
    }

    /// Detach a subscriber
    ///
    /// Dropping the subscription has the same effect.
    pub fn unsubscribe(&self, subscription: Subscription) {
        debug!("Subscriber {} disconnected", subscription.id);
        drop(subscription);
    }

    /// Most recent snapshots, oldest first
    pub fn history(&self) -> Vec<Snapshot> {
        self.state.lock().history.to_vec()
    }

    /// Retained snapshot with sequence number `seq`
    ///
    /// Only the last `history_depth` mutations can be found; the baseline never is.
    pub fn snapshot_at(&self, seq: u64) -> Option<Snapshot> {
        self.state.lock().history.get(seq).cloned()
    }

    /// Latest snapshot (the baseline before any mutation)
    pub fn current(&self) -> Snapshot {
        self.state.lock().current.clone()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    id: SubscriberId,
    baseline: Option<Snapshot>,
    rx: broadcast::Receiver<Snapshot>,
    missed: u64,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next snapshot, or `None` once the broadcaster is gone
    pub async fn recv(&mut self) -> Option<Snapshot> {
        if let Some(baseline) = self.baseline.take() {
            return Some(baseline);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next snapshot if one is ready
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        if let Some(baseline) = self.baseline.take() {
            return Some(baseline);
        }
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total snapshots skipped because this subscriber fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn lagged(&mut self, skipped: u64) {
        self.missed += skipped;
        warn!("Subscriber {} lagged, skipped {} snapshots", self.id, skipped);
    }
}
