//! Snapshot history and distribution
//!
//! This crate provides:
//! - Bounded history of recent snapshots
//! - Fan-out of snapshots to any number of subscribers
//! - JSON wire messages for consumers

pub mod broadcast;
pub mod history;
pub mod wire;

// Re-exports
pub use broadcast::{BroadcastConfig, Broadcaster, SubscriberId, Subscription};
pub use history::HistoryBuffer;
pub use wire::WireMessage;

/// Result type for journal operations
pub type Result<T> = anyhow::Result<T>;
