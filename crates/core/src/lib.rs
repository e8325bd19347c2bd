//! Copycast Core - in-memory model of a mirrored directory
//!
//! This crate provides:
//! - Tree representation (directories and files, unique sorted siblings)
//! - Node paths and external ids
//! - Oversized-content policy
//! - Structurally-shared snapshots

pub mod content;
pub mod path;
pub mod snapshot;
pub mod tree;

// Re-export main types for convenience
pub use content::{ContentPolicy, OVERSIZED_PLACEHOLDER};
pub use path::{NodePath, PathError, ID_DELIMITER};
pub use snapshot::Snapshot;
pub use tree::{Directory, File, Node, Tree, TreeError};

/// Common result type used throughout copycast-core
pub type Result<T> = anyhow::Result<T>;
