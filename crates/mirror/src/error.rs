//! Non-fatal errors reported while mirroring

use copycast_core::{PathError, TreeError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A problem the mirror recovered from
///
/// None of these stop the session; they are logged and queued for
/// [`Mirror::take_errors`](crate::Mirror::take_errors).
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The watcher reported an OS-level failure
    #[error("watch error: {reason}")]
    Watch {
        path: Option<PathBuf>,
        reason: String,
    },

    /// File content could not be read; the node was not inserted or updated
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The parent of a node is missing from the tree; the event was dropped
    #[error("cannot apply {event} for {path}: {source}")]
    Resolution {
        event: &'static str,
        path: PathBuf,
        #[source]
        source: TreeError,
    },

    /// The event path does not map into the tree
    #[error("invalid event path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: PathError,
    },
}

impl MirrorError {
    /// Filesystem path the error is about, if known
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            MirrorError::Watch { path, .. } => path.as_deref(),
            MirrorError::Read { path, .. }
            | MirrorError::Resolution { path, .. }
            | MirrorError::Path { path, .. } => Some(path),
        }
    }
}
