//! Recursive directory scan
//!
//! Walks a directory top-down (a directory is always reported before anything
//! inside it) with siblings in name order, pruning ignored entries.

use crate::ignore::RuleSet;
use crate::WatchEvent;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Outcome of a walk
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Directories reported, in walk order
    pub directories: Vec<PathBuf>,
    /// Number of files reported
    pub files: usize,
    /// Number of entries that could not be read
    pub errors: usize,
    /// False if the walk stopped early because `emit` refused an event
    pub completed: bool,
}

/// Walk `start` (which must lie under `root`) and report every entry
///
/// `start` itself is reported first. `emit` returns `false` to stop the walk.
pub fn walk(
    root: &Path,
    start: &Path,
    rules: &RuleSet,
    emit: &mut dyn FnMut(WatchEvent) -> bool,
) -> ScanSummary {
    let mut summary = ScanSummary::default();

    let walker = WalkDir::new(start)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => true,
            Ok(rel) => !rules.matches(rel, entry.file_type().is_dir()),
            Err(_) => false,
        });

    for entry in walker {
        let event = match entry {
            Ok(entry) => {
                let path = entry.path().to_path_buf();
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    summary.directories.push(path.clone());
                    WatchEvent::DirAdded(path)
                } else if file_type.is_file() || points_to_file(&path) {
                    summary.files += 1;
                    WatchEvent::FileAdded(path)
                } else {
                    debug!("Skipping non-regular entry {}", path.display());
                    continue;
                }
            }
            Err(e) => {
                summary.errors += 1;
                WatchEvent::WatchError {
                    path: e.path().map(Path::to_path_buf),
                    reason: e.to_string(),
                }
            }
        };

        if !emit(event) {
            return summary;
        }
    }

    summary.completed = true;
    summary
}

/// Symlinks are reported only when they resolve to a regular file
fn points_to_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
