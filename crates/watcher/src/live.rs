//! Live-mode translation of OS notifications into watch events

use crate::debounce::{Debouncer, PendingKind};
use crate::ignore::RuleSet;
use crate::scan;
use crate::WatchEvent;
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// State kept by the watcher between notifications
pub(crate) struct LiveState {
    root: PathBuf,
    rules: RuleSet,
    /// Directories currently present, used to classify bare removals
    known_dirs: HashSet<PathBuf>,
    debouncer: Debouncer,
}

impl LiveState {
    pub(crate) fn new(root: PathBuf, rules: RuleSet, stability: Duration) -> Self {
        Self {
            root,
            rules,
            known_dirs: HashSet::new(),
            debouncer: Debouncer::new(stability),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub(crate) fn add_known_dirs(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.known_dirs.extend(dirs);
    }

    /// Translate one OS notification
    ///
    /// Structural changes are returned immediately; writes and file creations
    /// are parked in the debouncer until [`flush`](Self::flush) sees them
    /// settle.
    pub(crate) fn handle(&mut self, event: Event, now: Instant) -> Vec<WatchEvent> {
        let mut out = Vec::new();

        if event.need_rescan() {
            warn!("Watcher requested a rescan, re-walking {}", self.root.display());
            let root = self.root.clone();
            self.rescan(&root, &mut out);
        }

        match event.kind {
            EventKind::Create(kind) => {
                for path in event.paths {
                    self.created(path, kind == CreateKind::Folder, now, &mut out);
                }
            }
            EventKind::Remove(kind) => {
                for path in event.paths {
                    self.removed(path, kind == RemoveKind::Folder, &mut out);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => {
                    for path in event.paths {
                        self.removed(path, false, &mut out);
                    }
                }
                RenameMode::To => {
                    for path in event.paths {
                        self.created(path, false, now, &mut out);
                    }
                }
                RenameMode::Both => {
                    let mut paths = event.paths.into_iter();
                    if let Some(from) = paths.next() {
                        self.removed(from, false, &mut out);
                    }
                    for to in paths {
                        self.created(to, false, now, &mut out);
                    }
                }
                RenameMode::Any | RenameMode::Other => {
                    for path in event.paths {
                        if path.exists() {
                            self.created(path, false, now, &mut out);
                        } else {
                            self.removed(path, false, &mut out);
                        }
                    }
                }
            },
            EventKind::Modify(ModifyKind::Metadata(kind))
                if !matches!(kind, MetadataKind::WriteTime | MetadataKind::Any) => {}
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
                for path in event.paths {
                    self.written(path, now);
                }
            }
            EventKind::Access(_) => {}
        }

        out
    }

    /// Emit every path whose writes have settled
    pub(crate) fn flush(&mut self, now: Instant) -> Vec<WatchEvent> {
        let mut out = Vec::new();
        for (path, kind) in self.debouncer.poll(now) {
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Settled path vanished {}: {}", path.display(), e);
                    continue;
                }
            };
            match kind {
                PendingKind::Added => out.push(WatchEvent::FileAdded(path)),
                PendingKind::Changed => {
                    let mtime = metadata.modified().unwrap_or_else(|_| SystemTime::now());
                    out.push(WatchEvent::FileChanged(path, mtime));
                }
            }
        }
        out
    }

    /// Path relative to the root, `None` for the root itself or outside paths
    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
    }

    fn created(&mut self, path: PathBuf, folder_hint: bool, now: Instant, out: &mut Vec<WatchEvent>) {
        let Some(rel) = self.relative(&path) else { return };
        let is_dir = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.is_dir(),
            // Gone already; the removal notification follows
            Err(_) => return,
        };
        if self.rules.matches_path_or_parents(rel, is_dir || folder_hint) {
            return;
        }

        if is_dir {
            if self.known_dirs.contains(&path) {
                return;
            }
            // Files may land in the new directory before the OS watch covers it
            self.rescan(&path, out);
        } else {
            self.debouncer.record(path, PendingKind::Added, now);
        }
    }

    fn removed(&mut self, path: PathBuf, folder_hint: bool, out: &mut Vec<WatchEvent>) {
        let Some(rel) = self.relative(&path) else { return };
        let is_dir = folder_hint || self.known_dirs.contains(&path);
        if self.rules.matches_path_or_parents(rel, is_dir) {
            return;
        }

        if is_dir {
            self.known_dirs.retain(|dir| !dir.starts_with(&path));
            self.debouncer.cancel_under(&path);
            out.push(WatchEvent::DirRemoved(path));
        } else {
            self.debouncer.cancel(&path);
            out.push(WatchEvent::FileRemoved(path));
        }
    }

    fn written(&mut self, path: PathBuf, now: Instant) {
        let Some(rel) = self.relative(&path) else { return };
        // Directories and vanished paths are covered by create/remove events
        let is_file = std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
        if is_file && !self.rules.matches_path_or_parents(rel, false) {
            self.debouncer.record(path, PendingKind::Changed, now);
        }
    }

    /// Walk `start` and report its whole subtree
    fn rescan(&mut self, start: &Path, out: &mut Vec<WatchEvent>) {
        let summary = scan::walk(&self.root, start, &self.rules, &mut |event| {
            out.push(event);
            true
        });
        debug!(
            "Rescanned {}: {} dirs, {} files",
            start.display(),
            summary.directories.len(),
            summary.files
        );
        self.known_dirs.extend(summary.directories);
    }
}
