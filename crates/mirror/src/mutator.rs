//! Serialized application of watch events to the tree
//!
//! The mutator task is the only writer of the [`Tree`]. Structural events are
//! applied as they arrive; file content is read by spawned tasks whose
//! results come back through the same loop, so completions can arrive in any
//! order relative to later events.
//!
//! Ordering rules:
//! - every event gets a sequence number on arrival
//! - only the latest read dispatched for a path may commit
//! - a read is discarded if its path or an ancestor was removed (or replaced
//!   by a directory) after the read was dispatched
//! - a change for a file whose add is still being read waits for that add

use crate::error::MirrorError;
use crate::reader::ContentReader;
use ahash::AHashMap;
use copycast_core::{ContentPolicy, Node, NodePath, Tree};
use copycast_journal::Broadcaster;
use copycast_watcher::WatchEvent;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadKind {
    Add,
    Change { updated_at: u64 },
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    kind: ReadKind,
}

/// Change waiting for the add of the same path
#[derive(Debug)]
struct Deferred {
    seq: u64,
    fs_path: PathBuf,
    updated_at: u64,
}

/// Result of a content read, tagged with the event that asked for it
struct ReadDone {
    path: NodePath,
    fs_path: PathBuf,
    seq: u64,
    kind: ReadKind,
    result: io::Result<String>,
}

pub(crate) struct Mutator<R> {
    root: PathBuf,
    tree: Tree,
    policy: ContentPolicy,
    reader: Arc<R>,
    broadcaster: Arc<Broadcaster>,
    errors: mpsc::Sender<MirrorError>,
    ready: watch::Sender<bool>,
    /// Sequence number of the last event applied
    seq: u64,
    /// Removal sequence by path, kept only while older reads are in flight
    tombstones: AHashMap<NodePath, u64>,
    in_flight: AHashMap<NodePath, InFlight>,
    deferred: AHashMap<NodePath, Deferred>,
    reads: JoinSet<ReadDone>,
    scan_complete: bool,
}

impl<R: ContentReader> Mutator<R> {
    pub(crate) fn new(
        root: PathBuf,
        tree: Tree,
        policy: ContentPolicy,
        reader: Arc<R>,
        broadcaster: Arc<Broadcaster>,
        errors: mpsc::Sender<MirrorError>,
        ready: watch::Sender<bool>,
    ) -> Self {
        Self {
            root,
            tree,
            policy,
            reader,
            broadcaster,
            errors,
            ready,
            seq: 0,
            tombstones: AHashMap::new(),
            in_flight: AHashMap::new(),
            deferred: AHashMap::new(),
            reads: JoinSet::new(),
            scan_complete: false,
        }
    }

    /// Apply events and read completions until stopped
    ///
    /// Ends on `stop` (or when its sender is dropped), or once the event
    /// stream has closed and no reads are left. Reads still running at that
    /// point are aborted with the task set.
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut events_open = true;

        loop {
            if !events_open && self.reads.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!("Mutator stopping with {} reads in flight", self.reads.len());
                    break;
                }
                Some(joined) = self.reads.join_next(), if !self.reads.is_empty() => match joined {
                    Ok(done) => self.complete(done),
                    Err(e) => warn!("Read task failed: {}", e),
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.apply(event),
                    None => {
                        debug!("Watch stream ended");
                        events_open = false;
                    }
                },
            }
        }

        debug!("Mutator finished after {} events", self.seq);
    }

    /// Apply one watch event
    fn apply(&mut self, event: WatchEvent) {
        self.seq += 1;
        let seq = self.seq;
        trace!("Applying #{} {:?}", seq, event);

        match event {
            WatchEvent::DirAdded(fs_path) => self.dir_added(fs_path, seq),
            WatchEvent::FileAdded(fs_path) => {
                if let Some(path) = self.node_path(&fs_path) {
                    if path.is_root() {
                        warn!("Ignoring file event for the watched root");
                    } else {
                        self.dispatch(path, fs_path, ReadKind::Add, seq);
                    }
                }
            }
            WatchEvent::DirRemoved(fs_path) | WatchEvent::FileRemoved(fs_path) => {
                self.removed(fs_path, seq)
            }
            WatchEvent::FileChanged(fs_path, mtime) => self.changed(fs_path, seq, unix_millis(mtime)),
            WatchEvent::ScanComplete => {
                self.scan_complete = true;
                let (dirs, files) = self.tree.root().count();
                info!(
                    "Initial scan applied: {} dirs, {} files, {} reads pending",
                    dirs,
                    files,
                    self.in_flight.len()
                );
            }
            WatchEvent::WatchError { path, reason } => self.report(MirrorError::Watch { path, reason }),
        }

        self.update_ready();
    }

    fn dir_added(&mut self, fs_path: PathBuf, seq: u64) {
        let Some(path) = self.node_path(&fs_path) else { return };
        if path.is_root() {
            return;
        }

        // A directory replacing a file supersedes any read of that file
        let supersedes = self.tree.get(&path).map_or(false, |node| !node.is_dir())
            || self.in_flight.contains_key(&path);

        match self.tree.insert_dir(&path) {
            Ok(true) => {
                if supersedes {
                    self.tombstones.insert(path.clone(), seq);
                    self.deferred.remove(&path);
                }
                debug!("Added directory {}", path);
                self.publish();
            }
            Ok(false) => trace!("Directory {} already present", path),
            Err(source) => self.report(MirrorError::Resolution {
                event: "DirAdded",
                path: fs_path,
                source,
            }),
        }
    }

    fn removed(&mut self, fs_path: PathBuf, seq: u64) {
        let Some(path) = self.node_path(&fs_path) else { return };
        if path.is_root() {
            warn!("Ignoring removal of the watched root {}", fs_path.display());
            return;
        }

        self.deferred.retain(|pending, _| !pending.starts_with(&path));
        if self.in_flight.keys().any(|pending| pending.starts_with(&path)) {
            self.tombstones.insert(path.clone(), seq);
        }

        match self.tree.remove(&path) {
            Some(_) => {
                debug!("Removed {}", path);
                self.publish();
            }
            None => debug!("Remove of {} which is not in the tree, nothing to do", path),
        }
    }

    fn changed(&mut self, fs_path: PathBuf, seq: u64, updated_at: u64) {
        let Some(path) = self.node_path(&fs_path) else { return };

        match self.in_flight.get(&path).map(|read| read.kind) {
            Some(ReadKind::Add) => {
                debug!("Deferring change of {} until its add is applied", path);
                self.deferred.insert(
                    path,
                    Deferred {
                        seq,
                        fs_path,
                        updated_at,
                    },
                );
            }
            Some(ReadKind::Change { .. }) => {
                self.dispatch(path, fs_path, ReadKind::Change { updated_at }, seq)
            }
            None => {
                if matches!(self.tree.get(&path), Some(Node::File(_))) {
                    self.dispatch(path, fs_path, ReadKind::Change { updated_at }, seq);
                } else {
                    debug!("Change of {} which is not in the tree, nothing to do", path);
                }
            }
        }
    }

    /// Start reading `fs_path`; supersedes any earlier read of the same path
    fn dispatch(&mut self, path: NodePath, fs_path: PathBuf, kind: ReadKind, seq: u64) {
        self.in_flight.insert(path.clone(), InFlight { seq, kind });

        let reader = Arc::clone(&self.reader);
        let policy = self.policy;
        self.reads.spawn(async move {
            let result = reader.read(&fs_path, &policy).await;
            ReadDone {
                path,
                fs_path,
                seq,
                kind,
                result,
            }
        });
    }

    /// Commit a finished read if it is still current
    fn complete(&mut self, done: ReadDone) {
        let ReadDone {
            path,
            fs_path,
            seq,
            kind,
            result,
        } = done;

        if self.in_flight.get(&path).map(|read| read.seq) != Some(seq) {
            trace!("Dropping superseded read #{} of {}", seq, path);
            return;
        }
        self.in_flight.remove(&path);

        if self.tombstoned(&path, seq) {
            debug!("Discarding read #{} of {}, removed since", seq, path);
        } else {
            match result {
                Ok(content) => self.commit(&path, fs_path, kind, content),
                Err(source) => self.report(MirrorError::Read { path: fs_path, source }),
            }
        }

        if kind == ReadKind::Add {
            if let Some(deferred) = self.deferred.remove(&path) {
                self.changed(deferred.fs_path, deferred.seq, deferred.updated_at);
            }
        }

        self.prune_tombstones();
        self.update_ready();
    }

    fn commit(&mut self, path: &NodePath, fs_path: PathBuf, kind: ReadKind, content: String) {
        match kind {
            ReadKind::Add => {
                let unchanged = self
                    .tree
                    .get(path)
                    .and_then(Node::as_file)
                    .map_or(false, |file| file.content == content);
                if unchanged {
                    trace!("{} re-added with identical content", path);
                    return;
                }
                match self.tree.upsert_file(path, content, None) {
                    Ok(true) => {
                        debug!("Added file {}", path);
                        self.publish();
                    }
                    Ok(false) => {}
                    Err(source) => self.report(MirrorError::Resolution {
                        event: "FileAdded",
                        path: fs_path,
                        source,
                    }),
                }
            }
            ReadKind::Change { updated_at } => {
                match self.tree.update_file(path, content, Some(updated_at)) {
                    Ok(Some(true)) => {
                        debug!("Updated file {}", path);
                        self.publish();
                    }
                    Ok(Some(false)) => trace!("{} unchanged", path),
                    Ok(None) => debug!("{} left the tree before its change was read", path),
                    Err(source) => self.report(MirrorError::Resolution {
                        event: "FileChanged",
                        path: fs_path,
                        source,
                    }),
                }
            }
        }
    }

    /// True if `path` or an ancestor was removed after event `seq`
    fn tombstoned(&self, path: &NodePath, seq: u64) -> bool {
        self.tombstones
            .iter()
            .any(|(removed, &at)| at > seq && path.starts_with(removed))
    }

    /// Forget tombstones no in-flight read can be affected by
    fn prune_tombstones(&mut self) {
        match self.in_flight.values().map(|read| read.seq).min() {
            Some(oldest) => self.tombstones.retain(|_, at| *at > oldest),
            None => self.tombstones.clear(),
        }
    }

    fn node_path(&self, fs_path: &Path) -> Option<NodePath> {
        match NodePath::under(&self.root, fs_path) {
            Ok(path) => Some(path),
            Err(source) => {
                self.report(MirrorError::Path {
                    path: fs_path.to_path_buf(),
                    source,
                });
                None
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.broadcaster.on_mutation(&self.tree);
        trace!("Snapshot {} published", snapshot.seq());
    }

    fn report(&self, error: MirrorError) {
        warn!("{}", error);
        if self.errors.try_send(error).is_err() {
            trace!("Error queue full, report dropped");
        }
    }

    fn update_ready(&self) {
        let ready = self.scan_complete && self.in_flight.is_empty() && self.deferred.is_empty();
        self.ready.send_if_modified(|current| {
            if *current == ready {
                false
            } else {
                *current = ready;
                true
            }
        });
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
