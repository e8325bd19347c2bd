//! Live mirror of a directory tree
//!
//! A [`Mirror`] owns one watch session: the watcher feeding events, the
//! mutator applying them to the tree, and the broadcaster handing snapshots
//! to subscribers. Nothing is global; dropping or stopping the handle ends
//! the session.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use copycast_mirror::{Mirror, MirrorConfig};
//!
//! let mirror = Mirror::start("proj".as_ref(), &MirrorConfig::default())?;
//! mirror.wait_ready().await?;
//! let mut subscription = mirror.subscribe();
//! while let Some(snapshot) = subscription.recv().await {
//!     println!("snapshot {}", snapshot.seq());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod mutator;
pub mod reader;

pub use config::{ConfigError, MirrorConfig};
pub use error::MirrorError;
pub use reader::{ContentReader, FsReader};

use anyhow::{Context, Result};
use copycast_core::{Snapshot, Tree};
use copycast_journal::{Broadcaster, Subscription};
use copycast_watcher::{RuleSet, WatchHandle, Watcher};
use mutator::Mutator;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Reports kept for [`Mirror::take_errors`]; later ones are dropped
const ERROR_QUEUE: usize = 256;

/// Handle to a running mirror session
pub struct Mirror {
    root: PathBuf,
    broadcaster: Arc<Broadcaster>,
    ready: watch::Receiver<bool>,
    errors: Mutex<mpsc::Receiver<MirrorError>>,
    watch: Option<WatchHandle>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Mirror {
    /// Start mirroring `root`, reading content from the local filesystem
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(root: &Path, config: &MirrorConfig) -> Result<Self> {
        Self::start_with_reader(root, config, FsReader)
    }

    /// Start mirroring `root` with a custom content reader
    pub fn start_with_reader<R: ContentReader>(
        root: &Path,
        config: &MirrorConfig,
        reader: R,
    ) -> Result<Self> {
        config.validate()?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve mirror root {}", root.display()))?;

        let rules = RuleSet::load(&root, &config.ignore)?;
        debug!("Loaded {} ignore rules", rules.rule_count());

        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let tree = Tree::new(name);
        let broadcaster = Arc::new(Broadcaster::new(&config.broadcast, tree.snapshot(0)));

        let (watch_handle, events) = Watcher::start(&root, &config.watch, rules)?;
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_QUEUE);
        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = oneshot::channel();

        let mutator = Mutator::new(
            root.clone(),
            tree,
            config.content,
            Arc::new(reader),
            Arc::clone(&broadcaster),
            errors_tx,
            ready_tx,
        );
        let task = tokio::spawn(mutator.run(events, stop_rx));

        info!("Mirroring {}", root.display());
        Ok(Self {
            root,
            broadcaster,
            ready: ready_rx,
            errors: Mutex::new(errors_rx),
            watch: Some(watch_handle),
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }

    /// Canonical root being mirrored
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subscribe to snapshots; the current one is delivered first
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.broadcaster.unsubscribe(subscription)
    }

    /// Most recent snapshots, oldest first
    pub fn history(&self) -> Vec<Snapshot> {
        self.broadcaster.history()
    }

    /// Snapshot `seq`, if it is still in the history
    pub fn snapshot_at(&self, seq: u64) -> Option<Snapshot> {
        self.broadcaster.snapshot_at(seq)
    }

    pub fn current(&self) -> Snapshot {
        self.broadcaster.current()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// True once the initial scan is applied and no reads are outstanding
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until [`is_ready`](Self::is_ready) holds
    pub async fn wait_ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| anyhow::anyhow!("Mirror stopped before the initial scan settled"))
    }

    /// Drain the errors reported since the last call
    pub fn take_errors(&self) -> Vec<MirrorError> {
        let mut errors = self.errors.lock();
        let mut taken = Vec::new();
        while let Ok(error) = errors.try_recv() {
            taken.push(error);
        }
        taken
    }

    /// Stop the session
    ///
    /// Releases the OS watch first, then ends the mutator. No snapshots are
    /// published after this returns.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(watch) = self.watch.take() {
            watch.stop().await?;
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.context("Mirror task failed")?;
        }
        info!("Stopped mirroring {}", self.root.display());
        Ok(())
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
