//! File system watching for copycast
//!
//! This crate provides a live, cancellable stream of [`WatchEvent`]s for a
//! root directory:
//! - Initial top-down scan followed by `ScanComplete`
//! - gitignore-style filtering with non-negatable built-ins
//! - Per-path write-stability debouncing (500ms window, 100ms poll by default)
//! - Non-fatal error reporting

pub mod debounce;
pub mod ignore;
mod live;
pub mod scan;

pub use crate::ignore::{IgnoreConfig, RuleSet, BUILTIN_PATTERNS};

use anyhow::{Context, Result};
use live::LiveState;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// File system event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Directory appeared (or was found by the scan)
    DirAdded(PathBuf),
    /// File appeared (or was found by the scan)
    FileAdded(PathBuf),
    /// Directory and everything below it is gone
    DirRemoved(PathBuf),
    /// File is gone
    FileRemoved(PathBuf),
    /// File content settled after writes; carries the modification time
    FileChanged(PathBuf, SystemTime),
    /// Initial scan finished; live events follow
    ScanComplete,
    /// Non-fatal failure, the watch continues
    WatchError {
        path: Option<PathBuf>,
        reason: String,
    },
}

impl WatchEvent {
    /// Path the event refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::DirAdded(p)
            | WatchEvent::FileAdded(p)
            | WatchEvent::DirRemoved(p)
            | WatchEvent::FileRemoved(p)
            | WatchEvent::FileChanged(p, _) => Some(p),
            WatchEvent::WatchError { path, .. } => path.as_deref(),
            WatchEvent::ScanComplete => None,
        }
    }
}

/// Watcher tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a written file is reported (default: 500ms)
    pub stability_threshold_ms: u64,
    /// How often pending writes are checked (default: 100ms)
    pub poll_interval_ms: u64,
    /// Capacity of the outgoing event channel (default: 1024)
    pub event_buffer: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stability_threshold_ms: 500,
            poll_interval_ms: 100,
            event_buffer: 1024,
        }
    }
}

impl WatchConfig {
    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// File system watcher
pub struct Watcher;

impl Watcher {
    /// Start watching `root`
    ///
    /// The OS watch is registered before the initial scan starts so changes
    /// made during the scan are not lost; they are handled after
    /// `ScanComplete`. Must be called from within a tokio runtime.
    pub fn start(
        root: &Path,
        config: &WatchConfig,
        rules: RuleSet,
    ) -> Result<(WatchHandle, mpsc::Receiver<WatchEvent>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve watch root {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Watch root is not a directory: {}", root.display());
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut os_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })
        .context("Failed to create file watcher")?;
        os_watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let watch_loop = WatchLoop {
            state: LiveState::new(root.clone(), rules, config.stability_threshold()),
            poll_interval: config.poll_interval(),
            os_watcher,
            raw_rx,
            tx,
        };
        let task = tokio::spawn(watch_loop.run(stop_rx));

        info!("Watching {}", root.display());
        Ok((
            WatchHandle {
                root,
                stop_tx,
                task: Some(task),
            },
            rx,
        ))
    }
}

/// Handle to a running watch
///
/// Dropping the handle cancels the watch; [`stop`](Self::stop) also waits
/// until the OS watch has been released.
pub struct WatchHandle {
    root: PathBuf,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Canonical root being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching; no events are produced after this returns
    pub async fn stop(mut self) -> Result<()> {
        self.cancel();
        if let Some(task) = self.task.take() {
            task.await.context("Watcher task failed")?;
        }
        debug!("Stopped watching {}", self.root.display());
        Ok(())
    }

    fn cancel(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct WatchLoop {
    state: LiveState,
    poll_interval: Duration,
    /// Kept alive for the duration of the loop; dropping it releases OS handles
    os_watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    tx: mpsc::Sender<WatchEvent>,
}

/// Resolves once the handle asks the loop to stop (or is gone)
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

impl WatchLoop {
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        let root = self.state.root().to_path_buf();
        let rules = self.state.rules().clone();
        let tx = self.tx.clone();
        let mut scan_stop = stop_rx.clone();
        let runtime = tokio::runtime::Handle::current();

        // Each blocked send also waits on the stop signal, so a consumer that
        // stops reading cannot pin the scan thread
        let scan = tokio::task::spawn_blocking(move || {
            scan::walk(&root, &root, &rules, &mut |event| {
                runtime.block_on(async {
                    tokio::select! {
                        biased;
                        _ = stopped(&mut scan_stop) => false,
                        sent = tx.send(event) => sent.is_ok(),
                    }
                })
            })
        });

        let summary = tokio::select! {
            result = scan => match result {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Initial scan panicked: {}", e);
                    return;
                }
            },
            _ = stopped(&mut stop_rx) => return,
        };
        if !summary.completed {
            debug!("Initial scan interrupted");
            return;
        }

        info!(
            "Initial scan complete: {} dirs, {} files, {} errors. Ready for changes",
            summary.directories.len(),
            summary.files,
            summary.errors
        );
        self.state.add_known_dirs(summary.directories);
        if !self.forward(vec![WatchEvent::ScanComplete], &mut stop_rx).await {
            return;
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let events = tokio::select! {
                _ = stopped(&mut stop_rx) => break,
                raw = self.raw_rx.recv() => match raw {
                    Some(Ok(event)) => self.state.handle(event, Instant::now().into_std()),
                    Some(Err(e)) => {
                        warn!("Watcher error: {}", e);
                        vec![WatchEvent::WatchError {
                            path: e.paths.first().cloned(),
                            reason: e.to_string(),
                        }]
                    }
                    None => break,
                },
                _ = ticker.tick() => self.state.flush(Instant::now().into_std()),
            };

            if !self.forward(events, &mut stop_rx).await {
                break;
            }
        }

        drop(self.os_watcher);
        debug!("Watch loop finished");
    }

    /// Send events downstream; false once the receiver is gone or we are cancelled
    async fn forward(&self, events: Vec<WatchEvent>, stop_rx: &mut watch::Receiver<bool>) -> bool {
        for event in events {
            debug!("{:?}", event);
            let sent = tokio::select! {
                biased;
                _ = stopped(stop_rx) => false,
                sent = self.tx.send(event) => sent.is_ok(),
            };
            if !sent {
                return false;
            }
        }
        true
    }
}
