//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use copycast_core::Snapshot;
use copycast_mirror::MirrorConfig;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// Logs go to stderr so stdout stays clean for JSON, or to `log_file` when
/// given. `RUST_LOG` overrides the verbosity flag. The returned guard must be
/// kept alive until exit.
pub fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default = match verbose {
        0 => "warn",
        1 => "warn,copycast=debug",
        _ => "warn,copycast=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}

/// Resolve the directory to mirror, defaulting to the current directory
pub fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Directory not found: {}", root.display()))?;
    if !root.is_dir() {
        anyhow::bail!("Not a directory: {}", root.display());
    }
    Ok(root)
}

/// Load `explicit` if given, otherwise `<root>/copycast.toml` when present
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<MirrorConfig> {
    let config = match explicit {
        Some(path) => MirrorConfig::load(path)?,
        None => MirrorConfig::discover(root)?,
    };
    Ok(config)
}

/// Local wall-clock time with milliseconds ("14:30:00.125")
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%H:%M:%S%.3f").to_string()
}

/// One-line summary of a snapshot for human output
pub fn format_snapshot(snapshot: &Snapshot, errors: usize) -> String {
    let (dirs, files) = snapshot.root().count();
    let mut line = format!(
        "{} {}  {} dirs, {} files",
        format!("#{}", snapshot.seq()).cyan(),
        format_time(snapshot.taken_at()).dimmed(),
        dirs,
        files
    );
    if errors > 0 {
        line.push_str(&format!("  {}", format!("({} errors)", errors).yellow()));
    }
    line
}

/// Spinner on stderr; hidden when stderr is not a terminal
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use copycast_core::{NodePath, Tree};
    use tempfile::TempDir;

    #[test]
    fn test_format_snapshot_counts() {
        let mut tree = Tree::new("proj");
        tree.insert_dir(&NodePath::from_names(["src"])).unwrap();
        tree.upsert_file(&NodePath::from_names(["src", "lib.rs"]), String::new(), None)
            .unwrap();
        tree.upsert_file(&NodePath::from_names(["a.txt"]), String::new(), None)
            .unwrap();

        let line = format_snapshot(&tree.snapshot(4), 0);
        assert!(line.contains("#4"));
        assert!(line.contains("1 dirs, 2 files"));
        assert!(!line.contains("errors"));

        assert!(format_snapshot(&tree.snapshot(5), 2).contains("2 errors"));
    }

    #[test]
    fn test_resolve_root() {
        let temp_dir = TempDir::new().unwrap();
        let resolved = resolve_root(Some(temp_dir.path().to_path_buf())).unwrap();
        assert_eq!(resolved, temp_dir.path().canonicalize().unwrap());

        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(resolve_root(Some(file)).is_err());
        assert!(resolve_root(Some(temp_dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_load_config_prefers_explicit() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("copycast.toml"),
            "[broadcast]\nhistory_depth = 2\n",
        )
        .unwrap();
        let explicit = temp_dir.path().join("other.toml");
        std::fs::write(&explicit, "[broadcast]\nhistory_depth = 9\n").unwrap();

        let discovered = load_config(temp_dir.path(), None).unwrap();
        assert_eq!(discovered.broadcast.history_depth, 2);
        let loaded = load_config(temp_dir.path(), Some(&explicit)).unwrap();
        assert_eq!(loaded.broadcast.history_depth, 9);
    }
}
