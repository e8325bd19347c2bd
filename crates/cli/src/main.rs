//! Copycast CLI - copycast command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod util;

/// Copycast - live mirror of a directory tree as JSON snapshots
#[derive(Parser)]
#[command(name = "copycast")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a directory and print a line per snapshot until Ctrl-C
    Watch {
        /// Directory to mirror (default: current directory)
        root: Option<PathBuf>,
        /// Print wire messages as JSON lines
        #[arg(long)]
        json: bool,
        /// Config file (default: <root>/copycast.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write stability window in milliseconds
        #[arg(long)]
        stability_ms: Option<u64>,
        /// Pending-write poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
        /// Number of snapshots kept in history
        #[arg(long)]
        history: Option<usize>,
        /// Append logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the tree once the initial scan has settled
    Snapshot {
        /// Directory to mirror (default: current directory)
        root: Option<PathBuf>,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
        /// Config file (default: <root>/copycast.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the effective configuration as TOML
    Config {
        /// Directory whose copycast.toml is used (default: current directory)
        root: Option<PathBuf>,
        /// Config file to show instead
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the default configuration
        #[arg(long)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Watch { log_file, .. } => log_file.as_deref(),
        _ => None,
    };
    // Held until exit so buffered file logs are flushed
    let _log_guard = util::init_tracing(cli.verbose, log_file)?;

    match cli.command {
        Commands::Watch {
            root,
            json,
            config,
            stability_ms,
            poll_ms,
            history,
            log_file: _,
        } => {
            let root = util::resolve_root(root)?;
            let mut config = util::load_config(&root, config.as_deref())?;
            if let Some(ms) = stability_ms {
                config.watch.stability_threshold_ms = ms;
            }
            if let Some(ms) = poll_ms {
                config.watch.poll_interval_ms = ms;
            }
            if let Some(depth) = history {
                config.broadcast.history_depth = depth;
            }
            config.validate()?;
            cmd::watch::run(&root, &config, json).await
        }
        Commands::Snapshot {
            root,
            pretty,
            config,
        } => {
            let root = util::resolve_root(root)?;
            let config = util::load_config(&root, config.as_deref())?;
            cmd::snapshot::run(&root, &config, pretty).await
        }
        Commands::Config {
            root,
            config,
            example,
        } => {
            if example {
                cmd::config::run_example()
            } else {
                let root = util::resolve_root(root)?;
                cmd::config::run_show(&root, config.as_deref())
            }
        }
    }
}
