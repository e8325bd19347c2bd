//! Watch command - stream snapshots until interrupted

use crate::util;
use anyhow::{Context, Result};
use copycast_core::Snapshot;
use copycast_journal::WireMessage;
use copycast_mirror::{Mirror, MirrorConfig};
use owo_colors::OwoColorize;
use std::path::Path;
use tracing::{debug, info};

pub async fn run(root: &Path, config: &MirrorConfig, json: bool) -> Result<()> {
    let mirror = Mirror::start(root, config)?;
    let mut subscription = mirror.subscribe();

    if json {
        println!("{}", WireMessage::Connect.to_json_line()?);
    } else {
        println!("{} {}", "Watching".green().bold(), mirror.root().display());
        println!("{}", "Press Ctrl-C to stop".dimmed());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut errors = 0;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, shutting down");
                break;
            }
            snapshot = subscription.recv() => match snapshot {
                Some(snapshot) => {
                    errors += mirror.take_errors().len();
                    emit(&snapshot, json, errors)?;
                }
                None => {
                    debug!("Snapshot stream closed");
                    break;
                }
            },
        }
    }

    let missed = subscription.missed();
    mirror.unsubscribe(subscription);
    if json {
        println!("{}", WireMessage::Disconnect.to_json_line()?);
    } else {
        println!();
        println!("{} after {} snapshots", "Stopped".yellow().bold(), mirror.current().seq());
        if missed > 0 {
            println!("{}", format!("{} snapshots skipped while output was slow", missed).dimmed());
        }
    }

    mirror.stop().await
}

fn emit(snapshot: &Snapshot, json: bool, errors: usize) -> Result<()> {
    if json {
        println!("{}", WireMessage::tree(snapshot).to_json_line()?);
    } else {
        println!("{}", util::format_snapshot(snapshot, errors));
    }
    Ok(())
}
