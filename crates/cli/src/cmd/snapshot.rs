//! Snapshot command - print the settled tree once

use crate::util;
use anyhow::Result;
use copycast_mirror::{Mirror, MirrorConfig};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(root: &Path, config: &MirrorConfig, pretty: bool) -> Result<()> {
    let spinner = util::spinner(&format!("Scanning {}", root.display()));
    let mirror = Mirror::start(root, config)?;
    let ready = mirror.wait_ready().await;
    spinner.finish_and_clear();
    ready?;

    let snapshot = mirror.current();
    let json = if pretty {
        serde_json::to_string_pretty(snapshot.root())?
    } else {
        serde_json::to_string(snapshot.root())?
    };
    println!("{}", json);

    for error in mirror.take_errors() {
        eprintln!("{} {}", "warning:".yellow().bold(), error);
    }

    mirror.stop().await
}
