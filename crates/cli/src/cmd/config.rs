//! Config command - show the effective configuration

use crate::util;
use anyhow::Result;
use copycast_mirror::MirrorConfig;
use owo_colors::OwoColorize;
use std::path::Path;

/// Print the configuration that `watch`/`snapshot` would use for `root`
pub fn run_show(root: &Path, explicit: Option<&Path>) -> Result<()> {
    let config = util::load_config(root, explicit)?;
    let source = match explicit {
        Some(path) => path.display().to_string(),
        None if root.join(MirrorConfig::FILE_NAME).is_file() => {
            root.join(MirrorConfig::FILE_NAME).display().to_string()
        }
        None => "defaults".to_string(),
    };

    eprintln!("{}: {}", "Source".dimmed(), source.dimmed());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Print the default configuration, suitable as a starting copycast.toml
pub fn run_example() -> Result<()> {
    print!("{}", MirrorConfig::default().to_toml_string()?);
    Ok(())
}
