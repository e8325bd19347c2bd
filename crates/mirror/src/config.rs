//! Mirror configuration
//!
//! Every field has a default, so an empty or partial `copycast.toml` is valid.

use copycast_core::ContentPolicy;
use copycast_journal::BroadcastConfig;
use copycast_watcher::{IgnoreConfig, WatchConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete mirror configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub watch: WatchConfig,
    pub content: ContentPolicy,
    pub broadcast: BroadcastConfig,
    pub ignore: IgnoreConfig,
}

impl MirrorConfig {
    /// Name of the config file looked up in the watched root
    pub const FILE_NAME: &'static str = "copycast.toml";

    /// Load and validate configuration from `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/copycast.toml` if present, defaults otherwise
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(Self::FILE_NAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the mirror cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let watch = &self.watch;
        if watch.stability_threshold_ms == 0 {
            return Err(invalid("watch.stability_threshold_ms must be greater than 0"));
        }
        if watch.poll_interval_ms == 0 {
            return Err(invalid("watch.poll_interval_ms must be greater than 0"));
        }
        if watch.poll_interval_ms > watch.stability_threshold_ms {
            return Err(invalid(format!(
                "watch.poll_interval_ms ({}) must not exceed watch.stability_threshold_ms ({})",
                watch.poll_interval_ms, watch.stability_threshold_ms
            )));
        }
        if watch.event_buffer == 0 {
            return Err(invalid("watch.event_buffer must be greater than 0"));
        }
        if self.content.max_lines == 0 || self.content.max_chars == 0 {
            return Err(invalid("content.max_lines and content.max_chars must be greater than 0"));
        }
        if self.broadcast.history_depth == 0 {
            return Err(invalid("broadcast.history_depth must be greater than 0"));
        }
        if self.broadcast.subscriber_buffer == 0 {
            return Err(invalid("broadcast.subscriber_buffer must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
