//! Configuration for the playback core
//!
//! A single TOML file carries the bootstrap settings. Every field has a
//! built-in default, so an empty file (or no file) is a valid configuration.
//!
//! # Plugin directory priority
//!
//! 1. Explicit argument (highest priority)
//! 2. `TONEARM_PLUGIN_DIR` environment variable
//! 3. `plugin_dir` in the TOML file
//! 4. OS-dependent default under the local data directory

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tonearm_common::{Error, Result};
use tracing::debug;

/// Environment variable overriding the plugin directory
pub const PLUGIN_DIR_ENV: &str = "TONEARM_PLUGIN_DIR";

/// Configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Directory scanned for plugin modules (optional)
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Playback engine settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackConfig {
    /// Splice the next track into the current one without a gap
    #[serde(default = "default_gapless")]
    pub gapless: bool,

    /// Remaining time below which the next slot is armed
    ///
    /// Default: 50ms
    #[serde(default = "default_prebuffer_threshold_ms")]
    pub prebuffer_threshold_ms: u64,

    /// Frames per device callback
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: u32,

    /// Master volume at startup (0.0-1.0)
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Output device name (None = system default)
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            gapless: default_gapless(),
            prebuffer_threshold_ms: default_prebuffer_threshold_ms(),
            buffer_frames: default_buffer_frames(),
            initial_volume: default_initial_volume(),
            device_id: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_gapless() -> bool {
    true
}

fn default_prebuffer_threshold_ms() -> u64 {
    50
}

fn default_buffer_frames() -> u32 {
    2048
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.playback.validate()
    }

    /// Plugin directory after applying the priority order
    pub fn resolve_plugin_dir(&self, explicit: Option<&Path>) -> PathBuf {
        resolve_plugin_dir(explicit, self.plugin_dir.as_deref())
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_frames == 0 {
            return Err(Error::Config("buffer_frames must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "initial_volume must be within 0.0-1.0, got {}",
                self.initial_volume
            )));
        }
        Ok(())
    }
}

/// Resolve the plugin directory.
///
/// Explicit argument, then environment, then config file, then the OS default.
pub fn resolve_plugin_dir(explicit: Option<&Path>, config_value: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(PLUGIN_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_plugin_dir()
}

/// OS-dependent default plugin directory
pub fn default_plugin_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tonearm").join("plugins"))
        .unwrap_or_else(|| PathBuf::from("./tonearm_plugins"))
}
