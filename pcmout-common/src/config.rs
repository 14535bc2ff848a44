//! Configuration loading and config file resolution
//!
//! Configuration is a small TOML file with built-in defaults for every field:
//!
//! ```toml
//! [playback]
//! buffer_duration_ms = 200
//! chunk_frames = 1024
//! write_timeout_ms = 2000
//! shutdown_timeout_ms = 5000
//! drain_poll_interval_ms = 5
//! # device = "Speakers"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Config file resolution priority:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/pcmout/config.toml`)
//!
//! A missing file is not fatal: a warning is logged and defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PCMOUT_CONFIG";

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Playback tuning
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Playback tuning knobs
///
/// Chunk size and buffer duration are defaults, not protocol constants;
/// a sink with a preferred chunk size overrides `chunk_frames`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Ring buffer size in milliseconds of audio
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u64,

    /// Frames moved to the device per drain step
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,

    /// How long a write may wait without progress before BackpressureTimeout
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// How long end() waits for the drain before forcing closure
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Drain thread wake-up interval while idle or when the device is full
    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,

    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_buffer_duration_ms() -> u64 {
    200
}

fn default_chunk_frames() -> usize {
    1024
}

fn default_write_timeout_ms() -> u64 {
    2_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_drain_poll_interval_ms() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: default_buffer_duration_ms(),
            chunk_frames: default_chunk_frames(),
            write_timeout_ms: default_write_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
            device: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PlaybackConfig {
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    /// Reject values that would make the drain loop or buffer degenerate
    pub fn validate(&self) -> Result<()> {
        if self.buffer_duration_ms == 0 {
            return Err(Error::Config("buffer_duration_ms must be > 0".to_string()));
        }
        if self.chunk_frames == 0 {
            return Err(Error::Config("chunk_frames must be > 0".to_string()));
        }
        if self.write_timeout_ms == 0 {
            return Err(Error::Config("write_timeout_ms must be > 0".to_string()));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(Error::Config("shutdown_timeout_ms must be > 0".to_string()));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(Error::Config("drain_poll_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

impl PlayerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.playback.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load from a resolved path, falling back to defaults when absent
    ///
    /// A path that does not exist logs a warning and yields defaults. A file
    /// that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Resolve which config file to read
///
/// Returns the first of: `cli_arg`, the `env_var_name` environment variable,
/// or the per-user config file if it exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform config file location (`~/.config/pcmout/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pcmout").join("config.toml"))
}
