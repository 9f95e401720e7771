//! Persistent settings loaded from a TOML file
//!
//! Settings provide defaults for every front-end option. The command line
//! overrides whatever the file specifies, and a missing default file simply
//! yields [`Settings::default`].
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! interval_secs = 2.5
//! count = 0
//! append = true
//! live_buffer_points = 3000
//! ```

use super::{
    DEFAULT_BAUD_RATE, DEFAULT_INTERVAL_SECS, DEFAULT_LIVE_BUFFER_POINTS, DEFAULT_READ_TIMEOUT_MS,
};
use crate::error::{Result, ResultExt, ThermologError};
use crate::types::DEFAULT_CHANNELS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Front-end defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial endpoint
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Sampling interval in seconds
    pub interval_secs: f64,
    /// Samples to collect (0 = until stopped)
    pub count: u64,
    /// Output CSV path; a timestamped name is generated when absent
    pub out: Option<PathBuf>,
    /// Append to an existing log instead of starting a new one
    pub append: bool,
    /// Channels per sample
    pub channels: usize,
    /// Query string written before each read (devices that need polling)
    pub query: Option<String>,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Live buffer capacity per channel (0 disables the live buffer)
    pub live_buffer_points: usize,
    /// Directory for rolling log files
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            interval_secs: DEFAULT_INTERVAL_SECS,
            count: 0,
            out: None,
            append: false,
            channels: DEFAULT_CHANNELS,
            query: None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            live_buffer_points: DEFAULT_LIVE_BUFFER_POINTS,
            log_dir: None,
        }
    }
}

/// Platform-typical first serial port
fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThermologError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content).with_context(|| format!("{:?}", path))
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ThermologError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load from an explicit path, or from the default location if it exists
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match super::settings_path() {
                Some(path) if path.exists() => {
                    tracing::debug!("Loading settings from {:?}", path);
                    Self::load(path)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    /// Save settings as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        super::ensure_parent_dir(path)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| ThermologError::Serialization(format!("settings: {}", e)))?;
        std::fs::write(path, content)
            .map_err(ThermologError::from)
            .with_context(|| format!("Failed to write settings file {:?}", path))
    }
}
