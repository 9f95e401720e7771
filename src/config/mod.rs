//! Configuration module for thermolog-rs
//!
//! This module handles run configuration including:
//! - [`RunConfig`] - The validated, immutable parameters of one acquisition run
//! - [`Settings`] - Optional TOML file providing defaults for the front ends
//! - Output path helpers (default file name, parent directory creation)
//!
//! # Settings Location
//!
//! When no explicit path is given, settings are read from the platform
//! configuration directory under `dev.thermolog.thermolog-rs`:
//!
//! - **Linux**: `~/.config/dev.thermolog.thermolog-rs/settings.toml`
//! - **macOS**: `~/Library/Application Support/dev.thermolog.thermolog-rs/settings.toml`
//! - **Windows**: `%APPDATA%\dev.thermolog.thermolog-rs\settings.toml`
//!
//! # Example
//!
//! ```ignore
//! use thermolog_rs::config::RunConfig;
//!
//! let config = RunConfig::builder("/dev/ttyUSB0", "run.csv")
//!     .baud_rate(9600)
//!     .interval_secs(5.0)
//!     .sample_limit(10)
//!     .build()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{ThermologError, Result};
use crate::types::DEFAULT_CHANNELS;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for configuration directories
pub const APP_ID: &str = "dev.thermolog.thermolog-rs";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default sampling interval in seconds
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// Longest accepted sampling interval (one week)
///
/// Keeps every tick deadline representable as an [`std::time::Instant`].
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default number of samples kept per channel by the live buffer
pub const DEFAULT_LIVE_BUFFER_POINTS: usize = 3000;

/// Default serial read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

/// Get the path to the default settings file
pub fn settings_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(SETTINGS_FILE))
}

/// Default output file name: `thermocouple_YYYYmmdd_HHMMSS.csv` (local time)
pub fn default_output_path() -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("thermocouple_{}.csv", ts))
}

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ThermologError::Config(format!(
                    "Failed to create output directory {:?}: {}",
                    parent, e
                ))
            })?;
        }
    }
    Ok(())
}

/// Validate a sampling interval given in (fractional) seconds
///
/// Rejects non-finite, zero and negative values, and values too small to be
/// represented as a non-zero [`Duration`].
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ThermologError::Config(format!(
            "interval must be > 0 seconds (got {})",
            secs
        )));
    }
    if secs > MAX_INTERVAL_SECS as f64 {
        return Err(ThermologError::Config(format!(
            "interval must be at most {} seconds (got {})",
            MAX_INTERVAL_SECS, secs
        )));
    }
    let interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| ThermologError::Config(format!("invalid interval {}: {}", secs, e)))?;
    if interval.is_zero() {
        return Err(ThermologError::Config(format!(
            "interval {} s rounds down to zero",
            secs
        )));
    }
    Ok(interval)
}

/// Seconds as shown in status text (`5.0`, `0.25`)
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{:.1}", secs)
    } else {
        format!("{}", secs)
    }
}

/// Immutable parameters of one acquisition run
///
/// Only constructible through [`RunConfigBuilder::build`], which enforces
/// `interval > 0`, a positive baud rate, and non-empty target/output.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    connection_target: String,
    baud_rate: u32,
    interval: Duration,
    sample_limit: u64,
    output_path: PathBuf,
    append: bool,
    channels: usize,
    read_timeout: Duration,
    query: Option<String>,
}

impl RunConfig {
    /// Start building a configuration for `target`, logging to `output`
    pub fn builder(target: impl Into<String>, output: impl Into<PathBuf>) -> RunConfigBuilder {
        RunConfigBuilder::new(target, output)
    }

    /// Serial endpoint (e.g. `/dev/ttyUSB0`, `COM3`)
    pub fn connection_target(&self) -> &str {
        &self.connection_target
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Tick period (always non-zero)
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of samples to collect, 0 = unbounded
    pub fn sample_limit(&self) -> u64 {
        self.sample_limit
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn append(&self) -> bool {
        self.append
    }

    /// Number of channels per sample
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Per-read timeout applied by the serial source
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Optional query string written to the device before each read
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns true if the run stops on its own after `sample_limit` samples
    pub fn is_bounded(&self) -> bool {
        self.sample_limit > 0
    }
}

/// Builder for [`RunConfig`]
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    connection_target: String,
    baud_rate: u32,
    interval_secs: f64,
    sample_limit: u64,
    output_path: PathBuf,
    append: bool,
    channels: usize,
    read_timeout: Duration,
    query: Option<String>,
}

impl RunConfigBuilder {
    fn new(target: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            connection_target: target.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            interval_secs: DEFAULT_INTERVAL_SECS,
            sample_limit: 0,
            output_path: output.into(),
            append: false,
            channels: DEFAULT_CHANNELS,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            query: None,
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Sampling interval in seconds (must be > 0)
    pub fn interval_secs(mut self, secs: f64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs_f64();
        self
    }

    /// 0 = run until stopped
    pub fn sample_limit(mut self, limit: u64) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<RunConfig> {
        let interval = interval_from_secs(self.interval_secs)?;

        let connection_target = self.connection_target.trim().to_string();
        if connection_target.is_empty() {
            return Err(ThermologError::Config(
                "connection target must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ThermologError::Config("baud rate must be > 0".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ThermologError::Config(
                "output path must not be empty".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(ThermologError::Config(
                "channel count must be at least 1".to_string(),
            ));
        }

        Ok(RunConfig {
            connection_target,
            baud_rate: self.baud_rate,
            interval,
            sample_limit: self.sample_limit,
            output_path: self.output_path,
            append: self.append,
            channels: self.channels,
            read_timeout: self.read_timeout,
            query: self.query,
        })
    }
}
