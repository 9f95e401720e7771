//! Core data types for thermolog-rs
//!
//! This module contains the fundamental data structures shared by the
//! scheduler, the sample pipeline, the sinks and the front ends.
//!
//! # Main Types
//!
//! - [`Reading`] - One channel value: a temperature or the explicit unknown marker
//! - [`Sample`] - An immutable, timestamped set of readings produced once per tick
//! - [`RunStatus`] - The run controller's lifecycle state machine
//! - [`RunState`] - Counters and status observed by front ends
//!
//! # Unknown Readings
//!
//! A channel that produced no value is [`Reading::Unknown`], never `0.0`. The
//! durable log writes it as an empty field and the live buffer as `NaN`, so
//! neither output can mistake a missing reading for a real temperature.

use chrono::{NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use std::fmt::Write as _;

/// Number of thermocouple channels on the reference device
pub const DEFAULT_CHANNELS: usize = 4;

/// Local timestamp format used in logs and console output
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One channel value of a sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Reading {
    /// Temperature in degrees Celsius
    Celsius(f64),
    /// No value was obtained for this channel
    #[default]
    Unknown,
}

impl Reading {
    /// Build a reading from a raw optional value
    ///
    /// Non-finite values (`NaN`, `inf`) are invalid readings and become
    /// [`Reading::Unknown`].
    pub fn from_raw(raw: Option<f64>) -> Self {
        match raw {
            Some(v) if v.is_finite() => Reading::Celsius(v),
            _ => Reading::Unknown,
        }
    }

    /// The temperature, if known
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Celsius(v) => Some(*v),
            Reading::Unknown => None,
        }
    }

    /// Returns true if no value was obtained
    pub fn is_unknown(&self) -> bool {
        matches!(self, Reading::Unknown)
    }

    /// Value for plotting: unknown readings become `NaN` so they render as gaps
    pub fn plot_value(&self) -> f64 {
        self.value().unwrap_or(f64::NAN)
    }

    /// Append the CSV field for this reading (empty for unknown)
    pub fn write_csv_field(&self, out: &mut String) {
        if let Reading::Celsius(v) = self {
            let _ = write!(out, "{}", format_celsius(*v));
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Celsius(v) => write!(f, "{}", format_celsius(*v)),
            Reading::Unknown => write!(f, "None"),
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reading::Celsius(v) => serializer.serialize_f64(*v),
            Reading::Unknown => serializer.serialize_none(),
        }
    }
}

/// Format a temperature so integral values keep one decimal (`10.0`, not `10`)
pub fn format_celsius(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// A timestamped set of channel readings produced by one scheduler tick
///
/// Samples are immutable: fields are private and there are no setters. The
/// timestamp is local wall-clock time truncated to whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: NaiveDateTime,
    readings: Vec<Reading>,
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

impl Sample {
    /// Create a sample, truncating the timestamp to one-second resolution
    pub fn new(timestamp: NaiveDateTime, readings: Vec<Reading>) -> Self {
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        Self {
            timestamp,
            readings,
        }
    }

    /// Local capture time (whole seconds)
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Capture time formatted as `YYYY-MM-DD HH:MM:SS`
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// All channel readings in channel order
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Reading of a single channel (0-based)
    pub fn reading(&self, channel: usize) -> Option<Reading> {
        self.readings.get(channel).copied()
    }

    /// Number of channels in this sample
    pub fn channel_count(&self) -> usize {
        self.readings.len()
    }

    /// Returns true if every channel is unknown
    pub fn is_all_unknown(&self) -> bool {
        self.readings.iter().all(Reading::is_unknown)
    }

    /// Render this sample as one CSV data row, including the trailing newline
    pub fn csv_row(&self) -> String {
        let mut row = self.timestamp_string();
        for reading in &self.readings {
            row.push(',');
            reading.write_csv_field(&mut row);
        }
        row.push('\n');
        row
    }

    /// Human-readable one-line summary (`[ts] ch1=.. ch2=..`)
    pub fn summary_line(&self) -> String {
        let mut line = format!("[{}]", self.timestamp_string());
        for (i, reading) in self.readings.iter().enumerate() {
            let _ = write!(line, " ch{}={}", i + 1, reading);
        }
        line
    }
}

/// CSV header row for `channels` channels, including the trailing newline
pub fn csv_header(channels: usize) -> String {
    let mut header = String::from("timestamp_local");
    for i in 1..=channels {
        let _ = write!(header, ",ch{}_c", i);
    }
    header.push('\n');
    header
}

/// Lifecycle state of an acquisition run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunStatus {
    /// Nothing started yet
    #[default]
    Idle,
    /// Opening the source and sinks
    Starting,
    /// Ticking
    Running,
    /// Tearing down after a stop trigger
    Stopping,
    /// Resources released after a normal stop
    Stopped,
    /// Resources released after an unrecoverable error
    Failed,
}

impl RunStatus {
    /// Whether the state machine permits `self -> next`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Stopped | RunStatus::Failed)
    }

    /// Starting, Running or Stopping
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunStatus::Starting | RunStatus::Running | RunStatus::Stopping
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "Idle"),
            RunStatus::Starting => write!(f, "Starting"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Stopping => write!(f, "Stopping"),
            RunStatus::Stopped => write!(f, "Stopped"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Why a run left the Running state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The configured sample limit was reached
    SampleLimit,
    /// A stop was requested (or every stop handle was dropped)
    Cancelled,
    /// The source or a critical sink failed
    Fatal,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::SampleLimit => write!(f, "sample limit reached"),
            StopReason::Cancelled => write!(f, "stop requested"),
            StopReason::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Observable run state
///
/// Only the run controller mutates this; everything else receives snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    /// Samples delivered to the sinks so far
    pub samples_emitted: u64,
    /// True between Starting and the terminal state
    pub running: bool,
    /// Current lifecycle state
    pub status: RunStatus,
    /// Message of the error that failed the run, if any
    pub last_error: Option<String>,
}
