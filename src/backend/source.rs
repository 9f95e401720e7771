//! ChannelSource trait for the temperature device
//!
//! This module provides the contract between the acquisition engine and the
//! device it samples, enabling both the real serial reader and a mock device
//! for testing.
//!
//! Opening is explicit: a [`SourceOpener`] either returns a ready source or an
//! error, there is no half-open handle to probe afterwards.

use crate::error::Result;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the rolling window for recent read times
const RECENT_WINDOW_SIZE: usize = 100;

/// Raw channel values as returned by a device read
///
/// `None` entries are channels the device reported without a usable value.
pub type RawReadings = Vec<Option<f64>>;

/// Statistics for source reads
///
/// Tracks success counts and latency for reads. Empty reads (the device
/// answered, but with nothing usable) are counted separately from failures.
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Reads that returned channel values
    pub successful_reads: u64,
    /// Reads that returned no usable data
    pub empty_reads: u64,
    /// Reads that failed with an error
    pub failed_reads: u64,
    /// Last read time in microseconds
    pub last_read_time_us: u64,
    /// Minimum read time observed (microseconds)
    pub min_read_time_us: u64,
    /// Maximum read time observed (microseconds)
    pub max_read_time_us: u64,
    /// Rolling window of recent read times for jitter calculation
    pub recent_read_times: VecDeque<u64>,
    total_read_time_us: u64,
}

impl Default for SourceStats {
    fn default() -> Self {
        Self {
            successful_reads: 0,
            empty_reads: 0,
            failed_reads: 0,
            last_read_time_us: 0,
            min_read_time_us: u64::MAX,
            max_read_time_us: 0,
            recent_read_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
            total_read_time_us: 0,
        }
    }
}

impl SourceStats {
    /// Total number of completed reads (successful or empty)
    pub fn completed_reads(&self) -> u64 {
        self.successful_reads + self.empty_reads
    }

    /// Average latency of completed reads in microseconds
    pub fn avg_read_time_us(&self) -> f64 {
        let completed = self.completed_reads();
        if completed == 0 {
            0.0
        } else {
            self.total_read_time_us as f64 / completed as f64
        }
    }

    /// Percentage of reads that returned values
    pub fn success_rate(&self) -> f64 {
        let total = self.completed_reads() + self.failed_reads;
        if total == 0 {
            100.0
        } else {
            (self.successful_reads as f64 / total as f64) * 100.0
        }
    }

    /// Record a completed read and its latency
    pub fn record_read(&mut self, elapsed: Duration, had_data: bool) {
        let time_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        if had_data {
            self.successful_reads += 1;
        } else {
            self.empty_reads += 1;
        }
        self.total_read_time_us = self.total_read_time_us.saturating_add(time_us);
        self.last_read_time_us = time_us;
        self.min_read_time_us = self.min_read_time_us.min(time_us);
        self.max_read_time_us = self.max_read_time_us.max(time_us);

        self.recent_read_times.push_back(time_us);
        if self.recent_read_times.len() > RECENT_WINDOW_SIZE {
            self.recent_read_times.pop_front();
        }
    }

    /// Record a failed read
    pub fn record_failure(&mut self) {
        self.failed_reads += 1;
    }

    /// Jitter (max - min) over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_read_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_read_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// An open temperature device
///
/// The acquisition worker owns the source exclusively for the duration of a
/// run; implementations must be `Send` so the source can move onto the
/// worker thread.
#[cfg_attr(test, mockall::automock)]
pub trait ChannelSource: Send {
    /// Read one set of channel values
    ///
    /// - `Ok(Some(values))`: the device answered; values may be short or contain gaps
    /// - `Ok(None)`: nothing usable this time (timeout, garbled line)
    /// - `Err(_)`: the device is gone; the run cannot continue
    ///
    /// There is no upper bound on how long this may block.
    fn read(&mut self) -> Result<Option<RawReadings>>;

    /// Release the device. Called exactly once by the run controller.
    fn close(&mut self);

    /// Read statistics
    fn stats(&self) -> &SourceStats;
}

/// Factory for [`ChannelSource`] handles
///
/// Shared across runs by the background acquisition front end, hence
/// `Send + Sync`.
pub trait SourceOpener: Send + Sync {
    /// Open `target` at `baud_rate`
    fn open(&self, target: &str, baud_rate: u32) -> Result<Box<dyn ChannelSource>>;

    /// Short description for logs
    fn describe(&self) -> String {
        "channel source".to_string()
    }
}
