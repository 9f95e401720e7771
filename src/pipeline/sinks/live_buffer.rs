//! LiveBufferSink: keeps the most recent samples per channel for plotting.
//!
//! The buffer is a fixed-capacity ring per channel (oldest evicted first).
//! Unknown readings are stored as `NaN` so plots show a gap, not a zero.
//!
//! The worker owns the only [`LiveBufferSink`] (the writer). Front ends get
//! cheap cloneable [`LiveBufferReader`]s that can only take snapshots.

use crate::error::{Result, ThermologError};
use crate::pipeline::sink::{Criticality, Sink};
use crate::types::Sample;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

const NAME: &str = "live-buffer";

/// Bounded per-channel history
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    max_points: usize,
    sample_numbers: VecDeque<u64>,
    channels: Vec<VecDeque<f64>>,
    latest: Option<Sample>,
    total_pushed: u64,
}

impl LiveBuffer {
    /// Buffer of `channels` series holding at most `max_points` each (min 1)
    pub fn new(channels: usize, max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            max_points,
            sample_numbers: VecDeque::with_capacity(max_points),
            channels: (0..channels)
                .map(|_| VecDeque::with_capacity(max_points))
                .collect(),
            latest: None,
            total_pushed: 0,
        }
    }

    /// Append a sample, evicting the oldest point once full
    pub fn push(&mut self, sample: &Sample) {
        if self.sample_numbers.len() == self.max_points {
            self.sample_numbers.pop_front();
            for series in &mut self.channels {
                series.pop_front();
            }
        }

        self.sample_numbers.push_back(self.total_pushed);
        for (i, series) in self.channels.iter_mut().enumerate() {
            let y = sample.reading(i).map_or(f64::NAN, |r| r.plot_value());
            series.push_back(y);
        }
        self.latest = Some(sample.clone());
        self.total_pushed += 1;
    }

    /// Points currently held per channel
    pub fn len(&self) -> usize {
        self.sample_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_numbers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_points
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples pushed since creation (including evicted ones)
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.latest.as_ref()
    }

    /// `[sample_number, value]` points of one channel
    pub fn series(&self, channel: usize) -> Vec<[f64; 2]> {
        match self.channels.get(channel) {
            Some(series) => self
                .sample_numbers
                .iter()
                .zip(series)
                .map(|(&x, &y)| [x as f64, y])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Copy the whole buffer out
    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            sample_numbers: self.sample_numbers.iter().copied().collect(),
            channels: self
                .channels
                .iter()
                .map(|series| series.iter().copied().collect())
                .collect(),
            latest: self.latest.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.sample_numbers.clear();
        for series in &mut self.channels {
            series.clear();
        }
        self.latest = None;
        self.total_pushed = 0;
    }
}

/// Point-in-time copy of a [`LiveBuffer`]
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    /// Sample number (since run start) of each point, oldest first
    pub sample_numbers: Vec<u64>,
    /// One series per channel, aligned with `sample_numbers`; NaN = unknown
    pub channels: Vec<Vec<f64>>,
    /// Most recent sample
    pub latest: Option<Sample>,
}

/// Writer side; lives on the acquisition worker
pub struct LiveBufferSink {
    buffer: Arc<RwLock<LiveBuffer>>,
}

impl LiveBufferSink {
    pub fn new(channels: usize, max_points: usize) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(LiveBuffer::new(channels, max_points))),
        }
    }

    /// Read-only handle for front ends
    pub fn reader(&self) -> LiveBufferReader {
        LiveBufferReader {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Sink for LiveBufferSink {
    fn name(&self) -> &str {
        NAME
    }

    fn criticality(&self) -> Criticality {
        Criticality::NonCritical
    }

    fn accept(&mut self, sample: &Sample) -> Result<()> {
        let mut buffer = self
            .buffer
            .write()
            .map_err(|_| ThermologError::sink(NAME, "buffer lock poisoned by a reader"))?;
        buffer.push(sample);
        Ok(())
    }
}

/// Read-only view of a live buffer
#[derive(Clone)]
pub struct LiveBufferReader {
    buffer: Arc<RwLock<LiveBuffer>>,
}

impl LiveBufferReader {
    pub fn snapshot(&self) -> LiveSnapshot {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn series(&self, channel: usize) -> Vec<[f64; 2]> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .series(channel)
    }

    pub fn len(&self) -> usize {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_pushed(&self) -> u64 {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .total_pushed()
    }
}

impl std::fmt::Debug for LiveBufferReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBufferReader")
            .field("len", &self.len())
            .finish()
    }
}
