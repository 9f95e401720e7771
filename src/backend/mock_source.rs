//! Mock channel source for testing and demos
//!
//! This module provides a simulated thermocouple reader that can be used
//! without real hardware. It generates channel values from configurable
//! patterns and can inject latency, gaps and failures.
//!
//! # Data Patterns
//!
//! - [`MockPattern::Constant`] - The same reply on every read
//! - [`MockPattern::Sequence`] - Scripted replies, then empty reads
//! - [`MockPattern::Sine`] - Slow temperature swing, phase-shifted per channel
//! - [`MockPattern::Counter`] - Incrementing values (handy for ordering checks)
//!
//! # Example
//!
//! ```ignore
//! use thermolog_rs::backend::mock_source::{MockOpener, MockPattern};
//!
//! let opener = MockOpener::new(MockPattern::Constant(vec![Some(10.0), None, Some(12.5), Some(9.9)]))
//!     .with_latency(Duration::from_millis(20))
//!     .with_fail_after(100);
//! ```

use super::scheduler::ManualClock;
use super::source::{ChannelSource, RawReadings, SourceOpener, SourceStats};
use crate::error::{Result, ThermologError};
use crate::types::DEFAULT_CHANNELS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pattern for generating mock readings
#[derive(Debug, Clone, PartialEq)]
pub enum MockPattern {
    /// Same reply every read
    Constant(RawReadings),
    /// One reply per read; `None` entries are empty reads. Exhausted = empty reads.
    Sequence(Vec<Option<RawReadings>>),
    /// Sine wave around `offset`, channel `i` shifted by `i/channels` of a period
    Sine {
        offset: f64,
        amplitude: f64,
        period_secs: f64,
    },
    /// Counter starting at `start`, every channel reads the same value
    Counter { start: f64, step: f64 },
}

impl Default for MockPattern {
    fn default() -> Self {
        MockPattern::Sine {
            offset: 25.0,
            amplitude: 5.0,
            period_secs: 60.0,
        }
    }
}

/// Shared knobs cloned into every source the opener hands out
#[derive(Debug, Clone)]
struct MockSettings {
    pattern: MockPattern,
    channels: usize,
    latency: Duration,
    clock: Option<Arc<ManualClock>>,
    fail_after: Option<u64>,
    dead_channels: Vec<usize>,
    noise_amplitude: f64,
}

/// Simulated thermocouple reader
pub struct MockSource {
    settings: MockSettings,
    target: String,
    reads: u64,
    counter_value: f64,
    start_time: Instant,
    stats: SourceStats,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl MockSource {
    fn new(settings: MockSettings, target: &str, closes: Arc<AtomicUsize>) -> Self {
        let counter_value = match settings.pattern {
            MockPattern::Counter { start, .. } => start,
            _ => 0.0,
        };
        Self {
            settings,
            target: target.to_string(),
            reads: 0,
            counter_value,
            start_time: Instant::now(),
            stats: SourceStats::default(),
            closes,
            closed: false,
        }
    }

    /// Number of read calls served so far
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn elapsed_secs(&self) -> f64 {
        match &self.settings.clock {
            Some(clock) => clock.elapsed().as_secs_f64(),
            None => self.start_time.elapsed().as_secs_f64(),
        }
    }

    fn simulate_latency(&self) {
        if self.settings.latency.is_zero() {
            return;
        }
        match &self.settings.clock {
            Some(clock) => clock.advance(self.settings.latency),
            None => std::thread::sleep(self.settings.latency),
        }
    }

    fn generate(&mut self) -> Option<RawReadings> {
        let channels = self.settings.channels;
        let reply = match &self.settings.pattern {
            MockPattern::Constant(values) => Some(values.clone()),
            MockPattern::Sequence(replies) => {
                // reads is already incremented for this call
                replies.get(self.reads as usize - 1).cloned().flatten()
            }
            MockPattern::Sine {
                offset,
                amplitude,
                period_secs,
            } => {
                let t = self.elapsed_secs();
                let values = (0..channels)
                    .map(|ch| {
                        let phase = ch as f64 / channels as f64;
                        let angle = 2.0 * std::f64::consts::PI * (t / period_secs + phase);
                        Some(offset + amplitude * angle.sin())
                    })
                    .collect();
                Some(values)
            }
            MockPattern::Counter { step, .. } => {
                let value = self.counter_value;
                self.counter_value += step;
                Some(vec![Some(value); channels])
            }
        };

        reply.map(|mut values| {
            for &dead in &self.settings.dead_channels {
                if let Some(slot) = values.get_mut(dead) {
                    *slot = None;
                }
            }
            if self.settings.noise_amplitude > 0.0 {
                for value in values.iter_mut().flatten() {
                    *value += (rand_simple() - 0.5) * 2.0 * self.settings.noise_amplitude;
                }
            }
            values
        })
    }
}

impl ChannelSource for MockSource {
    fn read(&mut self) -> Result<Option<RawReadings>> {
        let start = Instant::now();
        self.reads += 1;

        if let Some(limit) = self.settings.fail_after {
            if self.reads > limit {
                self.stats.record_failure();
                return Err(ThermologError::SourceUnavailable(format!(
                    "mock device {} disconnected after {} reads",
                    self.target, limit
                )));
            }
        }

        self.simulate_latency();
        let reply = self.generate();
        self.stats.record_read(start.elapsed(), reply.is_some());
        Ok(reply)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::info!("Mock source {} closed after {} reads", self.target, self.reads);
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self) -> &SourceStats {
        &self.stats
    }
}

/// Opens [`MockSource`]s; also counts opens and closes for lifecycle checks
#[derive(Debug, Clone)]
pub struct MockOpener {
    settings: MockSettings,
    open_error: Option<String>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Default for MockOpener {
    fn default() -> Self {
        Self::new(MockPattern::default())
    }
}

impl MockOpener {
    /// Create an opener producing `pattern`
    pub fn new(pattern: MockPattern) -> Self {
        Self {
            settings: MockSettings {
                pattern,
                channels: DEFAULT_CHANNELS,
                latency: Duration::ZERO,
                clock: None,
                fail_after: None,
                dead_channels: Vec::new(),
                noise_amplitude: 0.0,
            },
            open_error: None,
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Channels generated by the Sine and Counter patterns
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.settings.channels = channels;
        self
    }

    /// Time each read takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.settings.latency = latency;
        self
    }

    /// Charge latency to a simulated clock instead of sleeping
    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.settings.clock = Some(clock);
        self
    }

    /// Reads after the first `reads` fail with a source error
    pub fn with_fail_after(mut self, reads: u64) -> Self {
        self.settings.fail_after = Some(reads);
        self
    }

    /// Channels (0-based) that never produce a value
    pub fn with_dead_channels(mut self, channels: Vec<usize>) -> Self {
        self.settings.dead_channels = channels;
        self
    }

    /// Add uniform noise of +/- `amplitude`
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.settings.noise_amplitude = amplitude;
        self
    }

    /// Every open fails with `message`
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// How many sources were opened successfully
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many times `close` was called across all opened sources
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SourceOpener for MockOpener {
    fn open(&self, target: &str, baud_rate: u32) -> Result<Box<dyn ChannelSource>> {
        if let Some(message) = &self.open_error {
            return Err(ThermologError::SourceUnavailable(format!(
                "{}: {}",
                target, message
            )));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Mock source opened: {} @ {} baud", target, baud_rate);
        Ok(Box::new(MockSource::new(
            self.settings.clone(),
            target,
            Arc::clone(&self.closes),
        )))
    }

    fn describe(&self) -> String {
        format!("mock source ({:?})", self.settings.pattern)
    }
}

/// Simple pseudo-random number generator (no external dependency)
fn rand_simple() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static SEED: Cell<u64> = const { Cell::new(12345) };
    }
    SEED.with(|seed| {
        let mut s = seed.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        seed.set(s);
        (s as f64) / (u64::MAX as f64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(opener: &MockOpener) -> Box<dyn ChannelSource> {
        opener.open("MOCK0", 9600).unwrap()
    }

    #[test]
    fn test_constant_pattern() {
        let opener = MockOpener::new(MockPattern::Constant(vec![Some(10.0), None, Some(12.5)]));
        let mut source = open(&opener);
        for _ in 0..3 {
            assert_eq!(
                source.read().unwrap(),
                Some(vec![Some(10.0), None, Some(12.5)])
            );
        }
        assert_eq!(source.stats().successful_reads, 3);
    }

    #[test]
    fn test_sequence_then_empty() {
        let opener = MockOpener::new(MockPattern::Sequence(vec![
            Some(vec![Some(1.0)]),
            None,
            Some(vec![Some(3.0)]),
        ]));
        let mut source = open(&opener);
        assert_eq!(source.read().unwrap(), Some(vec![Some(1.0)]));
        assert_eq!(source.read().unwrap(), None);
        assert_eq!(source.read().unwrap(), Some(vec![Some(3.0)]));
        assert_eq!(source.read().unwrap(), None);
        assert_eq!(source.stats().empty_reads, 2);
    }

    #[test]
    fn test_counter_pattern() {
        let opener =
            MockOpener::new(MockPattern::Counter { start: 1.0, step: 0.5 }).with_channels(2);
        let mut source = open(&opener);
        assert_eq!(source.read().unwrap(), Some(vec![Some(1.0), Some(1.0)]));
        assert_eq!(source.read().unwrap(), Some(vec![Some(1.5), Some(1.5)]));
    }

    #[test]
    fn test_sine_stays_in_range() {
        let opener = MockOpener::default().with_channels(4);
        let mut source = open(&opener);
        let values = source.read().unwrap().unwrap();
        assert_eq!(values.len(), 4);
        for value in values.into_iter().flatten() {
            assert!((20.0..=30.0).contains(&value));
        }
    }

    #[test]
    fn test_dead_channels() {
        let opener = MockOpener::new(MockPattern::Constant(vec![Some(1.0); 4]))
            .with_dead_channels(vec![1, 3, 9]);
        let mut source = open(&opener);
        assert_eq!(
            source.read().unwrap(),
            Some(vec![Some(1.0), None, Some(1.0), None])
        );
    }

    #[test]
    fn test_fail_after() {
        let opener = MockOpener::new(MockPattern::Constant(vec![Some(1.0)])).with_fail_after(2);
        let mut source = open(&opener);
        assert!(source.read().is_ok());
        assert!(source.read().is_ok());
        let err = source.read().unwrap_err();
        assert!(matches!(err, ThermologError::SourceUnavailable(_)));
        assert_eq!(source.stats().failed_reads, 1);
    }

    #[test]
    fn test_failing_open() {
        let opener = MockOpener::default().failing_open("no such port");
        let err = opener.open("COM99", 9600).err().unwrap();
        assert!(err.to_string().contains("COM99"));
        assert_eq!(opener.open_count(), 0);
    }

    #[test]
    fn test_latency_charged_to_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let opener = MockOpener::new(MockPattern::Constant(vec![Some(1.0)]))
            .with_latency(Duration::from_millis(250))
            .with_clock(Arc::clone(&clock));
        let mut source = open(&opener);
        source.read().unwrap();
        source.read().unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn test_close_counter_shared_with_opener() {
        let opener = MockOpener::default();
        let mut source = open(&opener);
        source.close();
        assert_eq!(opener.open_count(), 1);
        assert_eq!(opener.close_count(), 1);
    }
}
