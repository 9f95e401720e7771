//! Sample pipeline and sink fan-out.
//!
//! Every tick, raw channel values flow through three stages:
//!
//! ```text
//! [ChannelSource] ──► [SamplePipeline] ──► [FanOut] ──► [DurableLogSink]   (critical)
//!                                                  └──► [LiveBufferSink]   (non-critical)
//!                                                  └──► [custom Sink ...]
//! ```
//!
//! # Design
//!
//! - **Explicit unknowns**: a missing or short read becomes a row of
//!   [`Reading::Unknown`], never zeros and never a shorter row.
//! - **Enum dispatch for built-ins**: [`SinkHandle`] wraps the two built-in
//!   sinks directly and boxes only custom sinks.
//! - **Isolation**: one sink's failure never prevents the others from
//!   receiving the same sample; only critical sinks can end a run.

pub mod fanout;
pub mod sink;
pub mod sinks;

pub use fanout::{FanOut, SinkReport};
pub use sink::{Criticality, Sink, SinkHandle};
pub use sinks::{DurableLogSink, LiveBuffer, LiveBufferReader, LiveBufferSink, LiveSnapshot};

use crate::types::{Reading, Sample};
use chrono::NaiveDateTime;

/// Turns raw channel values into canonical [`Sample`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePipeline {
    channels: usize,
}

impl SamplePipeline {
    /// Pipeline producing samples of exactly `channels` readings
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Build a sample stamped with the current local time
    ///
    /// Call this after the read returns: the timestamp is captured here.
    pub fn process(&self, raw: Option<&[Option<f64>]>) -> Sample {
        self.process_at(raw, chrono::Local::now().naive_local())
    }

    /// Build a sample with an explicit timestamp
    ///
    /// - `None` or fewer than `channels` values: every reading is unknown
    /// - extra values beyond `channels` are ignored
    /// - non-finite values become unknown
    pub fn process_at(&self, raw: Option<&[Option<f64>]>, timestamp: NaiveDateTime) -> Sample {
        let readings = match raw {
            Some(values) if values.len() >= self.channels => values[..self.channels]
                .iter()
                .map(|v| Reading::from_raw(*v))
                .collect(),
            _ => vec![Reading::Unknown; self.channels],
        };
        Sample::new(timestamp, readings)
    }
}
