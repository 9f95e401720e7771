//! Sink trait and enum dispatch over built-in sinks.
//!
//! A sink goes through `open` → `accept`* → `close`. The run controller
//! guarantees `close` is called exactly once for every sink that was
//! registered, whether or not `open` succeeded.

use super::sinks::{DurableLogSink, LiveBufferSink};
use crate::error::Result;
use crate::types::Sample;

/// Whether a sink failure ends the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure is fatal: the run stops and is reported as failed
    Critical,
    /// Failure is logged and counted; delivery continues
    NonCritical,
}

impl Criticality {
    pub fn is_critical(&self) -> bool {
        matches!(self, Criticality::Critical)
    }
}

/// A consumer of samples
#[cfg_attr(test, mockall::automock)]
pub trait Sink: Send {
    /// Name used in logs and sink reports
    fn name(&self) -> &str;

    /// Whether a failure of this sink ends the run
    fn criticality(&self) -> Criticality {
        Criticality::NonCritical
    }

    /// Called once before the first sample
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Deliver one sample
    fn accept(&mut self, sample: &Sample) -> Result<()>;

    /// Flush and release resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Enum dispatch for sinks: built-ins inline, custom sinks boxed
pub enum SinkHandle {
    DurableLog(DurableLogSink),
    LiveBuffer(LiveBufferSink),
    Custom(Box<dyn Sink>),
}

impl SinkHandle {
    pub fn name(&self) -> &str {
        match self {
            SinkHandle::DurableLog(s) => s.name(),
            SinkHandle::LiveBuffer(s) => s.name(),
            SinkHandle::Custom(s) => s.name(),
        }
    }

    pub fn criticality(&self) -> Criticality {
        match self {
            SinkHandle::DurableLog(s) => s.criticality(),
            SinkHandle::LiveBuffer(s) => s.criticality(),
            SinkHandle::Custom(s) => s.criticality(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        match self {
            SinkHandle::DurableLog(s) => s.open(),
            SinkHandle::LiveBuffer(s) => s.open(),
            SinkHandle::Custom(s) => s.open(),
        }
    }

    pub fn accept(&mut self, sample: &Sample) -> Result<()> {
        match self {
            SinkHandle::DurableLog(s) => s.accept(sample),
            SinkHandle::LiveBuffer(s) => s.accept(sample),
            SinkHandle::Custom(s) => s.accept(sample),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            SinkHandle::DurableLog(s) => s.close(),
            SinkHandle::LiveBuffer(s) => s.close(),
            SinkHandle::Custom(s) => s.close(),
        }
    }
}

impl From<DurableLogSink> for SinkHandle {
    fn from(sink: DurableLogSink) -> Self {
        SinkHandle::DurableLog(sink)
    }
}

impl From<LiveBufferSink> for SinkHandle {
    fn from(sink: LiveBufferSink) -> Self {
        SinkHandle::LiveBuffer(sink)
    }
}

impl From<Box<dyn Sink>> for SinkHandle {
    fn from(sink: Box<dyn Sink>) -> Self {
        SinkHandle::Custom(sink)
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.name())
            .field("criticality", &self.criticality())
            .finish()
    }
}
