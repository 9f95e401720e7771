//! Synchronous, sequential delivery of each sample to every sink.
//!
//! A failing sink is recorded against its own [`SinkReport`] and the
//! remaining sinks still receive the sample. Only after every sink has been
//! offered the sample does a critical failure surface to the caller.

use super::sink::{Criticality, SinkHandle};
use crate::error::Result;
use crate::types::Sample;
use serde::Serialize;

/// Per-sink delivery counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkReport {
    pub name: String,
    pub critical: bool,
    /// Samples accepted without error
    pub accepted: u64,
    /// Open, accept or close calls that failed
    pub failures: u64,
    pub last_error: Option<String>,
}

impl SinkReport {
    fn new(name: &str, criticality: Criticality) -> Self {
        Self {
            name: name.to_string(),
            critical: criticality.is_critical(),
            accepted: 0,
            failures: 0,
            last_error: None,
        }
    }

    fn record_failure(&mut self, message: String) {
        self.failures += 1;
        self.last_error = Some(message);
    }
}

struct SinkSlot {
    handle: SinkHandle,
    report: SinkReport,
    /// Open succeeded; only active sinks receive samples
    active: bool,
}

/// Ordered set of sinks for one run
#[derive(Default)]
pub struct FanOut {
    slots: Vec<SinkSlot>,
    closed: bool,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink; delivery order is registration order
    pub fn add(&mut self, sink: impl Into<SinkHandle>) {
        let handle = sink.into();
        let report = SinkReport::new(handle.name(), handle.criticality());
        self.slots.push(SinkSlot {
            handle,
            report,
            active: false,
        });
    }

    pub fn with_sink(mut self, sink: impl Into<SinkHandle>) -> Self {
        self.add(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Open every sink in order
    ///
    /// A non-critical sink that fails to open is skipped for the rest of the
    /// run. The first critical open failure is returned immediately; sinks
    /// already opened stay open until [`FanOut::close_all`].
    pub fn open_all(&mut self) -> Result<()> {
        for slot in &mut self.slots {
            match slot.handle.open() {
                Ok(()) => slot.active = true,
                Err(e) => {
                    slot.report.record_failure(e.to_string());
                    if slot.handle.criticality().is_critical() {
                        tracing::error!("Critical sink '{}' failed to open: {}", slot.report.name, e);
                        return Err(e);
                    }
                    tracing::warn!("Sink '{}' failed to open, disabled: {}", slot.report.name, e);
                }
            }
        }
        Ok(())
    }

    /// Offer `sample` to every active sink
    ///
    /// Returns the first critical sink error, after all sinks have been
    /// offered the sample.
    pub fn distribute(&mut self, sample: &Sample) -> Result<()> {
        let mut critical_error = None;

        for slot in self.slots.iter_mut().filter(|s| s.active) {
            match slot.handle.accept(sample) {
                Ok(()) => slot.report.accepted += 1,
                Err(e) => {
                    slot.report.record_failure(e.to_string());
                    if slot.handle.criticality().is_critical() {
                        tracing::error!("Critical sink '{}' failed: {}", slot.report.name, e);
                        critical_error.get_or_insert(e);
                    } else {
                        tracing::warn!("Sink '{}' failed (isolated): {}", slot.report.name, e);
                    }
                }
            }
        }

        match critical_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every registered sink exactly once
    ///
    /// Every sink is closed even if an earlier close fails. Returns the
    /// first critical close error. Later calls are no-ops.
    pub fn close_all(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut critical_error = None;
        for slot in &mut self.slots {
            slot.active = false;
            if let Err(e) = slot.handle.close() {
                slot.report.record_failure(e.to_string());
                if slot.handle.criticality().is_critical() {
                    tracing::error!("Critical sink '{}' failed to close: {}", slot.report.name, e);
                    critical_error.get_or_insert(e);
                } else {
                    tracing::warn!("Sink '{}' failed to close: {}", slot.report.name, e);
                }
            }
        }

        match critical_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Delivery counters, in registration order
    pub fn reports(&self) -> Vec<SinkReport> {
        self.slots.iter().map(|s| s.report.clone()).collect()
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("sinks", &self.slots.iter().map(|s| &s.report.name).collect::<Vec<_>>())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThermologError;
    use crate::pipeline::sink::{MockSink, Sink};
    use crate::types::Reading;
    use chrono::NaiveDate;

    fn sample() -> Sample {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Sample::new(ts, vec![Reading::Celsius(20.0)])
    }

    fn mock_sink(name: &str, criticality: Criticality) -> MockSink {
        let mut sink = MockSink::new();
        sink.expect_name().return_const(name.to_string());
        sink.expect_criticality().return_const(criticality);
        sink.expect_open().returning(|| Ok(()));
        sink
    }

    fn boxed(sink: MockSink) -> SinkHandle {
        SinkHandle::Custom(Box::new(sink) as Box<dyn Sink>)
    }

    #[test]
    fn test_failing_non_critical_sink_is_isolated() {
        let mut flaky = mock_sink("flaky", Criticality::NonCritical);
        flaky
            .expect_accept()
            .times(2)
            .returning(|_| Err(ThermologError::sink("flaky", "boom")));
        flaky.expect_close().times(1).returning(|| Ok(()));

        let mut steady = mock_sink("steady", Criticality::Critical);
        steady.expect_accept().times(2).returning(|_| Ok(()));
        steady.expect_close().times(1).returning(|| Ok(()));

        let mut fanout = FanOut::new().with_sink(boxed(flaky)).with_sink(boxed(steady));
        fanout.open_all().unwrap();
        fanout.distribute(&sample()).unwrap();
        fanout.distribute(&sample()).unwrap();
        fanout.close_all().unwrap();

        let reports = fanout.reports();
        assert_eq!(reports[0].failures, 2);
        assert_eq!(reports[0].accepted, 0);
        assert_eq!(reports[1].accepted, 2);
        assert_eq!(reports[1].failures, 0);
    }

    #[test]
    fn test_critical_failure_surfaces_after_all_sinks_offered() {
        let mut critical = mock_sink("log", Criticality::Critical);
        critical
            .expect_accept()
            .times(1)
            .returning(|_| Err(ThermologError::sink("log", "disk full")));
        critical.expect_close().returning(|| Ok(()));

        let mut later = mock_sink("later", Criticality::NonCritical);
        later.expect_accept().times(1).returning(|_| Ok(()));
        later.expect_close().returning(|| Ok(()));

        let mut fanout = FanOut::new().with_sink(boxed(critical)).with_sink(boxed(later));
        fanout.open_all().unwrap();
        let err = fanout.distribute(&sample()).unwrap_err();
        assert!(matches!(err, ThermologError::Sink { .. }));
        assert_eq!(fanout.reports()[1].accepted, 1);
    }

    #[test]
    fn test_non_critical_open_failure_disables_sink() {
        let mut broken = MockSink::new();
        broken.expect_name().return_const("broken".to_string());
        broken
            .expect_criticality()
            .return_const(Criticality::NonCritical);
        broken
            .expect_open()
            .returning(|| Err(ThermologError::sink("broken", "no display")));
        broken.expect_accept().never();
        broken.expect_close().times(1).returning(|| Ok(()));

        let mut fanout = FanOut::new().with_sink(boxed(broken));
        fanout.open_all().unwrap();
        fanout.distribute(&sample()).unwrap();
        fanout.close_all().unwrap();
        assert_eq!(fanout.reports()[0].failures, 1);
    }

    #[test]
    fn test_critical_open_failure_is_returned() {
        let mut log = MockSink::new();
        log.expect_name().return_const("log".to_string());
        log.expect_criticality().return_const(Criticality::Critical);
        log.expect_open()
            .returning(|| Err(ThermologError::sink("log", "read-only")));
        log.expect_close().times(1).returning(|| Ok(()));

        let mut fanout = FanOut::new().with_sink(boxed(log));
        assert!(fanout.open_all().is_err());
        fanout.close_all().unwrap();
    }

    #[test]
    fn test_close_all_runs_once_and_closes_everything() {
        let mut first = mock_sink("first", Criticality::NonCritical);
        first
            .expect_close()
            .times(1)
            .returning(|| Err(ThermologError::sink("first", "flush failed")));
        let mut second = mock_sink("second", Criticality::Critical);
        second.expect_close().times(1).returning(|| Ok(()));

        let mut fanout = FanOut::new().with_sink(boxed(first)).with_sink(boxed(second));
        fanout.open_all().unwrap();
        fanout.close_all().unwrap();
        fanout.close_all().unwrap();
        assert!(fanout.is_closed());
    }

    #[test]
    fn test_empty_fanout() {
        let mut fanout = FanOut::new();
        assert!(fanout.is_empty());
        fanout.open_all().unwrap();
        fanout.distribute(&sample()).unwrap();
        fanout.close_all().unwrap();
    }
}
