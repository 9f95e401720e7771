//! Background acquisition worker
//!
//! [`Acquisition`] runs each [`RunController`] on a dedicated thread named
//! `acquisition` and keeps the front-end side of both channels:
//!
//! - **Commands**: only a cooperative stop ([`Acquisition::stop`])
//! - **Events**: samples, status changes and fatal errors, drained with
//!   [`Acquisition::drain`] / [`Acquisition::try_recv`] / [`Acquisition::recv_timeout`]
//!
//! The worker owns the source and all sink writes. The front end observes
//! the live buffer through a read-only [`LiveBufferReader`].
//!
//! [`Acquisition::wait`] keeps receiving while it joins, so a worker blocked
//! on a full event channel can always finish. Events received that way are
//! kept and handed out by the receive methods before newer ones.
//!
//! # Backpressure
//!
//! The event channel is bounded. Sample events are sent with `try_send` and
//! dropped (and counted) when the front end falls behind; the durable log is
//! unaffected. Status and fatal events use a blocking send so they are never
//! lost.

use super::controller::{RunController, RunStateReader, RunSummary, StopHandle};
use super::scheduler::Clock;
use super::source::SourceOpener;
use super::RunEvent;
use crate::config::{RunConfig, DEFAULT_LIVE_BUFFER_POINTS};
use crate::error::{Result, ThermologError};
use crate::pipeline::{LiveBufferReader, SinkHandle};
use crate::types::RunState;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the event channel
///
/// Hours of samples at typical intervals; only a stalled front end fills it.
pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Worker thread name
const WORKER_THREAD_NAME: &str = "acquisition";

/// Poll period while waiting for the worker to exit
const JOIN_POLL: Duration = Duration::from_millis(5);

struct ActiveRun {
    stop: StopHandle,
    state: RunStateReader,
    live_buffer: Option<LiveBufferReader>,
    worker: Option<JoinHandle<Result<RunSummary>>>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn join(&mut self) -> Option<Result<RunSummary>> {
        let worker = self.worker.take()?;
        Some(worker.join().unwrap_or_else(|_| {
            Err(ThermologError::Internal(
                "acquisition worker panicked".to_string(),
            ))
        }))
    }
}

/// Front-end handle for background acquisition runs
pub struct Acquisition {
    opener: Arc<dyn SourceOpener>,
    clock: Option<Arc<dyn Clock>>,
    live_buffer_points: usize,
    event_tx: Sender<RunEvent>,
    event_rx: Receiver<RunEvent>,
    backlog: VecDeque<RunEvent>,
    current: Option<ActiveRun>,
}

impl Acquisition {
    /// Create an idle acquisition front end using `opener` for every run
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            opener,
            clock: None,
            live_buffer_points: DEFAULT_LIVE_BUFFER_POINTS,
            event_tx,
            event_rx,
            backlog: VecDeque::new(),
            current: None,
        }
    }

    /// Live buffer capacity per channel for future runs (0 disables it)
    pub fn with_live_buffer_points(mut self, points: usize) -> Self {
        self.live_buffer_points = points;
        self
    }

    /// Clock for future runs (simulated time in tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Start a run; fails with [`ThermologError::AlreadyRunning`] if one is live
    pub fn start(&mut self, config: RunConfig) -> Result<()> {
        self.start_with_sinks(config, Vec::new())
    }

    /// Start a run with extra sinks (delivered after the built-in ones)
    pub fn start_with_sinks(&mut self, config: RunConfig, sinks: Vec<SinkHandle>) -> Result<()> {
        if self.is_running() {
            tracing::warn!("Start rejected: a run is already in progress");
            return Err(ThermologError::AlreadyRunning);
        }
        self.reap();

        let (mut controller, stop) = RunController::new(config, Arc::clone(&self.opener));
        controller = controller.with_events(self.event_tx.clone());
        if self.live_buffer_points > 0 {
            controller = controller.with_live_buffer(self.live_buffer_points);
        }
        if let Some(clock) = &self.clock {
            controller = controller.with_clock(Arc::clone(clock));
        }
        for sink in sinks {
            controller = controller.with_sink(sink);
        }

        let state = controller.state();
        let live_buffer = controller.live_buffer();
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || controller.run())
            .map_err(|e| ThermologError::Internal(format!("failed to spawn worker: {}", e)))?;

        tracing::info!("Acquisition worker started ({})", self.opener.describe());
        self.current = Some(ActiveRun {
            stop,
            state,
            live_buffer,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Request a cooperative stop of the current run
    pub fn stop(&self) {
        if let Some(run) = &self.current {
            run.stop.request_stop();
        }
    }

    /// True while the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(ActiveRun::is_running)
    }

    /// Stop handle of the current run (e.g. for a signal handler)
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.current.as_ref().map(|run| run.stop.clone())
    }

    /// State of the current (or last) run
    pub fn state(&self) -> Option<RunState> {
        self.current.as_ref().map(|run| run.state.snapshot())
    }

    /// Live buffer of the current (or last) run
    pub fn live_buffer(&self) -> Option<LiveBufferReader> {
        self.current.as_ref().and_then(|run| run.live_buffer.clone())
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        self.backlog
            .pop_front()
            .or_else(|| self.event_rx.try_recv().ok())
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<RunEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain all pending events
    pub fn drain(&mut self) -> Vec<RunEvent> {
        let mut events: Vec<RunEvent> = self.backlog.drain(..).collect();
        events.extend(self.event_rx.try_iter());
        events
    }

    /// Join the current run's worker and return its result
    ///
    /// Events arriving meanwhile are buffered, not dropped.
    pub fn wait(&mut self) -> Result<RunSummary> {
        let Some(run) = self.current.as_mut() else {
            return Err(ThermologError::Internal(
                "no acquisition run to wait for".to_string(),
            ));
        };
        while run.is_running() {
            if let Ok(event) = self.event_rx.recv_timeout(JOIN_POLL) {
                self.backlog.push_back(event);
            }
        }
        self.backlog.extend(self.event_rx.try_iter());
        run.join().unwrap_or_else(|| {
            Err(ThermologError::Internal(
                "acquisition run was already joined".to_string(),
            ))
        })
    }

    /// Join a finished worker nobody waited for
    fn reap(&mut self) {
        if let Some(result) = self.current.as_mut().and_then(ActiveRun::join) {
            match result {
                Ok(summary) => tracing::debug!(
                    "Reaped previous run: {} samples, {}",
                    summary.samples_emitted,
                    summary.stop_reason
                ),
                Err(e) => tracing::debug!("Reaped previous run: {}", e),
            }
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if let Some(run) = self.current.as_mut() {
            run.stop.request_stop();
            // keep the worker from blocking on a full event channel while we join
            while run.is_running() {
                while self.event_rx.try_recv().is_ok() {}
                std::thread::sleep(JOIN_POLL);
            }
            if let Some(Err(e)) = run.join() {
                tracing::debug!("Acquisition dropped after failed run: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_source::{MockOpener, MockPattern};
    use crate::backend::scheduler::ManualClock;
    use crate::types::{RunStatus, StopReason};

    fn config(dir: &tempfile::TempDir, limit: u64) -> RunConfig {
        RunConfig::builder("MOCK0", dir.path().join("run.csv"))
            .interval_secs(0.05)
            .sample_limit(limit)
            .build()
            .unwrap()
    }

    #[test]
    fn test_acquisition_creation() {
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::default()));
        assert!(!acquisition.is_running());
        assert!(acquisition.state().is_none());
        assert!(acquisition.try_recv().is_none());
        assert!(acquisition.live_buffer().is_none());
    }

    #[test]
    fn test_wait_without_run_is_error() {
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::default()));
        assert!(acquisition.wait().is_err());
    }

    #[test]
    fn test_bounded_run_completes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::new(MockPattern::Counter {
            start: 1.0,
            step: 1.0,
        })))
        .with_clock(Arc::new(ManualClock::new()));

        acquisition.start(config(&dir, 5)).unwrap();
        let summary = acquisition.wait().unwrap();
        assert_eq!(summary.samples_emitted, 5);
        assert_eq!(summary.stop_reason, StopReason::SampleLimit);
        assert_eq!(acquisition.state().unwrap().status, RunStatus::Stopped);
        assert_eq!(acquisition.live_buffer().unwrap().len(), 5);

        let samples = acquisition
            .drain()
            .into_iter()
            .filter(|e| matches!(e, RunEvent::Sample(_)))
            .count();
        assert_eq!(samples, 5);
    }

    #[test]
    fn test_restart_after_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::default()))
            .with_clock(Arc::new(ManualClock::new()))
            .with_live_buffer_points(0);

        acquisition.start(config(&dir, 1)).unwrap();
        while acquisition.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        // finished worker is reaped by the next start
        acquisition.start(config(&dir, 1)).unwrap();
        assert!(acquisition.wait().is_ok());
        assert!(acquisition.live_buffer().is_none());
    }

    #[test]
    fn test_wait_without_draining_long_run() {
        let dir = tempfile::tempdir().unwrap();
        let limit = EVENT_CHANNEL_CAPACITY as u64 + 100;
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::new(MockPattern::Counter {
            start: 0.0,
            step: 1.0,
        })))
        .with_clock(Arc::new(ManualClock::new()))
        .with_live_buffer_points(0);

        acquisition.start(config(&dir, limit)).unwrap();
        let summary = acquisition.wait().unwrap();
        assert_eq!(summary.samples_emitted, limit);
        assert_eq!(summary.final_status, RunStatus::Stopped);

        let rows = std::fs::read_to_string(dir.path().join("run.csv"))
            .unwrap()
            .lines()
            .count() as u64;
        assert_eq!(rows, limit + 1);

        let events = acquisition.drain();
        let samples = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Sample(_)))
            .count() as u64;
        assert_eq!(samples + summary.dropped_events, limit);
        assert!(matches!(
            events.last(),
            Some(RunEvent::StatusChanged {
                status: RunStatus::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn test_wait_twice_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut acquisition = Acquisition::new(Arc::new(MockOpener::default()))
            .with_clock(Arc::new(ManualClock::new()));

        acquisition.start(config(&dir, 1)).unwrap();
        assert!(acquisition.wait().is_ok());
        assert!(acquisition.wait().is_err());
        assert!(acquisition.state().is_some());
    }
}
