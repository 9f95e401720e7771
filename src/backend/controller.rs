//! Run controller: lifecycle of one acquisition run
//!
//! The controller exclusively owns the channel source and every sink for the
//! duration of a run. [`RunController::run`] blocks until the run ends and is
//! used directly by a foreground front end, or on the worker thread spawned
//! by [`Acquisition`](super::Acquisition).
//!
//! # State machine
//!
//! ```text
//! Idle ─► Starting ─► Running ─► Stopping ─► Stopped
//!            │           │           │
//!            └───────────┴───────────┴─────► Failed
//! ```
//!
//! - Source open failure: `Starting → Failed`, no ticks.
//! - Sample limit or stop request: `Running → Stopping → Stopped`.
//! - Critical sink failure: `Running → Stopping → Failed`.
//! - Source read failure: `Running → Failed`.
//!
//! Whatever the path, the source and all sinks are released exactly once
//! before the terminal state is published.

use super::scheduler::{Clock, MonotonicClock, Scheduler, TickOutcome};
use super::source::{ChannelSource, SourceOpener};
use super::{RunCommand, RunEvent};
use crate::config::{format_interval, RunConfig};
use crate::error::{FailureKind, Result, ThermologError};
use crate::pipeline::{
    DurableLogSink, FanOut, LiveBufferReader, LiveBufferSink, SamplePipeline, SinkHandle,
    SinkReport,
};
use crate::types::{RunState, RunStatus, Sample, StopReason};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Capacity of the stop-request channel
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Sends cooperative stop requests to a run
///
/// Requests are observed at the next tick boundary; an in-flight read always
/// completes. Dropping every handle of a run counts as a stop request.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<RunCommand>,
}

impl StopHandle {
    /// Ask the run to stop; repeated calls are harmless
    pub fn request_stop(&self) {
        // a full channel already holds a pending stop
        let _ = self.tx.try_send(RunCommand::Stop);
    }
}

/// Read-only view of a run's state
#[derive(Debug, Clone)]
pub struct RunStateReader {
    state: Arc<RwLock<RunState>>,
}

impl RunStateReader {
    pub fn snapshot(&self) -> RunState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> RunStatus {
        self.state.read().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn samples_emitted(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .samples_emitted
    }
}

/// Outcome of a run that ended without a fatal error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub samples_emitted: u64,
    pub final_status: RunStatus,
    pub stop_reason: StopReason,
    /// Grid points skipped because reads overran the interval
    pub skipped_ticks: u64,
    /// Sample events dropped because the event channel was full
    pub dropped_events: u64,
    pub sink_reports: Vec<SinkReport>,
}

/// Owns and drives one acquisition run
pub struct RunController {
    config: RunConfig,
    opener: Arc<dyn SourceOpener>,
    pipeline: SamplePipeline,
    fanout: FanOut,
    live_reader: Option<LiveBufferReader>,
    events: Option<Sender<RunEvent>>,
    dropped_events: u64,
    clock: Arc<dyn Clock>,
    commands: Receiver<RunCommand>,
    state: Arc<RwLock<RunState>>,
    source: Option<Box<dyn ChannelSource>>,
}

impl RunController {
    /// Create a controller for `config`; the durable log is always the first sink
    pub fn new(config: RunConfig, opener: Arc<dyn SourceOpener>) -> (Self, StopHandle) {
        let (tx, rx) = bounded(COMMAND_CHANNEL_CAPACITY);
        let log = DurableLogSink::new(config.output_path(), config.append(), config.channels());

        let controller = Self {
            pipeline: SamplePipeline::new(config.channels()),
            fanout: FanOut::new().with_sink(log),
            live_reader: None,
            events: None,
            dropped_events: 0,
            clock: Arc::new(MonotonicClock),
            commands: rx,
            state: Arc::new(RwLock::new(RunState::default())),
            source: None,
            config,
            opener,
        };
        (controller, StopHandle { tx })
    }

    /// Register an additional sink (delivered after the durable log)
    pub fn with_sink(mut self, sink: impl Into<SinkHandle>) -> Self {
        self.fanout.add(sink);
        self
    }

    /// Keep the last `max_points` samples per channel for plotting
    pub fn with_live_buffer(mut self, max_points: usize) -> Self {
        let sink = LiveBufferSink::new(self.config.channels(), max_points);
        self.live_reader = Some(sink.reader());
        self.fanout.add(sink);
        self
    }

    /// Publish samples and status changes on `events`
    pub fn with_events(mut self, events: Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> RunStateReader {
        RunStateReader {
            state: Arc::clone(&self.state),
        }
    }

    /// Reader of the live buffer, if one was configured
    pub fn live_buffer(&self) -> Option<LiveBufferReader> {
        self.live_reader.clone()
    }

    /// Run to completion
    ///
    /// Returns the summary of a run that reached `Stopped`, or the error
    /// that moved it to `Failed`.
    pub fn run(mut self) -> Result<RunSummary> {
        self.transition(
            RunStatus::Starting,
            format!(
                "Opening {} @ {} baud",
                self.config.connection_target(),
                self.config.baud_rate()
            ),
        )?;

        match self
            .opener
            .open(self.config.connection_target(), self.config.baud_rate())
        {
            Ok(source) => self.source = Some(source),
            Err(e) => return self.fail(e),
        }
        if let Err(e) = self.fanout.open_all() {
            return self.fail(e);
        }
        let mut scheduler = match Scheduler::new(self.config.interval()) {
            Ok(scheduler) => scheduler,
            Err(e) => return self.fail(e),
        };

        self.transition(
            RunStatus::Running,
            format!(
                "Running: {}, {} baud, interval={}s",
                self.config.connection_target(),
                self.config.baud_rate(),
                format_interval(self.config.interval())
            ),
        )?;

        match self.acquire(&mut scheduler) {
            Ok(reason) => {
                self.transition(RunStatus::Stopping, format!("Stopping: {}", reason))?;
                if let Err(e) = self.release() {
                    return self.fail(e);
                }
                self.transition(RunStatus::Stopped, "Stopped.".to_string())?;

                let summary = RunSummary {
                    samples_emitted: self.state().samples_emitted(),
                    final_status: RunStatus::Stopped,
                    stop_reason: reason,
                    skipped_ticks: scheduler.skipped_total(),
                    dropped_events: self.dropped_events,
                    sink_reports: self.fanout.reports(),
                };
                tracing::info!(
                    "Run finished: {} samples, {} ({} skipped ticks, {} dropped events)",
                    summary.samples_emitted,
                    reason,
                    summary.skipped_ticks,
                    summary.dropped_events
                );
                Ok(summary)
            }
            Err(e) => {
                if e.failure_kind() == FailureKind::Sink {
                    self.transition(RunStatus::Stopping, format!("Stopping: {}", e))?;
                }
                self.fail(e)
            }
        }
    }

    /// Tick loop; returns why the run stopped, or the fatal error
    fn acquire(&mut self, scheduler: &mut Scheduler) -> Result<StopReason> {
        let limit = self.config.sample_limit();
        let mut emitted: u64 = 0;

        loop {
            if limit > 0 && emitted >= limit {
                return Ok(StopReason::SampleLimit);
            }

            let tick = match scheduler.next_tick(self.clock.as_ref(), &self.commands) {
                TickOutcome::Tick(tick) => tick,
                TickOutcome::Cancelled => return Ok(StopReason::Cancelled),
            };

            let source = self
                .source
                .as_mut()
                .ok_or_else(|| ThermologError::Internal("source not open".to_string()))?;
            let raw = source.read()?;
            let sample = self.pipeline.process(raw.as_deref());

            tracing::debug!(
                "Tick {} (late {:?}): {}",
                tick.index,
                tick.lateness(),
                sample.summary_line()
            );

            self.fanout.distribute(&sample)?;

            emitted += 1;
            self.update_state(|state| state.samples_emitted = emitted);
            self.emit_sample(sample);
        }
    }

    /// Close the source and every sink; safe to call more than once
    fn release(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            source.close();
            let stats = source.stats();
            tracing::debug!(
                "Source stats: {} ok, {} empty, {} failed, avg {:.0}us, jitter {}us",
                stats.successful_reads,
                stats.empty_reads,
                stats.failed_reads,
                stats.avg_read_time_us(),
                stats.jitter_us()
            );
        }
        self.fanout.close_all()
    }

    /// Release everything, publish `Failed`, and hand the error back
    fn fail(&mut self, error: ThermologError) -> Result<RunSummary> {
        if let Err(close_error) = self.release() {
            tracing::error!("Error while releasing after failure: {}", close_error);
        }

        let message = error.to_string();
        tracing::error!("Run failed: {}", message);
        self.update_state(|state| state.last_error = Some(message.clone()));
        self.transition(RunStatus::Failed, format!("Failed: {}", message))?;
        self.emit(RunEvent::FatalError {
            kind: error.failure_kind(),
            message,
        });
        Err(error)
    }

    fn transition(&mut self, next: RunStatus, message: String) -> Result<()> {
        let current = self.state().status();
        if !current.can_transition_to(next) {
            return Err(ThermologError::Internal(format!(
                "illegal state transition {} -> {}",
                current, next
            )));
        }
        self.update_state(|state| {
            state.status = next;
            state.running = next.is_active();
        });
        tracing::info!("{} -> {}: {}", current, next, message);
        self.emit(RunEvent::StatusChanged {
            status: next,
            message,
        });
        Ok(())
    }

    fn update_state(&self, f: impl FnOnce(&mut RunState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    /// Blocking send for status and fatal events
    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Non-blocking send for samples; a full channel drops the event only
    fn emit_sample(&mut self, sample: Sample) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(RunEvent::Sample(sample)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_events += 1;
                if self.dropped_events == 1 || self.dropped_events % 100 == 0 {
                    tracing::warn!(
                        "Event channel full, {} sample events dropped",
                        self.dropped_events
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        // no-op after a normal run; covers early returns and unwinding
        if let Err(e) = self.release() {
            tracing::error!("Error releasing run resources on drop: {}", e);
        }
    }
}
