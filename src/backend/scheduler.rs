//! Drift-compensated tick scheduling
//!
//! The scheduler produces ticks on the grid `t0, t0 + interval, t0 + 2·interval, …`
//! measured on a monotonic clock. The next deadline is advanced *before* the
//! caller performs its read, so read latency never accumulates: a slow read
//! only delays the tick that follows it, and the one after is back on the grid.
//!
//! If a read overruns by more than a whole interval, the missed grid points
//! are skipped rather than fired back to back (no catch-up burst).
//!
//! Waiting is done through a [`Clock`], which also watches the run's command
//! channel so that a stop request wakes a sleeping scheduler immediately.
//! [`ManualClock`] replaces real time in simulations and tests.

use crate::backend::RunCommand;
use crate::config::MAX_INTERVAL_SECS;
use crate::error::{Result, ThermologError};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deadline was reached
    Elapsed,
    /// A stop was requested (or every stop handle was dropped)
    StopRequested,
}

/// Monotonic time source that can sleep until a deadline
pub trait Clock: Send + Sync {
    /// Current monotonic time
    fn now(&self) -> Instant;

    /// Block until `deadline` or until a stop arrives on `commands`
    ///
    /// A deadline in the past returns immediately unless a stop is pending.
    fn wait_until(&self, deadline: Instant, commands: &Receiver<RunCommand>) -> WaitOutcome;
}

/// Real monotonic clock backed by [`Instant`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant, commands: &Receiver<RunCommand>) -> WaitOutcome {
        match commands.recv_deadline(deadline) {
            Ok(RunCommand::Stop) => WaitOutcome::StopRequested,
            Err(RecvTimeoutError::Timeout) => WaitOutcome::Elapsed,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::StopRequested,
        }
    }
}

/// Simulated clock: time only moves when waited on or advanced explicitly
///
/// Waiting jumps straight to the deadline. Sources can call
/// [`ManualClock::advance`] to simulate read latency.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// The instant this clock started at
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Simulated time since [`ManualClock::origin`]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wait_until(&self, deadline: Instant, commands: &Receiver<RunCommand>) -> WaitOutcome {
        match commands.try_recv() {
            Ok(RunCommand::Stop) | Err(TryRecvError::Disconnected) => {
                return WaitOutcome::StopRequested
            }
            Err(TryRecvError::Empty) => {}
        }
        let target = deadline.saturating_duration_since(self.origin);
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        if target > *elapsed {
            *elapsed = target;
        }
        WaitOutcome::Elapsed
    }
}

/// One scheduled acquisition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based tick number
    pub index: u64,
    /// Grid time this tick was scheduled for
    pub deadline: Instant,
    /// When the wait actually returned
    pub fired_at: Instant,
    /// Grid points skipped because the previous read overran them
    pub skipped: u64,
}

impl Tick {
    /// How far behind its deadline this tick fired
    pub fn lateness(&self) -> Duration {
        self.fired_at.saturating_duration_since(self.deadline)
    }
}

/// Result of waiting for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Perform a read now
    Tick(Tick),
    /// A stop was observed at the tick boundary
    Cancelled,
}

/// Drift-free tick generator
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    next_deadline: Option<Instant>,
    ticks: u64,
    skipped_total: u64,
}

impl Scheduler {
    /// Create a scheduler
    ///
    /// A zero interval is rejected instead of busy-looping, and one above
    /// [`MAX_INTERVAL_SECS`] because its deadlines could overflow [`Instant`].
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ThermologError::Config(
                "scheduler interval must be greater than zero".to_string(),
            ));
        }
        if interval > Duration::from_secs(MAX_INTERVAL_SECS) {
            return Err(ThermologError::Config(format!(
                "scheduler interval {:?} exceeds {} seconds",
                interval, MAX_INTERVAL_SECS
            )));
        }
        Ok(Self {
            interval,
            next_deadline: None,
            ticks: 0,
            skipped_total: 0,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline of the next tick (None before the first tick)
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Number of ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Grid points skipped over the whole run
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    /// Wait for the next tick
    ///
    /// The first call fires immediately and fixes `t0`. On return the next
    /// deadline has already been advanced, so the caller's read time does not
    /// shift later ticks.
    pub fn next_tick(&mut self, clock: &dyn Clock, commands: &Receiver<RunCommand>) -> TickOutcome {
        let deadline = *self.next_deadline.get_or_insert_with(|| clock.now());

        if clock.wait_until(deadline, commands) == WaitOutcome::StopRequested {
            return TickOutcome::Cancelled;
        }
        let fired_at = clock.now();

        let mut skipped = 0;
        let mut next = deadline + self.interval;
        if next <= fired_at {
            let behind = fired_at.duration_since(deadline).as_nanos();
            skipped = (behind / self.interval.as_nanos()) as u64;
            next = advance(deadline, self.interval, skipped + 1);
            self.skipped_total += skipped;
            tracing::warn!(
                "Tick {} fired {:?} late, skipping {} missed deadline(s)",
                self.ticks,
                fired_at.duration_since(deadline),
                skipped
            );
        }
        self.next_deadline = Some(next);

        let tick = Tick {
            index: self.ticks,
            deadline,
            fired_at,
            skipped,
        };
        self.ticks += 1;
        TickOutcome::Tick(tick)
    }
}

fn advance(from: Instant, interval: Duration, steps: u64) -> Instant {
    let nanos = interval.as_nanos().saturating_mul(steps as u128);
    from + Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}
