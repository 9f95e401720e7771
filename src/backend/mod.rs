//! Backend module: timed acquisition from a channel source
//!
//! This module runs the tick loop that reads the temperature device and
//! feeds the sample pipeline. A run can execute on the caller's thread
//! ([`RunController::run`]) or on a background worker ([`Acquisition`]).
//!
//! # Architecture
//!
//! The worker communicates with its front end via crossbeam channels:
//!
//! - [`RunCommand`] - The only message into a run: a cooperative stop
//! - [`RunEvent`] - Messages out of a run (samples, status changes, fatal errors)
//! - [`StopHandle`] - Front-end side of the command channel
//! - [`Acquisition`] - Spawns the worker thread and owns the event channel
//!
//! # Components
//!
//! - [`Scheduler`] - Drift-free tick generation on a monotonic [`Clock`]
//! - [`ChannelSource`] / [`SourceOpener`] - Device contract
//! - [`SerialSource`] - Real device on a serial port
//! - [`MockSource`] - Simulated device for tests and demos
//! - [`RunController`] - State machine, resource ownership and teardown
//!
//! # Example
//!
//! ```ignore
//! use thermolog_rs::backend::{Acquisition, RunEvent, SerialOpener};
//!
//! let mut acquisition = Acquisition::new(Arc::new(SerialOpener::new(timeout, None)));
//! acquisition.start(config)?;
//!
//! for event in acquisition.drain() {
//!     match event {
//!         RunEvent::Sample(sample) => println!("{}", sample.summary_line()),
//!         RunEvent::StatusChanged { message, .. } => println!("{}", message),
//!         RunEvent::FatalError { message, .. } => eprintln!("{}", message),
//!     }
//! }
//! ```

pub mod controller;
pub mod mock_source;
pub mod scheduler;
pub mod serial;
pub mod source;
pub mod worker;

pub use controller::{RunController, RunStateReader, RunSummary, StopHandle};
pub use mock_source::{MockOpener, MockPattern, MockSource};
pub use scheduler::{Clock, ManualClock, MonotonicClock, Scheduler, Tick, TickOutcome, WaitOutcome};
pub use serial::{list_ports, parse_line, PortDescription, SerialOpener, SerialSource};
pub use source::{ChannelSource, RawReadings, SourceOpener, SourceStats};
pub use worker::Acquisition;

use crate::error::FailureKind;
use crate::types::{RunStatus, Sample};

/// Message sent from the front end to a running acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    /// Stop at the next tick boundary
    Stop,
}

/// Message sent from a run to its front end
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// One per tick, after every sink was offered the sample
    Sample(Sample),
    /// State machine transition with a human-readable description
    StatusChanged { status: RunStatus, message: String },
    /// The run failed; always followed by no further events from that run
    FatalError { kind: FailureKind, message: String },
}
