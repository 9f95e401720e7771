//! # thermolog-rs: Timed Thermocouple Logger
//!
//! Periodically samples a multi-channel temperature device over a serial link,
//! appends every reading to a CSV log, and optionally keeps a bounded live
//! buffer for plotting.
//!
//! ## Architecture
//!
//! - **Backend**: Drift-free scheduler, channel sources and the run controller
//! - **Pipeline**: Raw values → canonical [`Sample`] → fan-out to sinks
//! - **Communication**: Crossbeam channels between the acquisition worker and
//!   any front end (stop requests in, samples/status/errors out)
//!
//! ## Configuration
//!
//! Optional defaults are read from `settings.toml` in the platform
//! configuration directory under `dev.thermolog.thermolog-rs`:
//!
//! - **Linux**: `~/.config/dev.thermolog.thermolog-rs/`
//! - **macOS**: `~/Library/Application Support/dev.thermolog.thermolog-rs/`
//! - **Windows**: `%APPDATA%\dev.thermolog.thermolog-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use thermolog_rs::{backend::{RunController, SerialOpener}, config::RunConfig};
//!
//! let config = RunConfig::builder("/dev/ttyUSB0", "run.csv")
//!     .interval_secs(5.0)
//!     .sample_limit(12)
//!     .build()?;
//! let opener = Arc::new(SerialOpener::new(config.read_timeout(), None));
//!
//! let (controller, _stop) = RunController::new(config, opener);
//! let summary = controller.run()?;
//! println!("Done. Samples written: {}", summary.samples_emitted);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use backend::{Acquisition, RunController, RunEvent, RunSummary, StopHandle};
pub use config::{RunConfig, Settings};
pub use error::{FailureKind, Result, ThermologError};
pub use pipeline::{FanOut, SamplePipeline, Sink, SinkHandle};
pub use types::{Reading, RunState, RunStatus, Sample, StopReason};
