//! Error handling for thermolog-rs
//!
//! This module defines the crate-wide error type and a Result alias. The
//! variants follow the acquisition failure taxonomy: configuration errors are
//! raised before any I/O, source and critical sink errors end a run, and
//! non-critical sink errors are reported but never propagated this far.

use thiserror::Error;

/// Main error type for thermolog-rs operations
#[derive(Error, Debug)]
pub enum ThermologError {
    /// Invalid run configuration (rejected before any I/O)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The channel source could not be opened or read
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A sink refused a sample or failed to open/close
    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    /// A start was requested while a run is still live
    #[error("An acquisition run is already in progress")]
    AlreadyRunning,

    /// Invariant violation inside the engine
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ThermologError>,
    },
}

/// Coarse classification carried by fatal error events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected configuration
    Config,
    /// Channel source open/read failure
    SourceUnavailable,
    /// Critical sink failure
    Sink,
    /// Anything else (invariant violations, worker spawn failures)
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Config => write!(f, "configuration"),
            FailureKind::SourceUnavailable => write!(f, "source unavailable"),
            FailureKind::Sink => write!(f, "sink failure"),
            FailureKind::Internal => write!(f, "internal"),
        }
    }
}

impl ThermologError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ThermologError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a sink error
    pub fn sink(sink: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ThermologError::Sink {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    /// Classify this error, looking through any context wrappers
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ThermologError::Config(_) => FailureKind::Config,
            ThermologError::SourceUnavailable(_) | ThermologError::Serial(_) => {
                FailureKind::SourceUnavailable
            }
            ThermologError::Sink { .. } => FailureKind::Sink,
            ThermologError::WithContext { source, .. } => source.failure_kind(),
            _ => FailureKind::Internal,
        }
    }
}

/// Result type alias for thermolog-rs operations
pub type Result<T> = std::result::Result<T, ThermologError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
