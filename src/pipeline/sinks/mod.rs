//! Built-in sinks.

pub mod durable_log;
pub mod live_buffer;

pub use durable_log::DurableLogSink;
pub use live_buffer::{LiveBuffer, LiveBufferReader, LiveBufferSink, LiveSnapshot};
