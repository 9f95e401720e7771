//! Serial-port thermocouple reader
//!
//! The device is line oriented: every read optionally writes a query string,
//! then waits for one line of channel values separated by commas, semicolons
//! or whitespace. Stale input is discarded before each read so a sample
//! always reflects the device's current answer.
//!
//! A line that does not arrive within the read timeout is an empty read
//! (`Ok(None)`), not an error. I/O failures other than timeouts mean the
//! device is gone and are reported as [`ThermologError::SourceUnavailable`].

use super::source::{ChannelSource, RawReadings, SourceOpener, SourceStats};
use crate::error::{Result, ThermologError};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Longest line accepted from the device
const MAX_LINE_BYTES: usize = 256;

/// An open serial thermocouple reader
pub struct SerialSource {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    read_timeout: Duration,
    query: Option<Vec<u8>>,
    stats: SourceStats,
}

impl SerialSource {
    /// Open `name` at `baud_rate`
    pub fn open(
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
        query: Option<&str>,
    ) -> Result<Self> {
        let port = serialport::new(name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| ThermologError::SourceUnavailable(format!("{}: {}", name, e)))?;

        tracing::info!("Opened serial port {} @ {} baud", name, baud_rate);
        Ok(Self {
            port: Some(port),
            name: name.to_string(),
            read_timeout,
            query: query.map(|q| q.as_bytes().to_vec()),
            stats: SourceStats::default(),
        })
    }

    fn poll(&mut self) -> Result<Option<RawReadings>> {
        let port = self.port.as_mut().ok_or_else(|| {
            ThermologError::SourceUnavailable(format!("{} is closed", self.name))
        })?;

        port.clear(ClearBuffer::Input)
            .map_err(|e| ThermologError::SourceUnavailable(format!("{}: {}", self.name, e)))?;

        if let Some(query) = &self.query {
            port.write_all(query)
                .and_then(|_| port.flush())
                .map_err(|e| ThermologError::SourceUnavailable(format!("{}: {}", self.name, e)))?;
        }

        match read_line(port, self.read_timeout) {
            Ok(Some(line)) => {
                let parsed = parse_line(&line);
                if parsed.is_none() {
                    tracing::debug!("Unparseable line from {}: {:?}", self.name, line);
                }
                Ok(parsed)
            }
            Ok(None) => {
                tracing::debug!("No reply from {} within {:?}", self.name, self.read_timeout);
                Ok(None)
            }
            Err(e) => Err(ThermologError::SourceUnavailable(format!(
                "{}: {}",
                self.name, e
            ))),
        }
    }
}

impl ChannelSource for SerialSource {
    fn read(&mut self) -> Result<Option<RawReadings>> {
        let start = Instant::now();
        let result = self.poll();
        match &result {
            Ok(reply) => self.stats.record_read(start.elapsed(), reply.is_some()),
            Err(_) => self.stats.record_failure(),
        }
        result
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(
                "Closed serial port {} ({} reads, {:.1}% with data)",
                self.name,
                self.stats.completed_reads(),
                self.stats.success_rate()
            );
        }
    }

    fn stats(&self) -> &SourceStats {
        &self.stats
    }
}

/// Opens [`SerialSource`]s with a fixed read timeout and query
#[derive(Debug, Clone)]
pub struct SerialOpener {
    read_timeout: Duration,
    query: Option<String>,
}

impl SerialOpener {
    pub fn new(read_timeout: Duration, query: Option<String>) -> Self {
        Self {
            read_timeout,
            query,
        }
    }
}

impl SourceOpener for SerialOpener {
    fn open(&self, target: &str, baud_rate: u32) -> Result<Box<dyn ChannelSource>> {
        let source = SerialSource::open(target, baud_rate, self.read_timeout, self.query.as_deref())?;
        Ok(Box::new(source))
    }

    fn describe(&self) -> String {
        format!("serial (timeout {:?})", self.read_timeout)
    }
}

/// Serial port found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports
pub fn list_ports() -> Result<Vec<PortDescription>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let kind = match info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb.product.unwrap_or_default();
                    format!("USB {:04x}:{:04x} {}", usb.vid, usb.pid, product)
                        .trim_end()
                        .to_string()
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "Unknown".to_string(),
            };
            PortDescription {
                name: info.port_name,
                kind,
            }
        })
        .collect())
}

/// Read one non-empty line, giving up after `timeout`
///
/// Returns `Ok(None)` when nothing but blank lines arrived in time.
fn read_line<R: Read + ?Sized>(port: &mut R, timeout: Duration) -> std::io::Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    let mut line: Vec<u8> = Vec::with_capacity(64);
    let mut chunk = [0u8; 64];

    loop {
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &chunk[..n] {
                    if byte == b'\n' {
                        if line.iter().any(|b| !b.is_ascii_whitespace()) {
                            return Ok(Some(String::from_utf8_lossy(&line).trim().to_string()));
                        }
                        line.clear();
                    } else if line.len() < MAX_LINE_BYTES {
                        line.push(byte);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    let text = String::from_utf8_lossy(&line).trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Parse a device line into channel values
///
/// Fields may carry a unit suffix (`21.5C`, `21.5°C`). Fields that are not
/// numbers become `None`. A line without a single number is `None`.
pub fn parse_line(line: &str) -> Option<RawReadings> {
    let values: RawReadings = line
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .trim_end_matches(|c: char| c.is_alphabetic() || c == '°')
                .parse::<f64>()
                .ok()
        })
        .collect();

    if values.iter().any(Option::is_some) {
        Some(values)
    } else {
        None
    }
}
