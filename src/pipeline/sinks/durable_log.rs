//! DurableLogSink: appends one CSV row per sample and syncs it to disk.
//!
//! Header policy is decided at construction: a header is written only when
//! the file did not exist and append mode is off. An existing file is never
//! truncated or given a second header.

use crate::config::ensure_parent_dir;
use crate::error::{Result, ThermologError};
use crate::pipeline::sink::{Criticality, Sink};
use crate::types::{csv_header, Sample};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const NAME: &str = "durable-log";

/// Critical CSV sink
pub struct DurableLogSink {
    path: PathBuf,
    channels: usize,
    write_header: bool,
    file: Option<File>,
    rows_written: u64,
}

impl DurableLogSink {
    /// Prepare a log at `path` with `channels` temperature columns
    pub fn new(path: impl Into<PathBuf>, append: bool, channels: usize) -> Self {
        let path = path.into();
        let existed = path.exists();
        Self {
            write_header: !existed && !append,
            path,
            channels,
            file: None,
            rows_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `open` writes a header row
    pub fn writes_header(&self) -> bool {
        self.write_header
    }

    /// Data rows written by this sink (header excluded)
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn error(&self, message: impl std::fmt::Display) -> ThermologError {
        log_error(&self.path, message)
    }

    fn write_synced(&mut self, text: &str) -> Result<()> {
        let path = &self.path;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| log_error(path, "log is not open"))?;
        append_all(file, text).map_err(|e| log_error(path, e))
    }
}

/// Append-only storage a log row is written to
trait RowTarget: Write {
    /// Bytes currently stored
    fn stored_len(&self) -> io::Result<u64>;

    /// Cut stored data back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Force written data to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl RowTarget for File {
    fn stored_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write `text` completely and sync it, or roll the target back
///
/// A failed write (disk full, I/O error) must not leave a partial row that a
/// later append would continue after.
fn append_all<T: RowTarget>(target: &mut T, text: &str) -> io::Result<()> {
    let len = target.stored_len()?;
    let result = target
        .write_all(text.as_bytes())
        .and_then(|_| target.sync());
    if let Err(e) = result {
        if let Err(rollback) = target.truncate(len).and_then(|_| target.sync()) {
            tracing::error!("Failed to roll back partial log row: {}", rollback);
        }
        return Err(e);
    }
    Ok(())
}

fn log_error(path: &Path, message: impl std::fmt::Display) -> ThermologError {
    ThermologError::sink(NAME, format!("{}: {}", path.display(), message))
}

impl Sink for DurableLogSink {
    fn name(&self) -> &str {
        NAME
    }

    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        ensure_parent_dir(&self.path).map_err(|e| self.error(e))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.error(e))?;
        self.file = Some(file);

        if self.write_header {
            self.write_synced(&csv_header(self.channels))?;
        }
        tracing::info!(
            "Durable log opened: {:?} ({})",
            self.path,
            if self.write_header { "new file" } else { "appending" }
        );
        Ok(())
    }

    fn accept(&mut self, sample: &Sample) -> Result<()> {
        if sample.channel_count() != self.channels {
            return Err(self.error(format!(
                "sample has {} channels, log has {}",
                sample.channel_count(),
                self.channels
            )));
        }
        // one write per row so a row is never split across calls
        self.write_synced(&sample.csv_row())?;
        self.rows_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        file.sync_all().map_err(|e| self.error(e))?;
        tracing::info!(
            "Durable log closed: {:?} ({} rows written)",
            self.path,
            self.rows_written
        );
        Ok(())
    }
}
