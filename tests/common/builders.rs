//! Test data builders for creating run configurations

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use thermolog_rs::RunConfig;

/// Builder for run configurations writing into a private temp directory
pub struct RunConfigBuilder {
    dir: TempDir,
    file_name: String,
    interval: Duration,
    limit: u64,
    append: bool,
    channels: usize,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            file_name: "run.csv".to_string(),
            interval: Duration::from_millis(20),
            limit: 0,
            append: false,
            channels: 4,
        }
    }

    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Output path the built config will write to
    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(&self.file_name)
    }

    /// Build the config; the temp dir must outlive the run
    pub fn build(self) -> (RunConfig, TempDir) {
        let config = RunConfig::builder("MOCK0", self.output_path())
            .interval(self.interval)
            .sample_limit(self.limit)
            .append(self.append)
            .channels(self.channels)
            .build()
            .expect("valid test config");
        (config, self.dir)
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let (config, dir) = RunConfigBuilder::new()
            .file_name("log.csv")
            .interval(Duration::from_millis(250))
            .limit(7)
            .channels(2)
            .build();

        assert_eq!(config.output_path(), dir.path().join("log.csv"));
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.sample_limit(), 7);
        assert_eq!(config.channels(), 2);
        assert!(!config.append());
    }
}
