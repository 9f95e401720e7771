//! Mock construction helpers

use std::sync::{Arc, Mutex};
use thermolog_rs::backend::{MockOpener, MockPattern};
use thermolog_rs::pipeline::Criticality;
use thermolog_rs::{Result, Sample, Sink, ThermologError};

/// Device reply with one dead channel
pub fn reference_reply() -> Vec<Option<f64>> {
    vec![Some(10.0), None, Some(12.5), Some(9.9)]
}

/// Opener that always answers [`reference_reply`]
pub fn reference_opener() -> MockOpener {
    MockOpener::new(MockPattern::Constant(reference_reply()))
}

/// Opener counting up from 1.0 so rows can be told apart
pub fn counter_opener() -> MockOpener {
    MockOpener::new(MockPattern::Counter {
        start: 1.0,
        step: 1.0,
    })
}

/// Sink that keeps every accepted sample for later inspection
pub struct RecordingSink {
    name: String,
    criticality: Criticality,
    fail_accepts: bool,
    samples: Arc<Mutex<Vec<Sample>>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<Sample>>>) {
        let samples = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                criticality: Criticality::NonCritical,
                fail_accepts: false,
                samples: Arc::clone(&samples),
            },
            samples,
        )
    }

    /// Reject every sample (after recording it)
    pub fn failing(mut self) -> Self {
        self.fail_accepts = true;
        self
    }

    pub fn critical(mut self) -> Self {
        self.criticality = Criticality::Critical;
        self
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    fn accept(&mut self, sample: &Sample) -> Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        if self.fail_accepts {
            return Err(ThermologError::sink(&self.name, "rejected"));
        }
        Ok(())
    }
}
