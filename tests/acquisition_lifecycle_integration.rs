//! Integration tests for the acquisition lifecycle
//!
//! These tests validate the complete run workflow on the real clock:
//! - Bounded runs and the resulting CSV log
//! - Cooperative cancellation
//! - Start rejection and open failures
//! - Tick timing

mod common;

use common::builders::RunConfigBuilder;
use common::mock_helpers::{counter_opener, reference_opener, RecordingSink};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thermolog_rs::backend::{Acquisition, MockOpener, RunController};
use thermolog_rs::{
    FailureKind, RunEvent, RunStatus, SinkHandle, StopReason, ThermologError,
};

#[test]
#[serial]
fn test_bounded_run_writes_header_and_rows() {
    let builder = RunConfigBuilder::new().limit(3);
    let path = builder.output_path();
    let (config, _dir) = builder.build();

    let mut acquisition = Acquisition::new(Arc::new(reference_opener()));
    acquisition.start(config).unwrap();
    let summary = acquisition.wait().unwrap();

    assert_eq!(summary.samples_emitted, 3);
    assert_eq!(summary.stop_reason, StopReason::SampleLimit);
    assert_eq!(summary.final_status, RunStatus::Stopped);

    let lines = common::read_lines(&path);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "timestamp_local,ch1_c,ch2_c,ch3_c,ch4_c");
    for line in &lines[1..] {
        assert_eq!(common::row_fields(line), vec!["10.0", "", "12.5", "9.9"]);
    }
}

#[test]
#[serial]
fn test_events_follow_lifecycle_order() {
    let (config, _dir) = RunConfigBuilder::new().limit(2).build();

    let mut acquisition = Acquisition::new(Arc::new(counter_opener()));
    acquisition.start(config).unwrap();
    acquisition.wait().unwrap();

    let events = acquisition.drain();
    let statuses: Vec<RunStatus> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            RunStatus::Starting,
            RunStatus::Running,
            RunStatus::Stopping,
            RunStatus::Stopped
        ]
    );

    let values: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Sample(sample) => sample.reading(0).and_then(|r| r.value()),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![1.0, 2.0]);
}

#[test]
#[serial]
fn test_stop_ends_unbounded_run() {
    let builder = RunConfigBuilder::new().interval(Duration::from_millis(20));
    let path = builder.output_path();
    let (config, _dir) = builder.build();

    let mut acquisition = Acquisition::new(Arc::new(counter_opener()));
    acquisition.start(config).unwrap();
    thread::sleep(Duration::from_millis(110));

    let seen = acquisition.state().unwrap().samples_emitted;
    acquisition.stop();
    let summary = acquisition.wait().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(summary.samples_emitted >= seen);
    assert!(
        summary.samples_emitted <= seen + 1,
        "at most one sample after the stop request ({} -> {})",
        seen,
        summary.samples_emitted
    );
    assert_eq!(
        common::read_lines(&path).len() as u64,
        summary.samples_emitted + 1
    );
}

#[test]
#[serial]
fn test_start_while_running_is_rejected() {
    let (config, _dir) = RunConfigBuilder::new().build();
    let (second, _second_dir) = RunConfigBuilder::new().build();

    let mut acquisition = Acquisition::new(Arc::new(counter_opener()));
    acquisition.start(config).unwrap();

    let result = acquisition.start(second);
    assert!(matches!(result, Err(ThermologError::AlreadyRunning)));
    assert!(acquisition.is_running());

    acquisition.stop();
    assert!(acquisition.wait().is_ok());
}

#[test]
#[serial]
fn test_open_failure_reports_fatal_error() {
    let builder = RunConfigBuilder::new().limit(3);
    let path = builder.output_path();
    let (config, _dir) = builder.build();

    let opener = MockOpener::default().failing_open("no such device");
    let mut acquisition = Acquisition::new(Arc::new(opener));
    acquisition.start(config).unwrap();

    let result = acquisition.wait();
    assert!(matches!(result, Err(ThermologError::SourceUnavailable(_))));
    assert_eq!(acquisition.state().unwrap().status, RunStatus::Failed);
    assert!(!path.exists(), "no log is created when the source never opens");

    let fatal = acquisition
        .drain()
        .into_iter()
        .find_map(|e| match e {
            RunEvent::FatalError { kind, message } => Some((kind, message)),
            _ => None,
        })
        .expect("fatal error event");
    assert_eq!(fatal.0, FailureKind::SourceUnavailable);
    assert!(fatal.1.contains("no such device"));
}

#[test]
#[serial]
fn test_source_failure_mid_run_closes_source() {
    let (config, _dir) = RunConfigBuilder::new().limit(10).build();

    let opener = counter_opener().with_fail_after(2);
    let probe = opener.clone();
    let mut acquisition = Acquisition::new(Arc::new(opener));
    acquisition.start(config).unwrap();

    assert!(acquisition.wait().is_err());
    let state = acquisition.state().unwrap();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.samples_emitted, 2);
    assert!(state.last_error.is_some());
    assert_eq!(probe.open_count(), 1);
    assert_eq!(probe.close_count(), 1);
}

#[test]
#[serial]
fn test_ticks_stay_on_grid() {
    let interval = Duration::from_millis(50);
    let (config, _dir) = RunConfigBuilder::new().interval(interval).limit(6).build();

    // slow reads must not push later ticks off the grid
    let opener = counter_opener().with_latency(Duration::from_millis(15));
    let (controller, _stop) = RunController::new(config, Arc::new(opener));

    let started = Instant::now();
    let summary = controller.run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.samples_emitted, 6);
    assert_eq!(summary.skipped_ticks, 0);
    // first tick fires at once, the sixth at 5 intervals, plus one read
    assert!(elapsed >= interval * 5, "run took {:?}", elapsed);
    assert!(elapsed < interval * 5 + Duration::from_millis(200), "run took {:?}", elapsed);
}

#[test]
#[serial]
fn test_failing_custom_sink_does_not_stop_run() {
    let builder = RunConfigBuilder::new().limit(3);
    let path = builder.output_path();
    let (config, _dir) = builder.build();

    let (sink, seen) = RecordingSink::new("flaky");
    let mut acquisition = Acquisition::new(Arc::new(reference_opener()));
    acquisition
        .start_with_sinks(config, vec![SinkHandle::Custom(Box::new(sink.failing()))])
        .unwrap();
    let summary = acquisition.wait().unwrap();

    assert_eq!(summary.samples_emitted, 3);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(common::read_lines(&path).len(), 4);

    let report = summary
        .sink_reports
        .iter()
        .find(|r| r.name == "flaky")
        .expect("report for custom sink");
    assert_eq!(report.failures, 3);
    assert!(!report.critical);
}

#[test]
#[serial]
fn test_dropping_acquisition_stops_worker() {
    let opener = counter_opener();
    let probe = opener.clone();
    let (config, _dir) = RunConfigBuilder::new().build();

    let mut acquisition = Acquisition::new(Arc::new(opener));
    acquisition.start(config).unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(acquisition);

    assert_eq!(probe.close_count(), 1);
}
