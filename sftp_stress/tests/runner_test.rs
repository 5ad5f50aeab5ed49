use std::sync::Arc;
use std::time::Duration;

use more_asserts::{assert_ge, assert_le};
use parking_lot::Mutex;
use sftp_client::MemoryServer;
use sftp_stress::{
    FileGenerator, Outcome, ProgressEvent, ProgressObserver, RunReport, RunSettings, RunState, Runner, Stage,
};
use tracing_test::traced_test;

fn settings(file_count: u64, min: u64, max: u64) -> RunSettings {
    RunSettings {
        file_count,
        size_range: min..=max,
        ..Default::default()
    }
}

fn runner(settings: RunSettings, server: &MemoryServer) -> Runner<MemoryServer> {
    Runner::new(settings, server.clone()).with_generator_factory(|worker| FileGenerator::seeded(worker as u64))
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_event(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

#[test]
fn test_three_files_all_succeed() {
    let server = MemoryServer::new("/upload");
    let mut runner = runner(settings(3, 1024, 1024), &server);
    assert_eq!(runner.state(), RunState::Idle);

    let outcome = runner.run();
    assert_eq!(runner.state(), RunState::Finished);
    assert_eq!(outcome.state, RunState::Finished);
    assert_eq!(outcome.records.len(), 3);
    for (i, record) in outcome.records.iter().enumerate() {
        assert_eq!(record.index, i as u64);
        assert_eq!(record.name, format!("test_{i}.zip"));
        assert_eq!(record.size, 1024);
        assert_eq!(record.outcome, Outcome::Success);
        assert_eq!(record.connect_time, Duration::ZERO);
        assert!(record.delete_time.is_some());
    }

    // Everything uploaded was deleted again and the session was released.
    assert!(server.files().is_empty());
    assert_eq!(server.connect_calls(), 1);
    assert_eq!(server.open_sessions(), 0);

    let report = RunReport::from(outcome);
    assert_eq!(report.summary.count, 3);
    assert_eq!(report.summary.total_bytes, 3072);
    assert!(report.to_text().contains("count=3 succeeded=3 failed=0 total_bytes=3072"));
    assert!(report.result().is_ok());
}

#[test]
fn test_zero_files() {
    let server = MemoryServer::default();
    let outcome = runner(settings(0, 10, 20), &server).run();
    assert_eq!(outcome.state, RunState::Finished);
    assert!(outcome.records.is_empty());
    assert_eq!(server.open_sessions(), 0);
}

#[test]
fn test_sizes_within_range() {
    let server = MemoryServer::default();
    let outcome = runner(settings(25, 100, 5000), &server).run();
    assert_eq!(outcome.records.len(), 25);
    for record in &outcome.records {
        assert_ge!(record.size, 100);
        assert_le!(record.size, 5000);
    }
}

#[test]
fn test_total_time_is_sum_of_operations() {
    let server = MemoryServer::default().with_latency(Duration::from_millis(2));
    let outcome = runner(settings(4, 64, 128), &server).run();
    let report = RunReport::from(outcome);

    let expected: f64 = report
        .records
        .iter()
        .map(|r| r.upload_time.as_secs_f64() + r.delete_time.unwrap_or_default().as_secs_f64())
        .sum();
    assert!((report.summary.total_time.as_secs_f64() - expected).abs() < 1e-6);
    assert_ge!(report.summary.upload.unwrap().min, Duration::from_millis(2));
}

#[test]
#[traced_test]
fn test_failed_upload_is_recorded_and_run_continues() {
    let server = MemoryServer::default().fail_upload(2);
    let outcome = runner(settings(5, 512, 512), &server).run();

    assert_eq!(outcome.state, RunState::Finished);
    assert_eq!(outcome.records.len(), 5);
    for record in &outcome.records {
        if record.index == 2 {
            assert!(matches!(&record.outcome, Outcome::Failed { stage: Stage::Upload, reason } if !reason.is_empty()));
            assert_eq!(record.delete_time, None);
        } else {
            assert_eq!(record.outcome, Outcome::Success);
        }
    }
    assert_eq!(server.delete_calls(), 4);
    assert!(logs_contain("Upload of test_2.zip failed"));

    let report = RunReport::from(outcome);
    assert_eq!(report.summary.failed, 1);
    assert!(report.result().is_ok());
}

#[test]
fn test_failed_delete_is_recorded() {
    let server = MemoryServer::default().fail_delete(0);
    let outcome = runner(settings(2, 10, 10), &server).run();

    assert_eq!(outcome.state, RunState::Finished);
    assert!(matches!(outcome.records[0].outcome, Outcome::Failed { stage: Stage::Delete, .. }));
    assert!(outcome.records[0].delete_time.is_some());
    assert_eq!(outcome.records[1].outcome, Outcome::Success);
    // The file whose delete failed is left behind.
    assert_eq!(server.files(), vec!["/test_0.zip".to_owned()]);
}

#[test]
fn test_connect_failure_aborts_with_no_records() {
    let server = MemoryServer::default().refuse_connections();
    let mut runner = runner(settings(3, 10, 10), &server);
    let outcome = runner.run();

    assert_eq!(runner.state(), RunState::Aborted);
    assert_eq!(outcome.state, RunState::Aborted);
    assert!(outcome.records.is_empty());
    assert!(outcome.abort_reason.unwrap().contains("Connection Error"));
    assert_eq!(server.upload_calls(), 0);
}

#[test]
fn test_connection_drop_aborts_and_keeps_partial_records() {
    let server = MemoryServer::default().drop_connection_on_upload(1);
    let outcome = runner(settings(5, 10, 10), &server).run();

    assert_eq!(outcome.state, RunState::Aborted);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].outcome, Outcome::Success);
    assert!(matches!(outcome.records[1].outcome, Outcome::Failed { stage: Stage::Upload, .. }));
    assert_eq!(server.upload_calls(), 2);
    assert_eq!(server.open_sessions(), 0);

    let report = RunReport::from(outcome);
    assert!(report.result().is_err());
    assert!(report.to_text().contains("State: Aborted"));
}

#[test]
fn test_parallel_run_sorted_by_index() {
    let server = MemoryServer::default().with_latency(Duration::from_millis(1));
    let mut settings = settings(20, 32, 256);
    settings.threads = 4;
    let outcome = runner(settings, &server).run();

    assert_eq!(outcome.state, RunState::Finished);
    let indices: Vec<u64> = outcome.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..20).collect::<Vec<_>>());
    assert_eq!(server.connect_calls(), 4);
    assert_le!(server.peak_open_sessions(), 4);
    assert_eq!(server.open_sessions(), 0);
    assert!(server.files().is_empty());
}

#[test]
fn test_parallel_run_stops_all_workers_on_connection_loss() {
    let server = MemoryServer::default()
        .with_latency(Duration::from_millis(2))
        .drop_connection_on_upload(3);
    let mut settings = settings(200, 16, 16);
    settings.threads = 3;
    let outcome = runner(settings, &server).run();

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(outcome.records.len() < 200);
    assert_eq!(server.open_sessions(), 0);
}

#[test]
fn test_session_per_file_records_connect_time() {
    let server = MemoryServer::default();
    let mut settings = settings(3, 10, 10);
    settings.keep_alive = false;
    let outcome = runner(settings, &server).run();

    assert_eq!(outcome.state, RunState::Finished);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(server.connect_calls(), 3);
    assert_eq!(server.peak_open_sessions(), 1);
    assert_eq!(server.open_sessions(), 0);
}

#[test]
fn test_sleep_interval_pauses_between_files() {
    let server = MemoryServer::default();
    let mut settings = settings(3, 10, 10);
    settings.sleep_interval = Some(Duration::from_millis(20));

    let start = std::time::Instant::now();
    let outcome = runner(settings, &server).run();
    assert_eq!(outcome.records.len(), 3);
    // Two pauses: none after the last file.
    assert_ge!(start.elapsed(), Duration::from_millis(40));
}

#[test]
fn test_progress_events() {
    let server = MemoryServer::default();
    let observer = Arc::new(RecordingObserver::default());
    let outcome = runner(settings(2, 100, 100), &server)
        .with_progress(observer.clone())
        .run();
    assert_eq!(outcome.records.len(), 2);

    let events = observer.events.lock();
    assert_eq!(events.first(), Some(&ProgressEvent::RunStarted { file_count: 2 }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::RunFinished {
            state: RunState::Finished
        })
    );
    let finished = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileFinished { succeeded: true, .. }))
        .count();
    assert_eq!(finished, 2);
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::FileProgress { index: 1, .. })));
}

#[test]
#[traced_test]
fn test_generator_failure_aborts_before_any_transfer() {
    let server = MemoryServer::default();
    #[allow(clippy::reversed_empty_ranges)]
    let outcome = runner(settings(3, 10, 5), &server).run();

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(outcome.records.is_empty());
    assert!(outcome.abort_reason.unwrap().starts_with("generating test_0.zip"));
    assert!(logs_contain("Generating test_0.zip failed"));
    assert_eq!(server.upload_calls(), 0);
    assert_eq!(server.open_sessions(), 0);
}
