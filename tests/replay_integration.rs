// Replays a recorded session file through the collector into a live view

use std::io::Write;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use overlay_telemetry::standings::SESSION_THROTTLE;
use overlay_telemetry::telemetry::{
    ManualScheduler, Telemetry, TelemetryContext, TelemetryOutput, collect_telemetry,
    producer::FileTelemetryProducer,
};
use overlay_telemetry::{SessionInfo, SessionLapCountView, writer};
use tempfile::NamedTempFile;

fn write_recording(outputs: &[TelemetryOutput]) -> NamedTempFile {
    let mut recording = NamedTempFile::new().unwrap();
    for output in outputs {
        writeln!(recording, "{}", serde_json::to_string(output).unwrap()).unwrap();
    }
    recording.flush().unwrap();
    recording
}

fn lap_snapshot(lap: f64) -> TelemetryOutput {
    TelemetryOutput::Snapshot(Box::new(
        Telemetry::new()
            .with("SessionNum", vec![1.])
            .with("SessionState", vec![4.])
            .with("Lap", vec![lap])
            .with("SessionTime", vec![lap * 90.])
            .with("SessionTimeTotal", vec![3600.])
            .with("SessionTimeRemain", vec![3600. - lap * 90.]),
    ))
}

#[test]
fn test_replay_recording_into_lap_count_view() {
    let session: SessionInfo = serde_json::from_str(
        r#"{"Sessions": [
            {"SessionNum": 0, "SessionType": "Practice", "SessionLaps": "unlimited"},
            {"SessionNum": 1, "SessionType": "Race", "SessionLaps": 30}
        ]}"#,
    )
    .unwrap();
    let recording = write_recording(&[
        TelemetryOutput::SessionChange(Box::new(session)),
        lap_snapshot(1.),
        lap_snapshot(2.),
        lap_snapshot(3.),
    ]);

    let scheduler = ManualScheduler::new();
    let ctx = TelemetryContext::new(Arc::new(scheduler.clone()));
    let mut view = SessionLapCountView::new(&ctx);

    let published = collect_telemetry(
        FileTelemetryProducer::new(recording.path()),
        &ctx,
        Duration::ZERO,
    )
    .unwrap();
    assert_eq!(published, 4);

    scheduler.advance(SESSION_THROTTLE);
    let summary = view.current();
    assert_eq!(summary.total_laps, 30);
    assert_eq!(summary.current_lap, 3.);
    assert_eq!(summary.time, 270.);

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("laps.jsonl");
    let (tx, rx) = mpsc::channel();
    tx.send(summary).unwrap();
    drop(tx);
    assert_eq!(writer::write_lap_counts(&output, rx).unwrap(), 1);
    let written: Vec<_> = serde_jsonlines::json_lines::<overlay_telemetry::SessionLapCount, _>(&output)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(written, vec![summary]);
}

#[test]
fn test_replay_stops_at_corrupt_line() {
    let mut recording = write_recording(&[lap_snapshot(1.)]);
    writeln!(recording, "{{\"Snapshot\": 12}}").unwrap();
    recording.flush().unwrap();

    let scheduler = ManualScheduler::new();
    let ctx = TelemetryContext::new(Arc::new(scheduler));
    let result = collect_telemetry(
        FileTelemetryProducer::new(recording.path()),
        &ctx,
        Duration::ZERO,
    );

    assert!(result.is_err());
    // records before the corrupt line were still published
    assert!(ctx.telemetry.get().is_some());
}
