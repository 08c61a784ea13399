//! End-to-end tests: instrumentation through export and offline analysis

use std::sync::Arc;

use flowprobe::{
    CalibrationConfig, CalibrationState, ManualClock, Probe, ProbeConfig, ProbeId, ProbePoint,
    Timestamp, TransportProtocol, analysis, dump_to_file, parse_lines,
};
use tempfile::TempDir;

const FF: u32 = 0xFFFF_FFFF;

fn payload(groups: &[(u32, u32)]) -> Vec<u8> {
    let mut words = vec![FF, FF];
    for &(stream, seq) in groups {
        words.extend([stream, seq, 0, 0]);
    }
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn manual_probe(config: ProbeConfig) -> Probe<Arc<ManualClock>> {
    flowprobe_logging::init_testing();
    let clock = Arc::new(ManualClock::new(Timestamp::new(1_700_000_000, 0)));
    Probe::with_clock(config, clock).unwrap()
}

fn uncalibrated() -> ProbeConfig {
    ProbeConfig::testing().with_calibration(CalibrationConfig::disabled())
}

#[test]
fn test_drain_close_then_append_reuses_first_slot() {
    let mut probe = manual_probe(uncalibrated());
    let export = probe.export_handle();

    for id in [1u16, 2, 3] {
        probe.record_event(ProbeId(id), u32::from(id) * 10, 1, 1).unwrap();
    }

    let mut reader = export.open_reader();
    let ids: Vec<_> = reader.by_ref().map(|e| e.probe_id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(reader.next().is_none());
    assert_eq!(reader.close(), 3);
    assert_eq!(export.snapshot_len(), 0);

    let event = probe.record_event(ProbeId(4), 40, 1, 1).unwrap();
    assert_eq!(export.snapshot_len(), 1);
    assert_eq!(export.log().get(0).unwrap(), event);
    assert_eq!(event.ordinal, 3);
}

#[test]
fn test_scanned_runs_are_recorded_in_order() {
    let mut probe = manual_probe(uncalibrated());
    let data = payload(&[(1, 5), (1, 5), (1, 5), (1, 6)]);

    let report = probe
        .scan_and_record(ProbePoint::RecvIpToTcp, &data, data.len())
        .unwrap();
    assert_eq!(report.recorded, 2);

    let runs: Vec<_> = probe
        .open_reader()
        .map(|e| (e.stream_id, e.sequence, e.repeat_count))
        .collect();
    assert_eq!(runs, vec![(1, 5, 3), (1, 6, 1)]);
}

#[test]
fn test_calibration_from_clock_overhead() {
    let config = ProbeConfig::default().with_capacity(256);
    let mut probe = manual_probe(config);
    let data = payload(&[(1, 1)]);

    // The baseline and stamp reads are one step apart
    for i in 1..=100 {
        probe.clock().set_step(i * 10);
        probe.scan_and_record(ProbeId(1), &data, data.len()).unwrap();
    }
    assert_eq!(
        probe.calibration(),
        CalibrationState::Converged {
            correction_micros: 505
        }
    );

    probe.clock().set_step(0);
    probe.clock().set(Timestamp::new(1_700_000_100, 200));
    let event = probe.record_event(ProbeId(2), 1, 1, 1).unwrap();
    assert_eq!(event.timestamp, Timestamp::new(1_700_000_099, 999_695));
}

#[tokio::test]
async fn test_dump_parse_and_reconstruct() {
    let mut probe = manual_probe(uncalibrated());
    probe.clock().set_step(25);
    let export = probe.export_handle();

    // Sequence 7 of stream 3 travels down the send path, sequence 8 follows
    let path = [
        ProbePoint::SendSocket,
        ProbePoint::SendSocketToTransport,
        ProbePoint::SendTcpToIp,
    ];
    for point in path {
        probe.record_event(point, 7, 3, 1).unwrap();
    }
    for point in path {
        probe.record_event(point, 8, 3, 1).unwrap();
    }

    let mut tcp = vec![0u8; 20];
    tcp[12] = 5 << 4;
    tcp[13] = 0x10;
    let report = probe
        .record_segment(ProbePoint::RecvIpToTcp, TransportProtocol::Tcp, &tcp)
        .unwrap();
    assert!(report.skipped.is_some());

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("probe.log");
    let summary = dump_to_file(export.open_reader(), &file).await.unwrap();
    assert_eq!(summary.written, 6);
    assert_eq!(summary.cleared, 6);
    assert_eq!(export.snapshot_len(), 0);

    let text = tokio::fs::read_to_string(&file).await.unwrap();
    let events = parse_lines(&text).unwrap();
    assert_eq!(events.len(), 6);
    assert!(events.windows(2).all(|w| w[1].ordinal == w[0].ordinal + 1));

    let report = analysis::reconstruct(&events);
    assert_eq!(report.flows.len(), 2);
    assert!(report.reorderings.is_empty());
    assert_eq!(report.missing_events(), 0);

    let flow = report.flow(3, 7).unwrap();
    assert_eq!(flow.observations.len(), 3);
    assert!(flow.hops().all(|hop| hop.latency_micros == 25));
    assert_eq!(flow.total_latency_micros(), 50);

    let stats = probe.stats();
    assert_eq!(stats.control_segments, 1);
    assert_eq!(stats.log.resets, 1);
}

#[test]
fn test_overflow_then_drain_shows_gap() {
    let mut probe = manual_probe(uncalibrated().with_capacity(4));
    let export = probe.export_handle();

    for seq in 0..6 {
        let _ = probe.record_event(ProbePoint::RecvSocket, seq, 1, 1);
    }
    let first: Vec<_> = export.open_reader().collect();
    assert_eq!(first.len(), 4);

    probe.record_event(ProbePoint::RecvSocket, 10, 1, 1).unwrap();
    let mut events = first;
    events.extend(export.open_reader());

    // Rejected appends do not consume ordinals
    let report = analysis::reconstruct(&events);
    assert_eq!(report.missing_events(), 0);
    assert_eq!(events.last().map(|e| e.ordinal), Some(4));
    assert_eq!(probe.stats().log.dropped_full, 2);
}
