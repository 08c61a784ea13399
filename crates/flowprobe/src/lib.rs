//! # Flowprobe
//!
//! Low-overhead telemetry probe for timing data as it moves through a
//! packet path.
//!
//! Instrumentation points hand the probe raw buffers; the probe finds the
//! `(stream, sequence)` fields embedded after a sentinel marker, collapses
//! repeats into runs and records one timestamped event per run in a
//! fixed-capacity log. A consumer drains the log through a reader and the
//! flows are reconstructed offline.
//!
//! ## Features
//!
//! - **Calibration**: the clock-read overhead is measured over a window of
//!   early samples and subtracted from every later timestamp
//! - **Payload scanning**: sentinel search and run-length grouping without
//!   allocation
//! - **Segment filtering**: TCP/UDP payload location, control segments skipped
//! - **Process-wide probe**: explicit [`global::init`] / [`global::teardown`]
//! - **Flow analysis**: per-hop latency, reordering and lost-event detection
//!
//! ## Quick Start
//!
//! ```rust
//! use flowprobe::{Probe, ProbeConfig, ProbePoint, analysis};
//!
//! let mut probe = Probe::new(ProbeConfig::testing()).unwrap();
//! let export = probe.export_handle();
//!
//! probe.record_event(ProbePoint::SendSocket, 1, 7, 1).unwrap();
//! probe.record_event(ProbePoint::SendTcpToIp, 1, 7, 1).unwrap();
//!
//! let mut reader = export.open_reader();
//! let events: Vec<_> = reader.by_ref().collect();
//! reader.close();
//!
//! let report = analysis::reconstruct(&events);
//! assert_eq!(report.flow(7, 1).unwrap().hops().count(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`probe`]: the producer-side [`Probe`] service
//! - [`calibration`]: trimmed-mean clock overhead compensation
//! - [`scanner`]: sentinel search and run extraction
//! - [`segment`]: transport header inspection
//! - [`config`]: [`ProbeConfig`] with JSON and environment loading
//! - [`global`]: process-wide probe
//! - [`analysis`]: offline flow reconstruction

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod global;
pub mod probe;
pub mod scanner;
pub mod segment;

// Re-exports
pub use analysis::{FlowReport, FlowTrace, Hop, HopLatency, OrdinalGap, Reordering, reconstruct};
pub use calibration::{CalibrationConfig, CalibrationState, Calibrator, trimmed_mean};
pub use config::ProbeConfig;
pub use probe::{Probe, ProbeStats, ScanReport};
pub use scanner::{
    PayloadScanner, Run, Runs, ScannerConfig, SentinelStride, TrailingRunPolicy, WordOrder,
};
pub use segment::{ControlKind, SegmentKind, TransportProtocol, locate_payload};

// Re-export the shared vocabulary so instrumentation only needs this crate
pub use flowprobe_core::{
    CalibrationError, ConfigError, EventDraft, LogError, ManualClock, ProbeError, ProbeEvent,
    ProbeId, ProbePoint, ScanError, SystemClock, Timestamp, WallClock,
};
pub use flowprobe_storage::{
    DumpSummary, EventLog, ExportHandle, LogReader, LogStats, ReaderMode, StorageError,
    dump_to_file, format_event, parse_line, parse_lines, write_lines,
};
