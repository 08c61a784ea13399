//! The probe service
//!
//! [`Probe`] ties the pieces together on the producer side: it reads the
//! clock, feeds the calibrator, runs the scanner and appends to the event
//! log. Consumers never touch the `Probe`; they hold an [`ExportHandle`]
//! obtained from it.
//!
//! ## Example
//!
//! ```rust
//! use flowprobe::{Probe, ProbeConfig, ProbePoint};
//!
//! let mut probe = Probe::new(ProbeConfig::testing()).unwrap();
//! let export = probe.export_handle();
//!
//! probe.record_event(ProbePoint::SendSocket, 7, 1, 1).unwrap();
//!
//! let mut reader = export.open_reader();
//! assert_eq!(reader.next().map(|e| e.sequence), Some(7));
//! reader.close();
//! assert_eq!(export.snapshot_len(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::trace;

use flowprobe_core::{
    EventDraft, LogError, ProbeError, ProbeEvent, ProbeId, ScanError, SystemClock, WallClock,
};
use flowprobe_storage::{EventLog, ExportHandle, LogReader, LogStats};

use crate::calibration::{CalibrationState, Calibrator};
use crate::config::ProbeConfig;
use crate::scanner::{PayloadScanner, Run};
use crate::segment::{locate_payload, ControlKind, SegmentKind, TransportProtocol};

/// Producer-side counters, read through [`Probe::stats`]
#[derive(Debug, Default)]
struct ProbeCounters {
    buffers_scanned: AtomicU64,
    malformed_buffers: AtomicU64,
    control_segments: AtomicU64,
    runs_emitted: AtomicU64,
}

impl ProbeCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of probe and log counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStats {
    /// Buffers handed to the scanner
    pub buffers_scanned: u64,
    /// Buffers without a sentinel marker
    pub malformed_buffers: u64,
    /// Segments skipped as SYN/FIN/RST/bare ACK
    pub control_segments: u64,
    /// Runs produced by the scanner
    pub runs_emitted: u64,
    /// Event log counters
    pub log: LogStats,
    /// Calibration progress
    pub calibration: CalibrationState,
}

/// Outcome of scanning one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Runs the scanner produced
    pub runs: usize,
    /// Runs stored in the log
    pub recorded: usize,
    /// Runs the log rejected
    pub dropped: usize,
    /// Why the first rejected run was dropped
    pub first_error: Option<LogError>,
    /// Set when a segment was skipped without scanning
    pub skipped: Option<ControlKind>,
}

impl ScanReport {
    fn control(kind: ControlKind) -> Self {
        Self {
            skipped: Some(kind),
            ..Self::default()
        }
    }

    /// Whether every run was stored
    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// Telemetry probe
///
/// Owned by the single producer. Every recording method takes `&mut self`,
/// which keeps calibration unsynchronized and rules out concurrent appends
/// from the same probe.
pub struct Probe<C: WallClock = SystemClock> {
    clock: C,
    calibrator: Calibrator,
    scanner: PayloadScanner,
    log: Arc<EventLog>,
    counters: Arc<ProbeCounters>,
    config: ProbeConfig,
}

impl Probe<SystemClock> {
    /// Create a probe reading the system clock
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: WallClock> Probe<C> {
    /// Create a probe with a custom clock
    pub fn with_clock(config: ProbeConfig, clock: C) -> Result<Self, ProbeError> {
        config.validate()?;
        Ok(Self {
            clock,
            calibrator: Calibrator::new(&config.calibration),
            scanner: PayloadScanner::new(config.scanner.clone()),
            log: Arc::new(EventLog::new(config.log_config())),
            counters: Arc::new(ProbeCounters::default()),
            config,
        })
    }

    /// Record one event with a calibrated timestamp
    ///
    /// # Errors
    ///
    /// [`LogError::LogFull`] once the log is full; the clock is not read.
    pub fn record_event(
        &mut self,
        probe_id: impl Into<ProbeId>,
        sequence: u32,
        stream_id: u32,
        repeat_count: u16,
    ) -> Result<ProbeEvent, LogError> {
        self.append(EventDraft::new(probe_id, sequence, stream_id, repeat_count))
    }

    /// Scan `buffer[..buffer_end]` and record one event per run
    ///
    /// Log rejections do not stop the scan; they are counted in the report.
    /// A calibration baseline taken for this scan never outlives it.
    ///
    /// # Errors
    ///
    /// [`ScanError`] when the buffer has no sentinel or the boundary is out
    /// of range. Nothing is recorded in that case.
    pub fn scan_and_record(
        &mut self,
        probe_id: impl Into<ProbeId>,
        buffer: &[u8],
        buffer_end: usize,
    ) -> Result<ScanReport, ProbeError> {
        let probe_id = probe_id.into();
        if self.calibrator.is_collecting() {
            self.calibrator.begin_measurement(self.clock.now());
        }
        let result = self.scan_runs(probe_id, buffer, buffer_end);
        self.calibrator.cancel_measurement();
        result
    }

    fn scan_runs(
        &mut self,
        probe_id: ProbeId,
        buffer: &[u8],
        buffer_end: usize,
    ) -> Result<ScanReport, ProbeError> {
        ProbeCounters::bump(&self.counters.buffers_scanned);

        let runs = match self.scanner.scan_bounded(buffer, buffer_end) {
            Ok(runs) => runs,
            Err(e) => {
                if matches!(e, ScanError::MalformedBuffer { .. }) {
                    ProbeCounters::bump(&self.counters.malformed_buffers);
                }
                trace!(probe_id = %probe_id, error = %e, "Buffer not scanned");
                return Err(e.into());
            }
        };

        let mut report = ScanReport::default();
        for run in runs {
            report.runs += 1;
            ProbeCounters::bump(&self.counters.runs_emitted);
            match self.record_run(probe_id, run) {
                Ok(_) => report.recorded += 1,
                Err(e) => {
                    report.dropped += 1;
                    report.first_error.get_or_insert(e);
                }
            }
        }
        Ok(report)
    }

    /// Locate the payload of a transport segment and scan it
    ///
    /// Control segments (SYN, FIN, RST, bare ACK) are skipped and counted.
    pub fn record_segment(
        &mut self,
        probe_id: impl Into<ProbeId>,
        protocol: TransportProtocol,
        segment: &[u8],
    ) -> Result<ScanReport, ProbeError> {
        let probe_id = probe_id.into();
        match locate_payload(protocol, segment)? {
            SegmentKind::Control(kind) => {
                ProbeCounters::bump(&self.counters.control_segments);
                trace!(probe_id = %probe_id, ?kind, "Control segment skipped");
                Ok(ScanReport::control(kind))
            }
            SegmentKind::Data { offset } => {
                let payload = &segment[offset..];
                self.scan_and_record(probe_id, payload, payload.len())
            }
        }
    }

    fn record_run(&mut self, probe_id: ProbeId, run: Run) -> Result<ProbeEvent, LogError> {
        self.append(run.draft(probe_id))
    }

    fn append(&mut self, draft: EventDraft) -> Result<ProbeEvent, LogError> {
        let Self {
            clock,
            calibrator,
            log,
            ..
        } = self;
        log.append(draft, || {
            let now = clock.now();
            let correction = calibrator.end_measurement(now);
            now.saturating_sub_micros(correction)
        })
    }

    /// Cloneable consumer-side handle to the log
    pub fn export_handle(&self) -> ExportHandle {
        ExportHandle::new(Arc::clone(&self.log))
    }

    /// Open a draining reader over the log
    pub fn open_reader(&self) -> LogReader {
        self.export_handle().open_reader()
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibrator.state()
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn stats(&self) -> ProbeStats {
        let counters = &self.counters;
        ProbeStats {
            buffers_scanned: counters.buffers_scanned.load(Ordering::Relaxed),
            malformed_buffers: counters.malformed_buffers.load(Ordering::Relaxed),
            control_segments: counters.control_segments.load(Ordering::Relaxed),
            runs_emitted: counters.runs_emitted.load(Ordering::Relaxed),
            log: self.log.stats(),
            calibration: self.calibrator.state(),
        }
    }
}

impl<C: WallClock> std::fmt::Debug for Probe<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("config", &self.config)
            .field("calibration", &self.calibrator.state())
            .field("log", &self.log)
            .finish()
    }
}
