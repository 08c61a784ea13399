//! Process-wide probe
//!
//! Instrumentation sites deep in a packet path often cannot carry a
//! reference to a [`Probe`]. This module holds one behind an explicit
//! [`init`] / [`teardown`] boundary. Recording calls never block: if another
//! thread is inside the probe they return [`ProbeError::Busy`].

use parking_lot::{Mutex, const_mutex};
use tracing::{debug, info};

use flowprobe_core::{ProbeError, ProbeEvent, ProbeId};
use flowprobe_storage::ExportHandle;

use crate::config::ProbeConfig;
use crate::probe::{Probe, ProbeStats, ScanReport};
use crate::segment::TransportProtocol;

static PROBE: Mutex<Option<Probe>> = const_mutex(None);

/// Install the process-wide probe and return a handle for consumers
///
/// # Errors
///
/// [`ProbeError::AlreadyInitialized`] if a probe is installed, or
/// [`ProbeError::Config`] if `config` is invalid.
pub fn init(config: ProbeConfig) -> Result<ExportHandle, ProbeError> {
    let mut slot = PROBE.lock();
    if slot.is_some() {
        return Err(ProbeError::AlreadyInitialized);
    }
    let probe = Probe::new(config)?;
    let export = probe.export_handle();
    info!(capacity = probe.config().capacity, "Process-wide probe installed");
    *slot = Some(probe);
    Ok(export)
}

/// Remove the process-wide probe, returning its final counters
///
/// Export handles obtained earlier stay valid; the log lives until the last
/// of them is dropped.
pub fn teardown() -> Result<ProbeStats, ProbeError> {
    let probe = PROBE.lock().take().ok_or(ProbeError::NotInitialized)?;
    let stats = probe.stats();
    info!(
        recorded = stats.log.next_ordinal,
        dropped = stats.log.dropped(),
        "Process-wide probe removed"
    );
    Ok(stats)
}

pub fn is_initialized() -> bool {
    PROBE.lock().is_some()
}

fn with_probe<T>(f: impl FnOnce(&mut Probe) -> Result<T, ProbeError>) -> Result<T, ProbeError> {
    let Some(mut slot) = PROBE.try_lock() else {
        debug!("Process-wide probe contended");
        return Err(ProbeError::Busy);
    };
    let probe = slot.as_mut().ok_or(ProbeError::NotInitialized)?;
    f(probe)
}

/// [`Probe::record_event`] on the process-wide probe
pub fn record_event(
    probe_id: impl Into<ProbeId>,
    sequence: u32,
    stream_id: u32,
    repeat_count: u16,
) -> Result<ProbeEvent, ProbeError> {
    let probe_id = probe_id.into();
    with_probe(|probe| Ok(probe.record_event(probe_id, sequence, stream_id, repeat_count)?))
}

/// [`Probe::scan_and_record`] on the process-wide probe
pub fn scan_and_record(
    probe_id: impl Into<ProbeId>,
    buffer: &[u8],
    buffer_end: usize,
) -> Result<ScanReport, ProbeError> {
    let probe_id = probe_id.into();
    with_probe(|probe| probe.scan_and_record(probe_id, buffer, buffer_end))
}

/// [`Probe::record_segment`] on the process-wide probe
pub fn record_segment(
    probe_id: impl Into<ProbeId>,
    protocol: TransportProtocol,
    segment: &[u8],
) -> Result<ScanReport, ProbeError> {
    let probe_id = probe_id.into();
    with_probe(|probe| probe.record_segment(probe_id, protocol, segment))
}

/// Another consumer handle to the process-wide log
pub fn export_handle() -> Result<ExportHandle, ProbeError> {
    PROBE
        .lock()
        .as_ref()
        .map(Probe::export_handle)
        .ok_or(ProbeError::NotInitialized)
}

pub fn stats() -> Result<ProbeStats, ProbeError> {
    PROBE
        .lock()
        .as_ref()
        .map(Probe::stats)
        .ok_or(ProbeError::NotInitialized)
}
