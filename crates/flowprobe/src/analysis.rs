//! Offline flow reconstruction
//!
//! Works on exported events (from a reader or a parsed dump file). Events
//! that share `(stream_id, sequence)` are the same data seen at different
//! probe points; ordering them by time gives the path of that data and the
//! latency of each hop.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use flowprobe_core::{ProbeEvent, ProbeId};

/// Every observation of one `(stream_id, sequence)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTrace {
    pub stream_id: u32,
    pub sequence: u32,
    /// Sorted by timestamp, then ordinal
    pub observations: Vec<ProbeEvent>,
}

/// Time between two consecutive observations of the same data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: ProbeId,
    pub to: ProbeId,
    pub latency_micros: i64,
}

impl FlowTrace {
    pub fn hops(&self) -> impl Iterator<Item = Hop> + '_ {
        self.observations.windows(2).map(|pair| Hop {
            from: pair[0].probe_id,
            to: pair[1].probe_id,
            latency_micros: pair[1].timestamp.micros_since(pair[0].timestamp),
        })
    }

    /// First to last observation
    pub fn total_latency_micros(&self) -> i64 {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => last.timestamp.micros_since(first.timestamp),
            _ => 0,
        }
    }
}

/// A sequence seen at a probe point after a higher one of the same stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reordering {
    pub probe_id: ProbeId,
    pub stream_id: u32,
    pub ordinal: u64,
    pub sequence: u32,
    /// Highest sequence seen before it
    pub after: u32,
}

/// Ordinals missing between two consecutive exported events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalGap {
    pub after: u64,
    pub next: u64,
}

impl OrdinalGap {
    pub fn missing(&self) -> u64 {
        self.next.saturating_sub(self.after).saturating_sub(1)
    }
}

/// Aggregate latency of one `(from, to)` hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopLatency {
    pub count: u64,
    pub min_micros: i64,
    pub max_micros: i64,
    pub total_micros: i64,
}

impl HopLatency {
    fn new(latency: i64) -> Self {
        Self {
            count: 1,
            min_micros: latency,
            max_micros: latency,
            total_micros: latency,
        }
    }

    fn add(&mut self, latency: i64) {
        self.count += 1;
        self.min_micros = self.min_micros.min(latency);
        self.max_micros = self.max_micros.max(latency);
        self.total_micros = self.total_micros.saturating_add(latency);
    }

    /// Integer mean
    pub fn mean_micros(&self) -> i64 {
        match i64::try_from(self.count) {
            Ok(count) if count > 0 => self.total_micros / count,
            _ => 0,
        }
    }
}

/// Result of [`reconstruct`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    /// Sorted by `(stream_id, sequence)`
    pub flows: Vec<FlowTrace>,
    pub reorderings: Vec<Reordering>,
    pub gaps: Vec<OrdinalGap>,
}

impl FlowReport {
    pub fn flow(&self, stream_id: u32, sequence: u32) -> Option<&FlowTrace> {
        self.flows
            .binary_search_by_key(&(stream_id, sequence), |f| (f.stream_id, f.sequence))
            .ok()
            .map(|i| &self.flows[i])
    }

    /// Latency statistics per `(from, to)` pair across all flows
    pub fn hop_latencies(&self) -> BTreeMap<(ProbeId, ProbeId), HopLatency> {
        let mut summary: BTreeMap<(ProbeId, ProbeId), HopLatency> = BTreeMap::new();
        for hop in self.flows.iter().flat_map(FlowTrace::hops) {
            summary
                .entry((hop.from, hop.to))
                .and_modify(|s| s.add(hop.latency_micros))
                .or_insert_with(|| HopLatency::new(hop.latency_micros));
        }
        summary
    }

    pub fn missing_events(&self) -> u64 {
        self.gaps.iter().map(OrdinalGap::missing).sum()
    }
}

/// Group events into flows and look for reordering and lost events
///
/// `events` is expected in export order (ascending ordinal, possibly with
/// gaps from drops or resets).
pub fn reconstruct(events: &[ProbeEvent]) -> FlowReport {
    let mut flows: HashMap<(u32, u32), Vec<ProbeEvent>> = HashMap::new();
    let mut highest: HashMap<(ProbeId, u32), u32> = HashMap::new();
    let mut report = FlowReport::default();

    for event in events {
        flows
            .entry((event.stream_id, event.sequence))
            .or_default()
            .push(*event);

        let seen = highest
            .entry((event.probe_id, event.stream_id))
            .or_insert(event.sequence);
        if event.sequence < *seen {
            report.reorderings.push(Reordering {
                probe_id: event.probe_id,
                stream_id: event.stream_id,
                ordinal: event.ordinal,
                sequence: event.sequence,
                after: *seen,
            });
        } else {
            *seen = event.sequence;
        }
    }

    report.gaps = events
        .windows(2)
        .filter(|pair| {
            pair[0]
                .ordinal
                .checked_add(1)
                .is_some_and(|expected| pair[1].ordinal > expected)
        })
        .map(|pair| OrdinalGap {
            after: pair[0].ordinal,
            next: pair[1].ordinal,
        })
        .collect();

    report.flows = flows
        .into_iter()
        .map(|((stream_id, sequence), mut observations)| {
            observations.sort_by_key(|e| (e.timestamp.as_micros(), e.ordinal));
            FlowTrace {
                stream_id,
                sequence,
                observations,
            }
        })
        .collect();
    report.flows.sort_by_key(|f| (f.stream_id, f.sequence));
    report
}
