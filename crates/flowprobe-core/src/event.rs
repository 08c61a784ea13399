//! Probe events and timestamps

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe_point::ProbeId;

/// Microseconds per second
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// Wall-clock timestamp with microsecond resolution
///
/// Always normalized: `0 <= micros < 1_000_000`. Negative instants borrow
/// from `secs`, so `-0.5s` is `{ secs: -1, micros: 500_000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub secs: i64,
    /// Microseconds within the second
    pub micros: u32,
}

impl Timestamp {
    /// Create a timestamp, carrying excess microseconds into seconds
    pub fn new(secs: i64, micros: u32) -> Self {
        Self::from_micros(
            secs.saturating_mul(MICROS_PER_SEC)
                .saturating_add(i64::from(micros)),
        )
    }

    /// Create a timestamp from microseconds since the Unix epoch
    pub fn from_micros(total: i64) -> Self {
        Self {
            secs: total.div_euclid(MICROS_PER_SEC),
            micros: total.rem_euclid(MICROS_PER_SEC) as u32,
        }
    }

    /// Create a timestamp from a UTC datetime, truncating to microseconds
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            secs: dt.timestamp(),
            micros: dt.timestamp_subsec_micros().min(999_999),
        }
    }

    /// Convert back to a UTC datetime
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.micros * 1_000)
    }

    /// Total microseconds since the Unix epoch
    pub fn as_micros(self) -> i64 {
        self.secs
            .saturating_mul(MICROS_PER_SEC)
            .saturating_add(i64::from(self.micros))
    }

    /// Subtract a correction, borrowing from seconds when the microsecond
    /// component would go negative
    pub fn saturating_sub_micros(self, micros: u64) -> Self {
        let delta = i64::try_from(micros).unwrap_or(i64::MAX);
        Self::from_micros(self.as_micros().saturating_sub(delta))
    }

    /// Add microseconds, carrying into seconds
    pub fn saturating_add_micros(self, micros: u64) -> Self {
        let delta = i64::try_from(micros).unwrap_or(i64::MAX);
        Self::from_micros(self.as_micros().saturating_add(delta))
    }

    /// Signed microseconds elapsed since `earlier`
    pub fn micros_since(self, earlier: Timestamp) -> i64 {
        self.as_micros().saturating_sub(earlier.as_micros())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

/// Caller-supplied fields of an event, before it is stamped and ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDraft {
    /// Instrumentation point that observed the data
    pub probe_id: ProbeId,
    /// Sequence number extracted from the payload
    pub sequence: u32,
    /// Stream (thread) that produced the sequence
    pub stream_id: u32,
    /// Number of consecutive fragments collapsed into this event
    pub repeat_count: u16,
}

impl EventDraft {
    /// Create a new draft
    pub fn new(
        probe_id: impl Into<ProbeId>,
        sequence: u32,
        stream_id: u32,
        repeat_count: u16,
    ) -> Self {
        Self {
            probe_id: probe_id.into(),
            sequence,
            stream_id,
            repeat_count,
        }
    }

    /// Stamp the draft, producing a log record
    pub fn stamp(self, ordinal: u64, timestamp: Timestamp) -> ProbeEvent {
        ProbeEvent {
            ordinal,
            probe_id: self.probe_id,
            timestamp,
            sequence: self.sequence,
            stream_id: self.stream_id,
            repeat_count: self.repeat_count,
        }
    }
}

/// A recorded probe event
///
/// Immutable once written to the log. `ordinal` is assigned at append
/// time and is contiguous across the records resident in one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProbeEvent {
    /// Append-order counter, used to detect drops and resets downstream
    pub ordinal: u64,
    /// Instrumentation point
    pub probe_id: ProbeId,
    /// Calibration-adjusted wall-clock time
    pub timestamp: Timestamp,
    /// Sequence number within the stream
    pub sequence: u32,
    /// Stream (thread) identifier
    pub stream_id: u32,
    /// Number of collapsed fragments
    pub repeat_count: u16,
}

impl ProbeEvent {
    /// The caller-supplied part of this event
    pub fn draft(&self) -> EventDraft {
        EventDraft {
            probe_id: self.probe_id,
            sequence: self.sequence,
            stream_id: self.stream_id,
            repeat_count: self.repeat_count,
        }
    }
}
