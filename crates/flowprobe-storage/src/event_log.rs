//! Fixed-capacity event log
//!
//! A single pre-allocated array of event slots shared between one producer
//! (the instrumentation sites) and a rare bulk consumer (the exporter).
//!
//! ## Concurrency
//!
//! - `append` takes the writer flag with one atomic swap and never waits. If
//!   a reset (or a second producer) holds the flag, the event is dropped and
//!   counted.
//! - Each slot is a set of atomics. The count is published with `Release`
//!   after the slot is written, so a reader that loads it with `Acquire`
//!   never sees a partially written record.
//! - `reset` bumps an epoch to an odd value while it clears slots and back
//!   to even afterwards. Readers check the epoch around every read and
//!   reject records that may have been torn by a reset.
//!
//! Ordinals are never reset, so a reader that straddles a reset sees a gap.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering, fence};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use flowprobe_core::{EventDraft, LogError, ProbeEvent, ProbeId, Timestamp};

/// Default number of slots
pub const DEFAULT_CAPACITY: usize = 500_000;

/// Configuration for an event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Number of event slots, allocated once and never resized
    pub capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl EventLogConfig {
    /// Create a config with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

/// Point-in-time counters of an event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogStats {
    /// Records currently resident
    pub len: usize,
    /// Slot count
    pub capacity: usize,
    /// Appends rejected because the log was full
    pub dropped_full: u64,
    /// Appends rejected because the writer flag was held
    pub dropped_busy: u64,
    /// Completed resets
    pub resets: u64,
    /// Ordinal the next record will receive
    pub next_ordinal: u64,
}

impl LogStats {
    /// Total rejected appends
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_busy
    }
}

/// One record, packed into four atomic words
#[derive(Default)]
struct Slot {
    /// probe_id:16 | repeat_count:16 | micros:32
    head: AtomicU64,
    secs: AtomicU64,
    /// stream_id:32 | sequence:32
    ids: AtomicU64,
    ordinal: AtomicU64,
}

impl Slot {
    fn store(&self, event: &ProbeEvent) {
        let head = (u64::from(event.probe_id.0) << 48)
            | (u64::from(event.repeat_count) << 32)
            | u64::from(event.timestamp.micros);
        let ids = (u64::from(event.stream_id) << 32) | u64::from(event.sequence);
        self.head.store(head, Ordering::Relaxed);
        self.secs.store(event.timestamp.secs as u64, Ordering::Relaxed);
        self.ids.store(ids, Ordering::Relaxed);
        self.ordinal.store(event.ordinal, Ordering::Relaxed);
    }

    fn load(&self) -> ProbeEvent {
        let head = self.head.load(Ordering::Relaxed);
        let secs = self.secs.load(Ordering::Relaxed);
        let ids = self.ids.load(Ordering::Relaxed);
        let ordinal = self.ordinal.load(Ordering::Relaxed);
        ProbeEvent {
            ordinal,
            probe_id: ProbeId((head >> 48) as u16),
            timestamp: Timestamp {
                secs: secs as i64,
                micros: head as u32,
            },
            sequence: ids as u32,
            stream_id: (ids >> 32) as u32,
            repeat_count: (head >> 32) as u16,
        }
    }

    fn clear(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.secs.store(0, Ordering::Relaxed);
        self.ids.store(0, Ordering::Relaxed);
        self.ordinal.store(0, Ordering::Relaxed);
    }
}

/// Holds the writer flag; releases it on drop
struct WriterGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Fixed-capacity, append-only event log
pub struct EventLog {
    slots: Box<[Slot]>,
    /// Published record count
    len: AtomicUsize,
    next_ordinal: AtomicU64,
    /// Odd while a reset is clearing slots
    epoch: AtomicU64,
    writer: AtomicBool,
    /// Serializes concurrent resets from independent readers
    reset_lock: Mutex<()>,
    overflow_reported: AtomicBool,
    dropped_full: AtomicU64,
    dropped_busy: AtomicU64,
    resets: AtomicU64,
}

impl EventLog {
    /// Allocate a log with every slot zeroed
    pub fn new(config: EventLogConfig) -> Self {
        let slots: Box<[Slot]> = (0..config.capacity).map(|_| Slot::default()).collect();

        info!(
            capacity = config.capacity,
            bytes = config.capacity * std::mem::size_of::<Slot>(),
            "Event log allocated"
        );

        Self {
            slots,
            len: AtomicUsize::new(0),
            next_ordinal: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            writer: AtomicBool::new(false),
            reset_lock: Mutex::new(()),
            overflow_reported: AtomicBool::new(false),
            dropped_full: AtomicU64::new(0),
            dropped_busy: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    /// Append a record
    ///
    /// `stamp` is only called once a free slot is known to exist, so a full
    /// log never reads the clock. Returns the stored record.
    ///
    /// # Errors
    ///
    /// - [`LogError::LogFull`] when every slot is used; nothing is written.
    /// - [`LogError::Busy`] when a reset is clearing the log.
    pub fn append<F>(&self, draft: EventDraft, stamp: F) -> Result<ProbeEvent, LogError>
    where
        F: FnOnce() -> Timestamp,
    {
        let Some(_writer) = self.try_writer() else {
            self.dropped_busy.fetch_add(1, Ordering::Relaxed);
            return Err(LogError::Busy);
        };

        let len = self.len.load(Ordering::Relaxed);
        let Some(slot) = self.slots.get(len) else {
            self.dropped_full.fetch_add(1, Ordering::Relaxed);
            if !self.overflow_reported.swap(true, Ordering::Relaxed) {
                warn!(
                    capacity = self.slots.len(),
                    "Event log full, dropping new events until reset"
                );
            }
            return Err(LogError::LogFull {
                capacity: self.slots.len(),
            });
        };

        let ordinal = self.next_ordinal.load(Ordering::Relaxed);
        let event = draft.stamp(ordinal, stamp());
        // A reader that sees these slot writes also sees the epoch of any
        // reset that preceded them
        fence(Ordering::Release);
        slot.store(&event);
        self.next_ordinal.store(ordinal + 1, Ordering::Relaxed);
        self.len.store(len + 1, Ordering::Release);

        Ok(event)
    }

    /// Number of records currently stored
    ///
    /// May lag a concurrent append by one record, never leads it.
    pub fn snapshot_len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Read the record at `index`
    ///
    /// # Errors
    ///
    /// [`LogError::IndexOutOfRange`] for any index at or past
    /// [`snapshot_len`](Self::snapshot_len), including records invalidated by
    /// a concurrent reset.
    pub fn get(&self, index: usize) -> Result<ProbeEvent, LogError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let len = if epoch & 1 == 1 {
            0
        } else {
            self.len.load(Ordering::Acquire)
        };
        if index >= len {
            return Err(LogError::IndexOutOfRange { index, len });
        }

        let event = self.slots[index].load();

        fence(Ordering::Acquire);
        if self.epoch.load(Ordering::Relaxed) != epoch {
            return Err(LogError::IndexOutOfRange {
                index,
                len: self.snapshot_len(),
            });
        }

        Ok(event)
    }

    /// Read up to `limit` records starting at `offset`
    pub fn read_page(&self, offset: usize, limit: usize) -> Vec<ProbeEvent> {
        let end = offset.saturating_add(limit).min(self.snapshot_len());
        let mut page = Vec::with_capacity(end.saturating_sub(offset));
        for index in offset..end {
            match self.get(index) {
                Ok(event) => page.push(event),
                Err(_) => break,
            }
        }
        page
    }

    /// Zero every stored record and set the count to zero
    ///
    /// Waits for an in-flight append to finish; appends that arrive while the
    /// reset runs are rejected with [`LogError::Busy`]. Returns the number of
    /// records cleared.
    ///
    /// The wait yields the calling thread, so async callers should reset from
    /// a blocking task (as `dump_to_file` does).
    pub fn reset(&self) -> usize {
        let _serial = self.reset_lock.lock();
        let _writer = self.acquire_writer();

        let epoch = self.epoch.load(Ordering::Relaxed);
        self.epoch.store(epoch.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let cleared = self.len.load(Ordering::Relaxed);
        for slot in &self.slots[..cleared] {
            slot.clear();
        }
        self.len.store(0, Ordering::Relaxed);
        self.overflow_reported.store(false, Ordering::Relaxed);

        self.epoch.store(epoch.wrapping_add(2), Ordering::Release);
        self.resets.fetch_add(1, Ordering::Relaxed);

        debug!(cleared = cleared, "Event log reset");
        cleared
    }

    /// Slot count
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether no records are stored
    pub fn is_empty(&self) -> bool {
        self.snapshot_len() == 0
    }

    /// Whether the next append would be rejected as full
    pub fn is_full(&self) -> bool {
        self.snapshot_len() >= self.slots.len()
    }

    /// Current reset epoch; changes whenever a reset runs
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Snapshot of the log counters
    pub fn stats(&self) -> LogStats {
        LogStats {
            len: self.snapshot_len(),
            capacity: self.slots.len(),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            next_ordinal: self.next_ordinal.load(Ordering::Relaxed),
        }
    }

    fn try_writer(&self) -> Option<WriterGuard<'_>> {
        if self.writer.swap(true, Ordering::Acquire) {
            None
        } else {
            Some(WriterGuard { flag: &self.writer })
        }
    }

    fn acquire_writer(&self) -> WriterGuard<'_> {
        loop {
            if let Some(guard) = self.try_writer() {
                return guard;
            }
            std::thread::yield_now();
        }
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("stats", &self.stats())
            .field("epoch", &self.epoch())
            .finish()
    }
}
