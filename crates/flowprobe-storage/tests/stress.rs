//! Stress tests for flowprobe-storage
//!
//! These tests run a producer against concurrent export consumers and check
//! that records are never torn, duplicated or reordered, and that every
//! append is accounted for as either stored or dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use flowprobe_core::{EventDraft, LogError, ProbeEvent, ProbeId, Timestamp};
use flowprobe_storage::{EventLog, EventLogConfig, ExportHandle, ReaderMode};
use rand::Rng;

/// Every field is derived from the sequence, so a torn slot shows up as a
/// field that disagrees with the others.
fn draft_for(sequence: u32) -> EventDraft {
    EventDraft::new(
        ProbeId((sequence % 20) as u16),
        sequence,
        sequence ^ 0x5A5A_5A5A,
        (sequence % 1000) as u16,
    )
}

fn stamp_for(sequence: u32) -> Timestamp {
    Timestamp {
        secs: i64::from(sequence),
        micros: sequence % 1_000_000,
    }
}

fn assert_consistent(event: &ProbeEvent) {
    let s = event.sequence;
    assert_eq!(event.probe_id, ProbeId((s % 20) as u16), "torn probe id: {event:?}");
    assert_eq!(event.stream_id, s ^ 0x5A5A_5A5A, "torn stream id: {event:?}");
    assert_eq!(event.repeat_count, (s % 1000) as u16, "torn repeat: {event:?}");
    assert_eq!(event.timestamp, stamp_for(s), "torn timestamp: {event:?}");
    assert!(event.ordinal <= u64::from(s), "ordinal ahead of sequence: {event:?}");
}

// ============================================================================
// Throughput Tests
// ============================================================================

/// Fill a default-sized log and read it back
#[test]
fn test_fill_default_capacity() {
    let log = EventLog::new(EventLogConfig::default());
    let capacity = log.capacity() as u32;

    let start = Instant::now();
    for i in 0..capacity {
        log.append(draft_for(i), || stamp_for(i)).unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Appended {} events in {:?} ({:.2} events/sec)",
        capacity,
        duration,
        f64::from(capacity) / duration.as_secs_f64()
    );

    assert!(log.is_full());
    assert!(matches!(
        log.append(draft_for(capacity), || stamp_for(capacity)),
        Err(LogError::LogFull { .. })
    ));

    let handle = ExportHandle::new(Arc::new(log));
    let mut reader = handle.open_reader();
    let mut count = 0u32;
    for event in reader.by_ref() {
        assert_eq!(event.sequence, count);
        assert_eq!(event.ordinal, u64::from(count));
        count += 1;
    }
    assert_eq!(count, capacity);
    assert_eq!(reader.close(), capacity as usize);
    assert_eq!(handle.snapshot_len(), 0);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// One producer, one draining consumer
///
/// Every append is either stored (and gets an ordinal) or dropped, and the
/// consumer sees strictly increasing, untorn records.
#[test]
fn test_producer_with_draining_consumer() {
    let log = Arc::new(EventLog::new(EventLogConfig::with_capacity(1024)));
    let handle = ExportHandle::new(Arc::clone(&log));
    let total: u32 = 200_000;
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let log = Arc::clone(&log);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..total {
                let _ = log.append(draft_for(i), || stamp_for(i));
            }
            done.store(true, Ordering::Release);
        })
    };

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        loop {
            let finished = done.load(Ordering::Acquire);
            let mut reader = handle.open_reader();
            for event in reader.by_ref() {
                assert_consistent(&event);
                seen.push(event.sequence);
            }
            reader.close();
            if finished {
                break;
            }
            thread::yield_now();
        }
        seen
    });

    producer.join().unwrap();
    let seen = consumer.join().unwrap();

    for pair in seen.windows(2) {
        assert!(pair[0] < pair[1], "out of order: {pair:?}");
    }

    let stats = log.stats();
    assert_eq!(stats.next_ordinal + stats.dropped(), u64::from(total));
    assert!(seen.len() as u64 <= stats.next_ordinal);
    println!(
        "Seen {} of {} (dropped_full={}, dropped_busy={}, resets={})",
        seen.len(),
        total,
        stats.dropped_full,
        stats.dropped_busy,
        stats.resets
    );
}

/// Readers racing a reset never return torn records
#[test]
fn test_peek_readers_during_resets() {
    let log = Arc::new(EventLog::new(EventLogConfig::with_capacity(4096)));
    let handle = ExportHandle::new(Arc::clone(&log));
    let stop = Arc::new(AtomicBool::new(false));

    let producer = {
        let log = Arc::clone(&log);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0u32;
            while !stop.load(Ordering::Relaxed) {
                let _ = log.append(draft_for(i), || stamp_for(i));
                i = i.wrapping_add(1);
            }
        })
    };

    let resetter = {
        let handle = handle.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut rng = rand::rng();
            while !stop.load(Ordering::Relaxed) {
                handle.reset();
                for _ in 0..rng.random_range(0..200) {
                    thread::yield_now();
                }
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || {
                let mut read = 0usize;
                for _ in 0..500 {
                    let mut reader = handle.open_peek_reader();
                    let mut ordinals = HashSet::new();
                    for event in reader.by_ref() {
                        assert_consistent(&event);
                        assert!(ordinals.insert(event.ordinal), "duplicate ordinal");
                        read += 1;
                    }
                    assert_eq!(reader.close(), 0);
                }
                read
            })
        })
        .collect();

    let read: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
    stop.store(true, Ordering::Relaxed);
    producer.join().unwrap();
    resetter.join().unwrap();

    println!("Read {read} records across resets");
    assert!(log.stats().resets > 0);
}

/// Multiple draining readers close concurrently without deadlock
#[test]
fn test_concurrent_draining_closes() {
    let log = Arc::new(EventLog::new(EventLogConfig::with_capacity(256)));
    let handle = ExportHandle::new(Arc::clone(&log));

    for round in 0..50u32 {
        for i in 0..100 {
            let seq = round * 100 + i;
            log.append(draft_for(seq), || stamp_for(seq)).unwrap();
        }

        let closers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let mut reader = handle.open_reader_with_mode(ReaderMode::Drain);
                    reader.by_ref().for_each(|event| assert_consistent(&event));
                    reader.close()
                })
            })
            .collect();

        let cleared: usize = closers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(cleared, 100, "each record cleared exactly once");
        assert!(log.is_empty());
    }

    assert_eq!(log.stats().next_ordinal, 5000);
}

/// Ordinal gaps reveal drops to the consumer
#[test]
fn test_gaps_visible_after_overflow_and_reset() {
    let log = Arc::new(EventLog::new(EventLogConfig::with_capacity(10)));
    let handle = ExportHandle::new(Arc::clone(&log));

    for i in 0..15 {
        let _ = log.append(draft_for(i), || stamp_for(i));
    }
    assert_eq!(log.stats().dropped_full, 5);

    let mut peek = handle.open_peek_reader();
    assert_eq!(peek.by_ref().count(), 10);

    // A drain elsewhere, then more traffic
    assert_eq!(handle.open_reader().close(), 10);
    for i in 15..20 {
        log.append(draft_for(i), || stamp_for(i)).unwrap();
    }

    // The peek cursor sits past the new end until rewound; the first record
    // after the reset continues the ordinal sequence
    assert!(peek.next().is_none());
    peek.rewind();
    let first = peek.next().unwrap();
    assert_eq!(first.ordinal, 10);
    assert_eq!(first.sequence, 15);
}
