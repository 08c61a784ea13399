//! Cursor over the live event log

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowprobe_core::ProbeEvent;

use crate::event_log::EventLog;

/// What a reader does to the log when its session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    /// Closing or dropping the reader resets the log
    #[default]
    Drain,
    /// The log is left untouched
    Peek,
}

/// Forward-only, restartable cursor over an [`EventLog`]
///
/// Iteration ends when the cursor reaches the log's current length. Records
/// appended later are picked up by calling `next` again, so a reader can be
/// polled repeatedly.
pub struct LogReader {
    log: Arc<EventLog>,
    mode: ReaderMode,
    position: usize,
    last_ordinal: Option<u64>,
    discontinuities: u64,
    finished: bool,
}

impl LogReader {
    /// Open a reader at position 0
    pub fn new(log: Arc<EventLog>, mode: ReaderMode) -> Self {
        Self {
            log,
            mode,
            position: 0,
            last_ordinal: None,
            discontinuities: 0,
            finished: false,
        }
    }

    /// Read up to `max` records
    ///
    /// Returns an empty page at the end of the log.
    pub fn next_page(&mut self, max: usize) -> Vec<ProbeEvent> {
        let available = self.log.snapshot_len().saturating_sub(self.position);
        let mut page = Vec::with_capacity(available.min(max));
        for _ in 0..max {
            match self.next() {
                Some(event) => page.push(event),
                None => break,
            }
        }
        page
    }

    /// Move the cursor back to the first record
    pub fn rewind(&mut self) {
        self.position = 0;
        self.last_ordinal = None;
    }

    /// Index of the next record to read
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of ordinal gaps seen so far
    ///
    /// A gap means records were dropped or cleared by a reset between two
    /// records this reader returned.
    pub fn discontinuities(&self) -> u64 {
        self.discontinuities
    }

    /// Reset behavior on close
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// Records left before the end of the log
    pub fn remaining(&self) -> usize {
        self.log.snapshot_len().saturating_sub(self.position)
    }

    /// End the session
    ///
    /// A draining reader resets the log and returns the number of cleared
    /// records. A peek reader returns 0.
    pub fn close(mut self) -> usize {
        self.finish()
    }

    /// End the session without resetting, leaving the records for a later
    /// export
    pub fn abandon(mut self) {
        self.finished = true;
    }

    fn finish(&mut self) -> usize {
        if self.finished {
            return 0;
        }
        self.finished = true;

        match self.mode {
            ReaderMode::Drain => {
                let cleared = self.log.reset();
                debug!(
                    read = self.position,
                    cleared = cleared,
                    discontinuities = self.discontinuities,
                    "Export session closed"
                );
                cleared
            }
            ReaderMode::Peek => 0,
        }
    }
}

impl Iterator for LogReader {
    type Item = ProbeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let event = self.log.get(self.position).ok()?;

        if self
            .last_ordinal
            .is_some_and(|last| event.ordinal != last.wrapping_add(1))
        {
            self.discontinuities += 1;
        }
        self.last_ordinal = Some(event.ordinal);
        self.position += 1;

        Some(event)
    }
}

impl Drop for LogReader {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for LogReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogReader")
            .field("mode", &self.mode)
            .field("position", &self.position)
            .field("discontinuities", &self.discontinuities)
            .finish()
    }
}
