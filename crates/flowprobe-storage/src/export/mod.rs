//! Consumer-side access to the event log
//!
//! The producer only ever appends. Everything that reads the log goes through
//! an [`ExportHandle`], which opens [`LogReader`] cursors and drives the text
//! export.
//!
//! ## Export format
//!
//! One line per event, compatible with the legacy probe dump:
//! ```text
//! 0    id 1  seq 5        thread 1        ts 1700000000.000042 x3
//! ```

mod dump;
mod format;
mod reader;

pub use dump::{dump_to_file, DumpSummary};
pub use format::{format_event, parse_line, parse_lines, write_lines};
pub use reader::{LogReader, ReaderMode};

use std::sync::Arc;

use crate::event_log::{EventLog, LogStats};

/// Cloneable handle held by export consumers
#[derive(Debug, Clone)]
pub struct ExportHandle {
    log: Arc<EventLog>,
}

impl ExportHandle {
    /// Wrap a shared event log
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    /// Open a draining reader; closing it resets the log
    pub fn open_reader(&self) -> LogReader {
        LogReader::new(Arc::clone(&self.log), ReaderMode::Drain)
    }

    /// Open a reader that never resets the log
    pub fn open_peek_reader(&self) -> LogReader {
        LogReader::new(Arc::clone(&self.log), ReaderMode::Peek)
    }

    /// Open a reader with an explicit mode
    pub fn open_reader_with_mode(&self, mode: ReaderMode) -> LogReader {
        LogReader::new(Arc::clone(&self.log), mode)
    }

    /// Records currently stored
    pub fn snapshot_len(&self) -> usize {
        self.log.snapshot_len()
    }

    /// Log counters
    pub fn stats(&self) -> LogStats {
        self.log.stats()
    }

    /// Reset the log without reading it
    pub fn reset(&self) -> usize {
        self.log.reset()
    }

    /// The underlying log
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }
}
