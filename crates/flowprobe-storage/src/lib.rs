//! # Flowprobe Storage
//!
//! Event storage for the flowprobe telemetry probe.
//!
//! ## Features
//!
//! - **EventLog**: fixed-capacity, append-only log with a lock-free append path
//! - **LogReader**: forward-only, restartable cursor that resets the log on close
//! - **ExportHandle**: cloneable consumer-side handle for opening readers
//! - **Line format**: the canonical one-line-per-event text encoding
//! - **dump_to_file**: async drain of a reader into a text file
//!
//! ## Example
//!
//! ```rust
//! use flowprobe_core::{EventDraft, ProbePoint, Timestamp};
//! use flowprobe_storage::{EventLog, EventLogConfig, ExportHandle};
//! use std::sync::Arc;
//!
//! let log = Arc::new(EventLog::new(EventLogConfig::with_capacity(16)));
//! let draft = EventDraft::new(ProbePoint::SendSocket, 5, 1, 1);
//! log.append(draft, || Timestamp::new(1, 0)).unwrap();
//!
//! let handle = ExportHandle::new(Arc::clone(&log));
//! let mut reader = handle.open_reader();
//! assert_eq!(reader.next().map(|e| e.sequence), Some(5));
//! assert!(reader.next().is_none());
//! assert_eq!(reader.close(), 1);
//! assert_eq!(log.snapshot_len(), 0);
//! ```

pub mod error;
pub mod event_log;
pub mod export;

// Re-exports
pub use error::StorageError;
pub use event_log::{EventLog, EventLogConfig, LogStats, DEFAULT_CAPACITY};
pub use export::{
    dump_to_file, format_event, parse_line, parse_lines, write_lines, DumpSummary, ExportHandle,
    LogReader, ReaderMode,
};
