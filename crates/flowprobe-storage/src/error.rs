//! Error types for flowprobe-storage

use flowprobe_core::LogError;
use thiserror::Error;

/// Errors that can occur while exporting the event log
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error while writing an export
    #[error("I/O error: {0}")]
    Io(String),

    /// A line did not match the export format
    #[error("Format error on line {line}: {reason}")]
    Format { line: usize, reason: String },

    /// Error from the underlying event log
    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new Format error
    pub fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}
