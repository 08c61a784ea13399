//! Error types for flowprobe
//!
//! None of these errors is fatal to the host: the scanner skips malformed
//! input and the log drops events once full, reporting both as values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for probe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Probe not initialized")]
    NotInitialized,

    #[error("Probe already initialized")]
    AlreadyInitialized,

    #[error("Probe busy: another producer holds it")]
    Busy,
}

/// Errors produced while locating and walking a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Malformed buffer: no sentinel marker within {scanned} bytes")]
    MalformedBuffer { scanned: usize },

    #[error("Buffer boundary {end} exceeds buffer length {len}")]
    BoundaryOutOfRange { end: usize, len: usize },

    #[error("Truncated {protocol} header: {len} bytes")]
    TruncatedHeader { protocol: &'static str, len: usize },
}

/// Errors related to the fixed-capacity event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LogError {
    #[error("Event log full: capacity {capacity} exceeded")]
    LogFull { capacity: usize },

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Event log busy: a reset or another append is in progress")]
    Busy,
}

/// Informational calibration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("Calibration not converged: {collected}/{window} samples")]
    NotConverged { collected: usize, window: usize },

    #[error("Calibration disabled")]
    Disabled,
}

/// Errors related to configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Create a new Invalid error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::MalformedBuffer { scanned: 64 };
        assert!(format!("{}", err).contains("Malformed buffer"));
        assert!(format!("{}", err).contains("64"));

        let err = ScanError::BoundaryOutOfRange { end: 10, len: 4 };
        let msg = format!("{}", err);
        assert!(msg.contains("10"));
        assert!(msg.contains("4"));

        let err = ScanError::TruncatedHeader {
            protocol: "TCP",
            len: 12,
        };
        assert!(format!("{}", err).contains("TCP"));
    }

    #[test]
    fn test_log_error_serde() {
        let err = LogError::LogFull { capacity: 500 };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("LogFull"));
        assert_eq!(serde_json::from_str::<LogError>(&json).unwrap(), err);
        assert_eq!(
            serde_json::from_str::<LogError>("\"Busy\"").unwrap(),
            LogError::Busy
        );
    }

    #[test]
    fn test_log_error_display() {
        let err = LogError::LogFull { capacity: 500 };
        assert!(format!("{}", err).contains("full"));
        assert!(format!("{}", err).contains("500"));

        let err = LogError::IndexOutOfRange { index: 7, len: 3 };
        let msg = format!("{}", err);
        assert!(msg.contains("7"));
        assert!(msg.contains("3"));

        assert!(format!("{}", LogError::Busy).contains("busy"));
    }

    #[test]
    fn test_calibration_error_display() {
        let err = CalibrationError::NotConverged {
            collected: 12,
            window: 100,
        };
        assert!(format!("{}", err).contains("12/100"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("capacity", "must be positive");
        let msg = format!("{}", err);
        assert!(msg.contains("capacity"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_error_conversions() {
        let err: ProbeError = ScanError::MalformedBuffer { scanned: 0 }.into();
        assert!(matches!(err, ProbeError::Scan(_)));

        let err: ProbeError = LogError::LogFull { capacity: 1 }.into();
        assert!(matches!(err, ProbeError::Log(_)));

        let err: ProbeError = CalibrationError::Disabled.into();
        assert!(matches!(err, ProbeError::Calibration(_)));

        let err: ProbeError = ConfigError::Parse("eof".to_string()).into();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[test]
    fn test_probe_error_display() {
        let err: ProbeError = LogError::LogFull { capacity: 8 }.into();
        let msg = format!("{}", err);
        assert!(msg.contains("Log error"));
        assert!(msg.contains("8"));
    }
}
