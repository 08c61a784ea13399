//! Probe configuration
//!
//! All settings have defaults, so a config file or environment only needs to
//! name what it changes.
//!
//! ## Environment overrides
//!
//! | variable | field |
//! |---|---|
//! | `FLOWPROBE_CAPACITY` | `capacity` |
//! | `FLOWPROBE_CALIBRATION` | `calibration.enabled` (`on`/`off`, `true`/`false`, `1`/`0`) |
//! | `FLOWPROBE_CALIBRATION_WINDOW` | `calibration.window` |
//! | `FLOWPROBE_TRIM_PERCENT` | `calibration.trim_percent` |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use flowprobe_core::ConfigError;
use flowprobe_storage::{EventLogConfig, DEFAULT_CAPACITY};

use crate::calibration::CalibrationConfig;
use crate::scanner::ScannerConfig;

pub const ENV_CAPACITY: &str = "FLOWPROBE_CAPACITY";
pub const ENV_CALIBRATION: &str = "FLOWPROBE_CALIBRATION";
pub const ENV_CALIBRATION_WINDOW: &str = "FLOWPROBE_CALIBRATION_WINDOW";
pub const ENV_TRIM_PERCENT: &str = "FLOWPROBE_TRIM_PERCENT";

/// Complete probe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Event log slots
    pub capacity: usize,
    /// Clock overhead calibration
    pub calibration: CalibrationConfig,
    /// Payload scanner
    pub scanner: ScannerConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            calibration: CalibrationConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Small log and short calibration window for tests
    pub fn testing() -> Self {
        Self {
            capacity: 1024,
            calibration: CalibrationConfig {
                enabled: true,
                window: 10,
                trim_percent: 10,
            },
            scanner: ScannerConfig::default(),
        }
    }

    /// Set the log capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replace the calibration settings
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Replace the scanner settings
    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity", "must be at least 1"));
        }
        self.calibration.validate()?;
        self.scanner.validate()
    }

    /// Event log settings derived from this config
    pub fn log_config(&self) -> EventLogConfig {
        EventLogConfig::with_capacity(self.capacity)
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then validate
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CAPACITY) {
            self.capacity = parse_var(ENV_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_CALIBRATION) {
            self.calibration.enabled = parse_switch(ENV_CALIBRATION, &value)?;
        }
        if let Some(value) = lookup(ENV_CALIBRATION_WINDOW) {
            self.calibration.window = parse_var(ENV_CALIBRATION_WINDOW, &value)?;
        }
        if let Some(value) = lookup(ENV_TRIM_PERCENT) {
            self.calibration.trim_percent = parse_var(ENV_TRIM_PERCENT, &value)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(name, format!("{value:?}: {e}")))
}

fn parse_switch(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(
            name,
            format!("{value:?} is not a switch (use on/off)"),
        )),
    }
}
