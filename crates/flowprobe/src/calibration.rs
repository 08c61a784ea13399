//! Clock overhead calibration
//!
//! Taking a timestamp is not free. The calibrator measures how long the
//! probe takes between starting to scan a buffer and stamping the first
//! event, over a fixed window of early samples. Once the window is full it
//! freezes the trimmed mean of those samples as a correction that is
//! subtracted from every later timestamp.
//!
//! The calibrator is owned by the producer and mutated through `&mut self`;
//! it needs no synchronization.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flowprobe_core::{CalibrationError, ConfigError, Timestamp};

/// Calibration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// When false, no samples are taken and the correction is always 0
    pub enabled: bool,
    /// Number of samples collected before converging
    pub window: usize,
    /// Percentage discarded from each end of the sorted window
    pub trim_percent: u8,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 100,
            trim_percent: 5,
        }
    }
}

impl CalibrationConfig {
    /// Calibration switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::invalid(
                "calibration.window",
                "must be at least 1",
            ));
        }
        if self.trim_percent >= 50 {
            return Err(ConfigError::invalid(
                "calibration.trim_percent",
                format!("must be below 50, got {}", self.trim_percent),
            ));
        }
        let (lo, hi) = trim_bounds(self.window, self.trim_percent);
        if lo >= hi {
            return Err(ConfigError::invalid(
                "calibration.window",
                format!(
                    "{}% trim leaves no samples out of {}",
                    self.trim_percent, self.window
                ),
            ));
        }
        Ok(())
    }
}

/// Where the calibrator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationState {
    /// Filling the sample window; correction is 0
    Collecting { collected: usize, window: usize },
    /// Correction frozen
    Converged { correction_micros: u64 },
    /// Calibration switched off; correction is 0
    Disabled,
}

/// Half-open index range kept after trimming `trim_percent` from each end
fn trim_bounds(len: usize, trim_percent: u8) -> (usize, usize) {
    let percent = usize::from(trim_percent);
    let lo = len * percent / 100;
    let hi = len * (100 - percent) / 100;
    (lo, hi)
}

/// Mean of `samples` after discarding `trim_percent` from each end
///
/// Sorts `samples` in place. The mean uses integer division. Returns `None`
/// when trimming leaves nothing to average.
pub fn trimmed_mean(samples: &mut [u64], trim_percent: u8) -> Option<u64> {
    if trim_percent >= 50 {
        return None;
    }
    samples.sort_unstable();
    let (lo, hi) = trim_bounds(samples.len(), trim_percent);
    let kept = samples.get(lo..hi).filter(|kept| !kept.is_empty())?;
    let sum: u128 = kept.iter().map(|&s| u128::from(s)).sum();
    u64::try_from(sum / kept.len() as u128).ok()
}

/// Trimmed-mean clock overhead compensator
#[derive(Debug, Clone)]
pub struct Calibrator {
    samples: Box<[u64]>,
    collected: usize,
    trim_percent: u8,
    baseline: Option<Timestamp>,
    correction: Option<u64>,
    enabled: bool,
}

impl Calibrator {
    /// Create a calibrator with an empty window
    pub fn new(config: &CalibrationConfig) -> Self {
        let window = if config.enabled { config.window } else { 0 };
        Self {
            samples: vec![0; window].into_boxed_slice(),
            collected: 0,
            trim_percent: config.trim_percent,
            baseline: None,
            correction: None,
            enabled: config.enabled,
        }
    }

    /// Whether samples are still wanted
    pub fn is_collecting(&self) -> bool {
        self.enabled && self.correction.is_none()
    }

    /// Record the baseline for the next sample
    ///
    /// Called right before scanning a buffer. No-op once converged or when
    /// disabled.
    pub fn begin_measurement(&mut self, now: Timestamp) {
        if self.is_collecting() {
            self.baseline = Some(now);
        }
    }

    /// Feed `now - baseline` into the window and return the correction to
    /// apply to `now`
    ///
    /// Without a pending baseline no sample is taken. A baseline is consumed
    /// by one sample; negative elapsed times count as 0.
    pub fn end_measurement(&mut self, now: Timestamp) -> u64 {
        let pending = self.baseline.take().filter(|_| self.is_collecting());
        if let Some(baseline) = pending
            && let Some(slot) = self.samples.get_mut(self.collected)
        {
            *slot = u64::try_from(now.micros_since(baseline)).unwrap_or(0);
            self.collected += 1;
            if self.collected == self.samples.len() {
                self.converge();
            }
        }
        self.correction()
    }

    /// Drop a pending baseline without taking a sample
    ///
    /// Called when the measured operation ended without stamping an event,
    /// so a later unrelated stamp cannot pair with a stale baseline.
    pub fn cancel_measurement(&mut self) {
        self.baseline = None;
    }

    /// Subtract the current correction, borrowing into seconds
    pub fn apply(&self, ts: Timestamp) -> Timestamp {
        ts.saturating_sub_micros(self.correction())
    }

    /// Current correction; 0 until converged
    pub fn correction(&self) -> u64 {
        self.correction.unwrap_or(0)
    }

    /// The frozen correction
    ///
    /// # Errors
    ///
    /// [`CalibrationError::NotConverged`] while collecting, or
    /// [`CalibrationError::Disabled`].
    pub fn converged_correction(&self) -> Result<u64, CalibrationError> {
        if !self.enabled {
            return Err(CalibrationError::Disabled);
        }
        self.correction.ok_or(CalibrationError::NotConverged {
            collected: self.collected,
            window: self.samples.len(),
        })
    }

    pub fn state(&self) -> CalibrationState {
        match (self.enabled, self.correction) {
            (false, _) => CalibrationState::Disabled,
            (true, Some(correction_micros)) => CalibrationState::Converged { correction_micros },
            (true, None) => CalibrationState::Collecting {
                collected: self.collected,
                window: self.samples.len(),
            },
        }
    }

    /// Samples collected so far (sorted once converged)
    pub fn samples(&self) -> &[u64] {
        &self.samples[..self.collected]
    }

    fn converge(&mut self) {
        debug!(samples = ?self.samples, "Calibration window full");
        let correction = trimmed_mean(&mut self.samples, self.trim_percent).unwrap_or(0);
        self.correction = Some(correction);
        info!(
            window = self.samples.len(),
            trim_percent = self.trim_percent,
            correction_micros = correction,
            "Calibration finished"
        );
    }
}
