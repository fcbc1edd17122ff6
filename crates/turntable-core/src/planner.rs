use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Degrees of turntable rotation per second of relay on-time. Fixed per rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RotationCalibration(f64);

impl RotationCalibration {
    pub fn new(degrees_per_second: f64) -> Result<Self, ConfigError> {
        if !degrees_per_second.is_finite() || degrees_per_second <= 0.0 {
            return Err(ConfigError::InvalidCalibration(degrees_per_second));
        }
        Ok(Self(degrees_per_second))
    }

    pub fn degrees_per_second(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for RotationCalibration {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RotationCalibration> for f64 {
    fn from(value: RotationCalibration) -> Self {
        value.0
    }
}

/// Converts an angular step into relay on-time. Pure, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct RotationPlanner {
    calibration: RotationCalibration,
}

impl RotationPlanner {
    pub fn new(calibration: RotationCalibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> RotationCalibration {
        self.calibration
    }

    /// `degrees / calibration * 1000`, rounded to the nearest millisecond.
    /// Callers keep `degrees` within `(0, 360]`.
    pub fn duration_ms_for_degrees(&self, degrees: f64) -> u64 {
        (degrees / self.calibration.0 * 1000.0).round().max(0.0) as u64
    }

    pub fn duration_for_degrees(&self, degrees: f64) -> Duration {
        Duration::from_millis(self.duration_ms_for_degrees(degrees))
    }
}
