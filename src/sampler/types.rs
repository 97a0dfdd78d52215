//! Sample types produced by the sampler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One validated poll of the posture and environmental inputs.
///
/// Immutable once produced; consumed by classification and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// When the peripheral read completed
    pub timestamp: DateTime<Utc>,
    /// Posture metric (camera score or ranged distance in cm)
    pub posture_value: i32,
    /// Temperature in °C
    pub temperature: f32,
    /// Relative humidity in %
    pub humidity: f32,
    /// False when the reading cannot be trusted (no subject, non-finite values)
    pub source_valid: bool,
}

/// What a peripheral returns before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub posture_value: i32,
    pub temperature: f32,
    pub humidity: f32,
    /// Whether a person was in front of the sensor
    pub subject_present: bool,
}

impl SensorSample {
    /// Validate a raw reading and stamp it.
    pub fn from_raw(raw: RawReading, timestamp: DateTime<Utc>) -> Self {
        let source_valid =
            raw.subject_present && raw.temperature.is_finite() && raw.humidity.is_finite();

        Self {
            timestamp,
            posture_value: raw.posture_value,
            temperature: raw.temperature,
            humidity: raw.humidity,
            source_valid,
        }
    }
}
