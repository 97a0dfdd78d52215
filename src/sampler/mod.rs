//! Sensor sampling for the Posture Coach Agent.
//!
//! The sampler polls a [`Peripheral`] with a bounded read timeout and turns
//! its raw output into a validated [`SensorSample`], or reports the sensor as
//! unavailable. It never hands out a stale value.

pub mod peripheral;
pub mod simulated;
pub mod types;

pub use peripheral::{
    echo_distance_cm, ClimateProbe, EchoProbe, EchoRanger, Peripheral, PeripheralError,
};
pub use simulated::SimulatedPeripheral;
pub use types::{RawReading, SensorSample};

use chrono::Utc;
use std::time::{Duration, Instant};

/// Errors returned by [`SensorSampler::sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// The peripheral failed or timed out; the cycle should be skipped
    SensorUnavailable(PeripheralError),
}

impl std::fmt::Display for SamplerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplerError::SensorUnavailable(e) => write!(f, "Sensor unavailable: {e}"),
        }
    }
}

impl std::error::Error for SamplerError {}

/// Polls a peripheral and validates its readings.
pub struct SensorSampler<P> {
    peripheral: P,
    read_timeout: Duration,
    consecutive_failures: u32,
}

impl<P: Peripheral> SensorSampler<P> {
    /// Create a sampler with the given per-read timeout.
    pub fn new(peripheral: P, read_timeout: Duration) -> Self {
        Self {
            peripheral,
            read_timeout,
            consecutive_failures: 0,
        }
    }

    /// Take one sample.
    ///
    /// A reading that arrives after the read timeout is discarded as stale.
    pub fn sample(&mut self) -> Result<SensorSample, SamplerError> {
        let started = Instant::now();
        let result = self.peripheral.read(self.read_timeout).and_then(|raw| {
            if started.elapsed() > self.read_timeout {
                Err(PeripheralError::Timeout)
            } else {
                Ok(raw)
            }
        });

        match result {
            Ok(raw) => {
                self.consecutive_failures = 0;
                Ok(SensorSample::from_raw(raw, Utc::now()))
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                tracing::debug!(
                    failures = self.consecutive_failures,
                    "Peripheral read failed: {e}"
                );
                Err(SamplerError::SensorUnavailable(e))
            }
        }
    }

    /// Reads failed in a row since the last good sample.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<RawReading, PeripheralError>>);

    impl Peripheral for Scripted {
        fn read(&mut self, _: Duration) -> Result<RawReading, PeripheralError> {
            self.0.pop_front().unwrap_or(Err(PeripheralError::Disconnected))
        }
    }

    /// Answers, but only after sleeping past the timeout.
    struct Sluggish(Duration);

    impl Peripheral for Sluggish {
        fn read(&mut self, _: Duration) -> Result<RawReading, PeripheralError> {
            std::thread::sleep(self.0);
            Ok(reading(42))
        }
    }

    fn reading(value: i32) -> RawReading {
        RawReading {
            posture_value: value,
            temperature: 22.0,
            humidity: 50.0,
            subject_present: true,
        }
    }

    #[test]
    fn test_sample_ok() {
        let mut sampler = SensorSampler::new(
            Scripted(VecDeque::from([Ok(reading(42))])),
            Duration::from_millis(100),
        );
        let sample = sampler.sample().unwrap();
        assert_eq!(sample.posture_value, 42);
        assert!(sample.source_valid);
    }

    #[test]
    fn test_failure_is_unavailable_not_stale() {
        let mut sampler = SensorSampler::new(
            Scripted(VecDeque::from([
                Ok(reading(42)),
                Err(PeripheralError::Timeout),
                Err(PeripheralError::Io("i2c nack".to_string())),
                Ok(reading(43)),
            ])),
            Duration::from_millis(100),
        );

        assert!(sampler.sample().is_ok());
        assert_eq!(
            sampler.sample(),
            Err(SamplerError::SensorUnavailable(PeripheralError::Timeout))
        );
        assert!(sampler.sample().is_err());
        assert_eq!(sampler.consecutive_failures(), 2);

        assert_eq!(sampler.sample().unwrap().posture_value, 43);
        assert_eq!(sampler.consecutive_failures(), 0);
    }

    #[test]
    fn test_late_reading_is_timeout() {
        let mut sampler =
            SensorSampler::new(Sluggish(Duration::from_millis(30)), Duration::from_millis(5));
        assert_eq!(
            sampler.sample(),
            Err(SamplerError::SensorUnavailable(PeripheralError::Timeout))
        );
        assert_eq!(sampler.consecutive_failures(), 1);

        let mut sampler =
            SensorSampler::new(Sluggish(Duration::from_millis(1)), Duration::from_millis(500));
        assert!(sampler.sample().is_ok());
    }
}
