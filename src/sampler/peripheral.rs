//! Peripheral capabilities consumed by the sampler.
//!
//! The firmware owns the actual pins; this crate only sees these traits.

use crate::sampler::types::RawReading;
use std::time::Duration;

/// A source of raw posture/environmental readings.
///
/// Implementations must return within `timeout`.
pub trait Peripheral {
    fn read(&mut self, timeout: Duration) -> Result<RawReading, PeripheralError>;
}

impl<P: Peripheral + ?Sized> Peripheral for Box<P> {
    fn read(&mut self, timeout: Duration) -> Result<RawReading, PeripheralError> {
        (**self).read(timeout)
    }
}

/// Errors a peripheral read can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralError {
    /// No answer within the read timeout
    Timeout,
    /// The device is not attached or stopped responding
    Disconnected,
    /// Any other bus or driver failure
    Io(String),
}

impl std::fmt::Display for PeripheralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeripheralError::Timeout => write!(f, "read timed out"),
            PeripheralError::Disconnected => write!(f, "peripheral disconnected"),
            PeripheralError::Io(msg) => write!(f, "peripheral I/O error: {msg}"),
        }
    }
}

impl std::error::Error for PeripheralError {}

/// Trigger/echo pair of an HC-SR04 style ultrasonic sensor.
pub trait EchoProbe {
    /// Width of the echo pulse, or `None` when nothing reflected.
    fn pulse_width(&mut self, timeout: Duration) -> Result<Option<Duration>, PeripheralError>;
}

/// Temperature/humidity sensor.
pub trait ClimateProbe {
    /// Returns `(temperature °C, relative humidity %)`.
    fn climate(&mut self, timeout: Duration) -> Result<(f32, f32), PeripheralError>;
}

/// Distance in centimetres for an echo pulse.
///
/// The pulse covers the round trip, so the distance is half of
/// `pulse µs * calibration factor (cm/µs)`.
pub fn echo_distance_cm(pulse: Duration, calibration_factor: f64) -> f64 {
    pulse.as_micros() as f64 * calibration_factor / 2.0
}

/// Peripheral for the ultrasonic node: ranged distance is the posture value.
pub struct EchoRanger<E, C> {
    echo: E,
    climate: C,
    calibration_factor: f64,
}

impl<E: EchoProbe, C: ClimateProbe> EchoRanger<E, C> {
    pub fn new(echo: E, climate: C, calibration_factor: f64) -> Self {
        Self {
            echo,
            climate,
            calibration_factor,
        }
    }
}

impl<E: EchoProbe, C: ClimateProbe> Peripheral for EchoRanger<E, C> {
    fn read(&mut self, timeout: Duration) -> Result<RawReading, PeripheralError> {
        // Both probes share the read budget.
        let half = timeout / 2;
        let pulse = self.echo.pulse_width(half)?;
        let (temperature, humidity) = self.climate.climate(half)?;

        let (posture_value, subject_present) = match pulse {
            Some(width) => (
                echo_distance_cm(width, self.calibration_factor).round() as i32,
                true,
            ),
            None => (0, false),
        };

        Ok(RawReading {
            posture_value,
            temperature,
            humidity,
            subject_present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEcho(Option<Duration>);

    impl EchoProbe for FixedEcho {
        fn pulse_width(&mut self, _: Duration) -> Result<Option<Duration>, PeripheralError> {
            Ok(self.0)
        }
    }

    struct FixedClimate(Result<(f32, f32), PeripheralError>);

    impl ClimateProbe for FixedClimate {
        fn climate(&mut self, _: Duration) -> Result<(f32, f32), PeripheralError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_echo_distance() {
        // 2915 µs round trip ≈ 50 cm
        let cm = echo_distance_cm(Duration::from_micros(2915), 0.0343);
        assert!((cm - 49.99).abs() < 0.01);
    }

    #[test]
    fn test_ranger_reports_distance_as_posture_value() {
        let mut ranger = EchoRanger::new(
            FixedEcho(Some(Duration::from_micros(5831))),
            FixedClimate(Ok((21.0, 40.0))),
            0.0343,
        );

        let reading = ranger.read(Duration::from_millis(100)).unwrap();
        assert_eq!(reading.posture_value, 100);
        assert!(reading.subject_present);
        assert_eq!(reading.temperature, 21.0);
    }

    #[test]
    fn test_missing_echo_means_no_subject() {
        let mut ranger = EchoRanger::new(FixedEcho(None), FixedClimate(Ok((21.0, 40.0))), 0.0343);
        let reading = ranger.read(Duration::from_millis(100)).unwrap();
        assert!(!reading.subject_present);
    }

    #[test]
    fn test_climate_failure_propagates() {
        let mut ranger = EchoRanger::new(
            FixedEcho(Some(Duration::from_micros(1000))),
            FixedClimate(Err(PeripheralError::Timeout)),
            0.0343,
        );
        assert_eq!(
            ranger.read(Duration::from_millis(100)),
            Err(PeripheralError::Timeout)
        );
    }
}
