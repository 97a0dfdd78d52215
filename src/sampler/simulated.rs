//! Simulated peripheral for hosts without sensor hardware.
//!
//! Produces a bounded random walk so the whole pipeline (classification,
//! break scheduling, reporting) can be exercised from a desktop.

use crate::sampler::peripheral::{Peripheral, PeripheralError};
use crate::sampler::types::RawReading;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// A random-walk peripheral.
pub struct SimulatedPeripheral {
    rng: StdRng,
    posture: f64,
    temperature: f64,
    humidity: f64,
    /// Probability that a read fails, to exercise the unavailable path
    failure_rate: f64,
}

impl SimulatedPeripheral {
    /// Create a simulated peripheral. A seed makes the walk reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            posture: 60.0,
            temperature: 22.0,
            humidity: 45.0,
            failure_rate: 0.01,
        }
    }

    /// Override the read failure probability (0.0 - 1.0).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl Peripheral for SimulatedPeripheral {
    fn read(&mut self, _timeout: Duration) -> Result<RawReading, PeripheralError> {
        if self.rng.gen_bool(self.failure_rate) {
            return Err(PeripheralError::Timeout);
        }

        // Posture drifts slowly upward (fatigue) with noise.
        self.posture += self.rng.gen_range(-12.0..14.0);
        self.posture = self.posture.clamp(0.0, 320.0);

        self.temperature += self.rng.gen_range(-0.2..0.2);
        self.temperature = self.temperature.clamp(10.0, 35.0);

        self.humidity += self.rng.gen_range(-0.5..0.5);
        self.humidity = self.humidity.clamp(10.0, 90.0);

        Ok(RawReading {
            posture_value: self.posture.round() as i32,
            temperature: self.temperature as f32,
            humidity: self.humidity as f32,
            subject_present: !self.rng.gen_bool(0.02),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_walk_is_reproducible() {
        let mut a = SimulatedPeripheral::new(Some(7)).with_failure_rate(0.0);
        let mut b = SimulatedPeripheral::new(Some(7)).with_failure_rate(0.0);

        for _ in 0..20 {
            let timeout = Duration::from_millis(10);
            assert_eq!(a.read(timeout), b.read(timeout));
        }
    }

    #[test]
    fn test_walk_stays_bounded() {
        let mut sim = SimulatedPeripheral::new(Some(1)).with_failure_rate(0.0);
        for _ in 0..1000 {
            let reading = sim.read(Duration::from_millis(10)).unwrap();
            assert!((0..=320).contains(&reading.posture_value));
            assert!((10.0..=35.0).contains(&reading.temperature));
        }
    }

    #[test]
    fn test_always_failing() {
        let mut sim = SimulatedPeripheral::new(Some(1)).with_failure_rate(1.0);
        assert_eq!(
            sim.read(Duration::from_millis(10)),
            Err(PeripheralError::Timeout)
        );
    }
}
