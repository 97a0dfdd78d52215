//! Summary statistics for batched environmental readings.

use crate::core::windowing::ReadingWindow;
use serde::{Deserialize, Serialize};

/// Statistics for one measured quantity over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

/// Summary of a reading window as sent to the sensor endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub sample_count: usize,
    pub temperature: Stats,
    pub humidity: Stats,
}

/// Compute the summary of a window.
pub fn summarize(window: &ReadingWindow) -> EnvironmentSummary {
    let temperatures: Vec<f64> = window
        .readings
        .iter()
        .map(|r| r.temperature as f64)
        .collect();
    let humidities: Vec<f64> = window.readings.iter().map(|r| r.humidity as f64).collect();

    EnvironmentSummary {
        sample_count: window.readings.len(),
        temperature: stats(&temperatures),
        humidity: stats(&humidities),
    }
}

fn stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Stats {
        mean,
        min,
        max,
        std_dev: std_dev(values, mean),
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
