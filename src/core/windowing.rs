//! Time windows for batching environmental readings.
//!
//! In-range readings are collected into fixed-duration windows (default 60
//! seconds); each completed window becomes one sensor report.

use crate::sampler::SensorSample;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One environmental reading kept for batching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub timestamp: DateTime<Utc>,
    pub temperature: f32,
    pub humidity: f32,
}

impl From<&SensorSample> for EnvironmentReading {
    fn from(sample: &SensorSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            temperature: sample.temperature,
            humidity: sample.humidity,
        }
    }
}

/// A time window of environmental readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub readings: Vec<EnvironmentReading>,
}

impl ReadingWindow {
    /// Create a new empty window starting at the given time.
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
            readings: Vec::new(),
        }
    }

    /// Check if a timestamp falls within this window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

/// Collects readings into windows.
pub struct WindowManager {
    window_duration: Duration,
    current_window: Option<ReadingWindow>,
    completed_windows: Vec<ReadingWindow>,
}

impl WindowManager {
    /// Create a window manager with the given window length.
    pub fn new(window_duration: std::time::Duration) -> Self {
        Self {
            window_duration: Duration::milliseconds(window_duration.as_millis() as i64),
            current_window: None,
            completed_windows: Vec::new(),
        }
    }

    /// Add a reading, completing the current window if the reading is past it.
    pub fn process_reading(&mut self, reading: EnvironmentReading) {
        let expired = self
            .current_window
            .as_ref()
            .map(|w| reading.timestamp >= w.end)
            .unwrap_or(false);
        if expired {
            self.complete_current_window();
        }

        let window = self
            .current_window
            .get_or_insert_with(|| ReadingWindow::new(reading.timestamp, self.window_duration));
        window.readings.push(reading);
    }

    /// Complete the current window if it has expired by `now`.
    pub fn check_window_expiry(&mut self, now: DateTime<Utc>) {
        if let Some(ref window) = self.current_window {
            if now >= window.end {
                self.complete_current_window();
            }
        }
    }

    /// Force completion of the current window (e.g. on shutdown).
    pub fn flush(&mut self) {
        self.complete_current_window();
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<ReadingWindow> {
        std::mem::take(&mut self.completed_windows)
    }

    pub fn has_completed_windows(&self) -> bool {
        !self.completed_windows.is_empty()
    }

    fn complete_current_window(&mut self) {
        if let Some(window) = self.current_window.take() {
            if !window.is_empty() {
                self.completed_windows.push(window);
            }
        }
    }
}
