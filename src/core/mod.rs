//! Core detection logic for the Posture Coach Agent.
//!
//! This module contains:
//! - Hysteresis-based posture classification
//! - Adaptive break scheduling
//! - Windowing and summaries for environmental readings

pub mod classifier;
pub mod scheduler;
pub mod summary;
pub mod windowing;

// Re-export commonly used types
pub use classifier::{
    posture_score, Classification, PostureState, SensorFault, ThresholdClassifier, Transition,
};
pub use scheduler::{interval_band, BreakEvent, BreakScheduler, BreakState, BreakTimer};
pub use summary::{summarize, EnvironmentSummary, Stats};
pub use windowing::{EnvironmentReading, ReadingWindow, WindowManager};
