//! Telemetry for the Posture Coach Agent.
//!
//! Every fault, dropped report and break event is counted here so nothing
//! is discarded silently; the counters are surfaced to the actuator and
//! persisted across restarts.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTelemetryLog, TelemetryLog,
    TelemetryStats,
};
