//! Posture Coach Agent - on-device posture detection and break coaching.
//!
//! This library classifies periodic posture and environment samples with
//! hysteresis, schedules adaptive break reminders and reports state to a
//! remote API over an unreliable link.
//!
//! # Guarantees
//!
//! - **No flapping**: a single noisy sample never changes the posture state
//! - **Bounded breaks**: every break interval stays within the configured range
//! - **Ordered delivery**: reports of one kind arrive in the order they were made
//! - **Nothing lost silently**: every fault and dropped report is counted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Posture Coach Agent                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Sampler   │──▶│ Classifier  │──▶│    Break    │             │
//! │  │ (HIGH, 1s)  │   │(hysteresis) │   │  Scheduler  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                          │                  │                     │
//! │                          ▼                  ▼                     │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Telemetry  │◀──│   Report    │   │    Alert    │             │
//! │  │     Log     │   │ Dispatcher  │   │  Actuator   │             │
//! │  └─────────────┘   │ (MEDIUM)    │   └─────────────┘             │
//! │                    └─────────────┘                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use posture_coach_agent::core::{Classification, ThresholdClassifier};
//! use posture_coach_agent::sampler::{SensorSampler, SimulatedPeripheral};
//! use posture_coach_agent::Config;
//!
//! let config = Config::default();
//! let mut sampler = SensorSampler::new(SimulatedPeripheral::new(None), config.tasks.read_timeout);
//! let mut classifier = ThresholdClassifier::from_config(&config);
//!
//! if let Ok(sample) = sampler.sample() {
//!     if let Classification::Posture(t) = classifier.classify(&sample) {
//!         println!("posture: {}", t.current);
//!     }
//! }
//! ```

pub mod alert;
pub mod config;
pub mod core;
pub mod report;
pub mod runtime;
pub mod sampler;
pub mod telemetry;

#[cfg(feature = "api")]
pub mod api;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use alert::{AlertActuator, AlertCommand, AlertPattern, LogActuator};
pub use config::{Config, ConfigError, SettingsUpdate, ValidatedConfig};
pub use crate::core::{BreakScheduler, Classification, PostureState, ThresholdClassifier};
pub use report::{DeliveryError, ReportDispatcher, ReportEnvelope, Transport};
pub use runtime::{Agent, Command, ReportSink, Reporter, StatusSnapshot};
pub use sampler::{Peripheral, SamplerError, SensorSample, SensorSampler};
pub use telemetry::{SharedTelemetryLog, TelemetryLog, TelemetryStats};

// API client re-exports (when enabled)
#[cfg(feature = "api")]
pub use api::{ApiClient, ApiConfig, ApiError, BlockingApiClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data declaration shown by the CLI.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            POSTURE COACH AGENT - DATA DECLARATION                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent coaches posture and reminds you to take breaks.      ║
║                                                                  ║
║  ✓ WHAT WE REPORT:                                               ║
║    • Your posture state (normal / warning / anomaly)             ║
║    • The raw distance reading behind each state                  ║
║    • Room temperature and humidity summaries                     ║
║    • When breaks were due and taken                              ║
║                                                                  ║
║  ✗ WHAT WE NEVER REPORT:                                         ║
║    • Camera images or video                                      ║
║    • Posture data while privacy mode is on                       ║
║                                                                  ║
║  Reports go only to the API URL in your configuration.           ║
║                                                                  ║
║  You can view delivery statistics anytime with:                  ║
║    posture-coach status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
