//! Task runtime for the Posture Coach Agent.
//!
//! This module contains:
//! - Periodic task bookkeeping with priority tiers and deadline tracking
//! - The cooperative [`Agent`] loop (sampling and housekeeping)
//! - The reporting thread and its bounded handoff
//! - Operator commands, the shared status snapshot and button debouncing

pub mod agent;
pub mod button;
pub mod reporter;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder};
pub use button::{ButtonDebouncer, ButtonInput};
pub use reporter::{spawn_reporter, ReportSink, Reporter};
pub use status::{
    create_shared_status, read_status, update_status, Command, SessionStats, SharedStatus,
    StatusSnapshot,
};
pub use task::{PeriodicTask, TaskPriority, TaskStats};
