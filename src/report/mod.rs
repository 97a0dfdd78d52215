//! Outbound reporting for the Posture Coach Agent.
//!
//! This module contains:
//! - Report envelopes and the request body sent to the remote API
//! - The [`Transport`] capability
//! - The retrying, ordered [`ReportDispatcher`]

pub mod dispatcher;
pub mod envelope;
pub mod transport;

// Re-export commonly used types
pub use dispatcher::{DeliveryResult, ReportDispatcher, RetryPolicy};
pub use envelope::{
    PosturePayload, ReportEnvelope, ReportKind, ReportPayload, ReportRequest, SensorPayload,
    PRODUCER_NAME,
};
pub use transport::{DeliveryError, Transport};
