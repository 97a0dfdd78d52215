//! The delivery capability used by the dispatcher.

use crate::report::envelope::ReportEnvelope;

/// Delivers one envelope to its endpoint.
///
/// Implementations must be time-bounded: a call returns (success, error or
/// [`DeliveryError::Timeout`]) within the configured HTTP timeout.
pub trait Transport {
    fn deliver(&mut self, envelope: &ReportEnvelope) -> Result<(), DeliveryError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn deliver(&mut self, envelope: &ReportEnvelope) -> Result<(), DeliveryError> {
        (**self).deliver(envelope)
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No response within the timeout
    Timeout,
    /// Connection-level failure
    Network(String),
    /// Non-2xx response
    Status { status: u16, message: String },
    /// The envelope could not be encoded; retrying cannot help
    Serialization(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Serialization(_))
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Timeout => write!(f, "Delivery timed out"),
            DeliveryError::Network(msg) => write!(f, "Network error: {msg}"),
            DeliveryError::Status { status, message } => {
                write!(f, "Server error ({status}): {message}")
            }
            DeliveryError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for DeliveryError {}
