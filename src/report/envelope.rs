//! Outbound report envelopes and their wire format.

use crate::core::{BreakEvent, EnvironmentSummary, PostureState, SensorFault, Transition};
use crate::sampler::SensorSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "posture-coach-agent";

/// Which endpoint an envelope goes to. Ordering is guaranteed per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Posture,
    Sensor,
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Posture => write!(f, "posture"),
            ReportKind::Sensor => write!(f, "sensor"),
        }
    }
}

/// Posture classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosturePayload {
    pub state: PostureState,
    pub previous_state: PostureState,
    pub posture_value: i32,
    pub temperature: f32,
    pub humidity: f32,
    pub sampled_at: DateTime<Utc>,
    /// Set when the report was triggered by the break scheduler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_event: Option<BreakEvent>,
}

impl PosturePayload {
    pub fn new(sample: &SensorSample, transition: Transition) -> Self {
        Self {
            state: transition.current,
            previous_state: transition.previous,
            posture_value: sample.posture_value,
            temperature: sample.temperature,
            humidity: sample.humidity,
            sampled_at: sample.timestamp,
            break_event: None,
        }
    }

    pub fn with_break_event(mut self, event: BreakEvent) -> Self {
        self.break_event = Some(event);
        self
    }
}

/// Environmental data: a window summary or a single out-of-range fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor_report", rename_all = "snake_case")]
pub enum SensorPayload {
    Summary {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        summary: EnvironmentSummary,
    },
    Fault { fault: SensorFault },
}

/// Envelope contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportPayload {
    Posture(PosturePayload),
    Sensor(SensorPayload),
}

/// A unit of outbound report data with its own retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub id: Uuid,
    pub payload: ReportPayload,
    /// Failed attempts so far
    pub retry_count: u32,
    pub first_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Earliest time the next attempt may be made (backoff)
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl ReportEnvelope {
    pub fn new(payload: ReportPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            retry_count: 0,
            first_attempt_at: None,
            created_at,
            next_attempt_at: None,
        }
    }

    pub fn posture(payload: PosturePayload, created_at: DateTime<Utc>) -> Self {
        Self::new(ReportPayload::Posture(payload), created_at)
    }

    pub fn sensor(payload: SensorPayload, created_at: DateTime<Utc>) -> Self {
        Self::new(ReportPayload::Sensor(payload), created_at)
    }

    pub fn kind(&self) -> ReportKind {
        match self.payload {
            ReportPayload::Posture(_) => ReportKind::Posture,
            ReportPayload::Sensor(_) => ReportKind::Sensor,
        }
    }

    /// Whether backoff allows an attempt at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map(|at| now >= at).unwrap_or(true)
    }
}

/// Request body POSTed to the remote API.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest<'a> {
    pub device_id: &'a str,
    pub timezone: &'a str,
    pub sent_at: DateTime<Utc>,
    pub envelope_id: Uuid,
    pub kind: ReportKind,
    pub created_at: DateTime<Utc>,
    /// 1-based attempt number
    pub attempt: u32,
    pub payload: &'a ReportPayload,
    pub meta: ReportMeta,
}

/// Producer metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub source: String,
    pub version: String,
}

impl<'a> ReportRequest<'a> {
    pub fn new(
        envelope: &'a ReportEnvelope,
        device_id: &'a str,
        timezone: &'a str,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            timezone,
            sent_at,
            envelope_id: envelope.id,
            kind: envelope.kind(),
            created_at: envelope.created_at,
            attempt: envelope.retry_count + 1,
            payload: &envelope.payload,
            meta: ReportMeta {
                source: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
