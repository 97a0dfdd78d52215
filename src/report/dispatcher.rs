//! Reliable, ordered delivery of report envelopes.
//!
//! Envelopes wait in one FIFO queue per [`ReportKind`]. A flush attempts only
//! the head of each queue, so envelopes of the same kind are delivered in
//! creation order while the two kinds proceed independently. Failed attempts
//! back off exponentially (capped at the HTTP timeout); an envelope that
//! fails `max_attempts` times is dropped and counted as a telemetry loss.
//! `flush` never sleeps: backoff is recorded on the envelope and honoured by
//! later flushes.

use crate::config::ReportingConfig;
use crate::report::envelope::{ReportEnvelope, ReportKind};
use crate::report::transport::{DeliveryError, Transport};
use crate::telemetry::SharedTelemetryLog;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// Upper bound on deliveries per kind in one flush, bounding flush time.
const MAX_DELIVERIES_PER_FLUSH: usize = 16;

/// Retry policy for failed deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: config.base_backoff,
            max_backoff: config.http_timeout,
        }
    }

    /// Delay before the next attempt after `failed_attempts` failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReportingConfig::default())
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Acknowledged with 2xx
    pub delivered: usize,
    /// Failed, will be retried
    pub retried: usize,
    /// Failed for the last time and discarded
    pub dropped: usize,
    /// Still queued after the flush
    pub pending: usize,
}

/// Owns outbound envelopes from enqueue until acknowledged or dropped.
pub struct ReportDispatcher<T> {
    transport: T,
    policy: RetryPolicy,
    capacity: usize,
    posture: VecDeque<ReportEnvelope>,
    sensor: VecDeque<ReportEnvelope>,
    telemetry: SharedTelemetryLog,
}

impl<T: Transport> ReportDispatcher<T> {
    /// Create a dispatcher holding at most `capacity` envelopes per kind.
    pub fn new(
        transport: T,
        policy: RetryPolicy,
        capacity: usize,
        telemetry: SharedTelemetryLog,
    ) -> Self {
        Self {
            transport,
            policy,
            capacity: capacity.max(1),
            posture: VecDeque::new(),
            sensor: VecDeque::new(),
            telemetry,
        }
    }

    /// Queue an envelope. Never blocks.
    ///
    /// When the kind's queue is full the oldest envelope of that kind is
    /// discarded and counted as lost; returns `false` in that case.
    pub fn enqueue(&mut self, envelope: ReportEnvelope) -> bool {
        let kind = envelope.kind();
        let capacity = self.capacity;
        let queue = self.queue_mut(kind);

        let mut accepted_without_loss = true;
        if queue.len() >= capacity {
            if let Some(displaced) = queue.pop_front() {
                tracing::warn!(
                    envelope = %displaced.id,
                    %kind,
                    "Report queue full, dropping oldest envelope"
                );
            }
            accepted_without_loss = false;
        }
        queue.push_back(envelope);

        if !accepted_without_loss {
            self.telemetry.record_queue_overflow();
        }
        accepted_without_loss
    }

    /// Attempt delivery of every ready envelope at the head of each queue.
    pub fn flush(&mut self, now: DateTime<Utc>) -> DeliveryResult {
        let mut result = DeliveryResult::default();

        for kind in [ReportKind::Posture, ReportKind::Sensor] {
            self.flush_kind(kind, now, &mut result);
        }

        result.pending = self.pending();
        result
    }

    fn flush_kind(&mut self, kind: ReportKind, now: DateTime<Utc>, result: &mut DeliveryResult) {
        for _ in 0..MAX_DELIVERIES_PER_FLUSH {
            let outcome = {
                let queue = match kind {
                    ReportKind::Posture => &mut self.posture,
                    ReportKind::Sensor => &mut self.sensor,
                };
                let Some(head) = queue.front_mut() else {
                    return;
                };
                if !head.is_ready(now) {
                    return;
                }

                head.first_attempt_at.get_or_insert(now);
                self.transport.deliver(head)
            };

            match outcome {
                Ok(()) => {
                    if let Some(done) = self.queue_mut(kind).pop_front() {
                        tracing::debug!(envelope = %done.id, %kind, "Report delivered");
                    }
                    self.telemetry.record_report_delivered();
                    result.delivered += 1;
                }
                Err(e) => {
                    self.handle_failure(kind, now, e, result);
                    // The link is likely down; leave the rest for the next window.
                    return;
                }
            }
        }
    }

    fn handle_failure(
        &mut self,
        kind: ReportKind,
        now: DateTime<Utc>,
        error: DeliveryError,
        result: &mut DeliveryResult,
    ) {
        let policy = self.policy.clone();
        let queue = self.queue_mut(kind);
        let Some(head) = queue.front_mut() else {
            return;
        };

        head.retry_count += 1;
        let exhausted = head.retry_count >= policy.max_attempts || !error.is_retryable();

        if exhausted {
            if let Some(lost) = queue.pop_front() {
                tracing::warn!(
                    envelope = %lost.id,
                    %kind,
                    attempts = lost.retry_count,
                    "Dropping report after final failure: {error}"
                );
            }
            self.telemetry.record_report_dropped();
            result.dropped += 1;
        } else {
            let delay = policy.backoff(head.retry_count);
            head.next_attempt_at = Some(
                now + chrono::Duration::milliseconds(delay.as_millis() as i64),
            );
            tracing::debug!(
                envelope = %head.id,
                %kind,
                attempt = head.retry_count,
                backoff_ms = delay.as_millis() as u64,
                "Report delivery failed: {error}"
            );
            self.telemetry.record_delivery_retry();
            result.retried += 1;
        }
    }

    fn queue_mut(&mut self, kind: ReportKind) -> &mut VecDeque<ReportEnvelope> {
        match kind {
            ReportKind::Posture => &mut self.posture,
            ReportKind::Sensor => &mut self.sensor,
        }
    }

    /// Discard everything still queued (at shutdown), counting each envelope
    /// as dropped. Returns how many were discarded.
    pub fn abandon_pending(&mut self) -> usize {
        let abandoned = self.pending();
        for _ in 0..abandoned {
            self.telemetry.record_report_dropped();
        }
        self.posture.clear();
        self.sensor.clear();
        abandoned
    }

    /// Envelopes waiting across both kinds.
    pub fn pending(&self) -> usize {
        self.posture.len() + self.sensor.len()
    }

    pub fn pending_for(&self, kind: ReportKind) -> usize {
        match kind {
            ReportKind::Posture => self.posture.len(),
            ReportKind::Sensor => self.sensor.len(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PostureState, SensorFault, Transition};
    use crate::report::envelope::{PosturePayload, SensorPayload};
    use crate::sampler::SensorSample;
    use crate::telemetry::create_shared_log;
    use chrono::Duration as ChronoDuration;
    use std::collections::VecDeque;
    use uuid::Uuid;

    /// Transport that replays scripted outcomes (default: success).
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: VecDeque<Result<(), DeliveryError>>,
        attempts: Vec<Uuid>,
        delivered: Vec<Uuid>,
    }

    impl ScriptedTransport {
        fn failing(times: usize) -> Self {
            Self {
                outcomes: (0..times).map(|_| Err(DeliveryError::Timeout)).collect(),
                ..Self::default()
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn deliver(&mut self, envelope: &ReportEnvelope) -> Result<(), DeliveryError> {
            self.attempts.push(envelope.id);
            let outcome = self.outcomes.pop_front().unwrap_or(Ok(()));
            if outcome.is_ok() {
                self.delivered.push(envelope.id);
            }
            outcome
        }
    }

    fn posture_envelope(value: i32) -> ReportEnvelope {
        let sample = SensorSample {
            timestamp: Utc::now(),
            posture_value: value,
            temperature: 22.0,
            humidity: 50.0,
            source_valid: true,
        };
        let transition = Transition {
            previous: PostureState::Normal,
            current: PostureState::Normal,
        };
        ReportEnvelope::posture(PosturePayload::new(&sample, transition), Utc::now())
    }

    fn sensor_envelope() -> ReportEnvelope {
        let fault = SensorFault {
            timestamp: Utc::now(),
            temperature: 40.0,
            humidity: 50.0,
            temperature_in_range: false,
            humidity_in_range: true,
        };
        ReportEnvelope::sensor(SensorPayload::Fault { fault }, Utc::now())
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(5000),
        }
    }

    fn ms(n: i64) -> ChronoDuration {
        ChronoDuration::milliseconds(n)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
        assert_eq!(p.backoff(4), Duration::from_millis(4000));
        assert_eq!(p.backoff(5), Duration::from_millis(5000));
        assert_eq!(p.backoff(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_delivers_in_enqueue_order_per_kind() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::default(),
            policy(),
            8,
            telemetry.clone(),
        );

        let ids: Vec<Uuid> = (0..4)
            .map(|i| {
                let e = posture_envelope(i);
                let id = e.id;
                d.enqueue(e);
                id
            })
            .collect();

        let result = d.flush(Utc::now());
        assert_eq!(result.delivered, 4);
        assert_eq!(result.pending, 0);
        assert_eq!(d.transport().delivered, ids);
        assert_eq!(telemetry.stats().reports_delivered, 4);
    }

    #[test]
    fn test_drop_after_max_attempts() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::failing(3),
            policy(),
            8,
            telemetry.clone(),
        );
        d.enqueue(posture_envelope(150));
        let t0 = Utc::now();

        let r1 = d.flush(t0);
        assert_eq!((r1.retried, r1.dropped, r1.pending), (1, 0, 1));

        // Backoff not yet elapsed: no attempt is made.
        let r = d.flush(t0 + ms(100));
        assert_eq!(r, DeliveryResult { pending: 1, ..Default::default() });
        assert_eq!(d.transport().attempts.len(), 1);

        let r2 = d.flush(t0 + ms(500));
        assert_eq!((r2.retried, r2.dropped), (1, 0));

        let r3 = d.flush(t0 + ms(1500));
        assert_eq!((r3.retried, r3.dropped, r3.pending), (0, 1, 0));

        assert_eq!(d.transport().attempts.len(), 3);
        assert_eq!(telemetry.stats().reports_dropped, 1);
        assert_eq!(telemetry.telemetry_losses(), 1);

        // Nothing left to attempt.
        d.flush(t0 + ms(60_000));
        assert_eq!(d.transport().attempts.len(), 3);
    }

    #[test]
    fn test_failed_head_blocks_its_kind_only() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::failing(1),
            policy(),
            8,
            telemetry,
        );

        let first = posture_envelope(1);
        let second = posture_envelope(2);
        let sensor = sensor_envelope();
        let (first_id, second_id, sensor_id) = (first.id, second.id, sensor.id);
        d.enqueue(first);
        d.enqueue(second);
        d.enqueue(sensor);

        let t0 = Utc::now();
        let r = d.flush(t0);
        // Posture head failed; the sensor kind still went out.
        assert_eq!((r.delivered, r.retried, r.pending), (1, 1, 2));
        assert_eq!(d.transport().delivered, vec![sensor_id]);

        d.flush(t0 + ms(500));
        assert_eq!(d.transport().delivered, vec![sensor_id, first_id, second_id]);
    }

    #[test]
    fn test_one_attempt_per_envelope_per_flush() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::failing(10),
            RetryPolicy {
                base_backoff: Duration::ZERO,
                ..policy()
            },
            8,
            telemetry,
        );
        let e = posture_envelope(1);
        let id = e.id;
        d.enqueue(e);

        d.flush(Utc::now());
        assert_eq!(d.transport().attempts, vec![id]);
    }

    #[test]
    fn test_overflow_displaces_oldest_and_counts_loss() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::default(),
            policy(),
            2,
            telemetry.clone(),
        );

        let a = posture_envelope(1);
        let b = posture_envelope(2);
        let c = posture_envelope(3);
        let (b_id, c_id) = (b.id, c.id);
        assert!(d.enqueue(a));
        assert!(d.enqueue(b));
        assert!(!d.enqueue(c));
        assert!(d.enqueue(sensor_envelope()));

        assert_eq!(d.pending_for(ReportKind::Posture), 2);
        assert_eq!(telemetry.stats().queue_overflows, 1);

        d.flush(Utc::now());
        assert_eq!(&d.transport().delivered[..2], &[b_id, c_id]);
    }

    #[test]
    fn test_serialization_error_drops_immediately() {
        let telemetry = create_shared_log();
        let mut transport = ScriptedTransport::default();
        transport
            .outcomes
            .push_back(Err(DeliveryError::Serialization("bad float".to_string())));
        let mut d = ReportDispatcher::new(transport, policy(), 8, telemetry.clone());
        d.enqueue(posture_envelope(1));

        let r = d.flush(Utc::now());
        assert_eq!(r.dropped, 1);
        assert_eq!(telemetry.stats().reports_dropped, 1);
    }

    #[test]
    fn test_never_exceeds_attempt_cap() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::failing(1000),
            policy(),
            64,
            telemetry.clone(),
        );
        for i in 0..10 {
            d.enqueue(posture_envelope(i));
        }

        let mut now = Utc::now();
        for _ in 0..200 {
            d.flush(now);
            now = now + ms(5000);
        }

        let attempts = &d.transport().attempts;
        for id in attempts {
            assert!(attempts.iter().filter(|a| *a == id).count() <= 3);
        }
        assert_eq!(attempts.len(), 30);
        assert_eq!(telemetry.stats().reports_dropped, 10);
    }

    #[test]
    fn test_abandon_pending_counts_losses() {
        let telemetry = create_shared_log();
        let mut d = ReportDispatcher::new(
            ScriptedTransport::failing(1),
            policy(),
            8,
            telemetry.clone(),
        );
        d.enqueue(posture_envelope(1));
        d.enqueue(sensor_envelope());
        d.flush(Utc::now());

        assert_eq!(d.abandon_pending(), 1);
        assert_eq!(d.pending(), 0);
        assert_eq!(telemetry.stats().reports_dropped, 1);
        assert_eq!(telemetry.telemetry_losses(), 1);
    }
}
