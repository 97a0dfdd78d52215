//! The reporting task.
//!
//! The sampling side hands envelopes over through a bounded channel via
//! [`ReportSink`]; a dedicated thread running [`Reporter`] owns the
//! [`ReportDispatcher`] and flushes it once per report interval, so a slow
//! network never delays a sample.

use super::task::{PeriodicTask, TaskPriority};
use crate::report::{DeliveryResult, ReportDispatcher, ReportEnvelope, Transport};
use crate::telemetry::SharedTelemetryLog;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Non-blocking producer side of the report handoff.
#[derive(Clone)]
pub struct ReportSink {
    sender: Sender<ReportEnvelope>,
    telemetry: SharedTelemetryLog,
}

impl ReportSink {
    pub fn new(sender: Sender<ReportEnvelope>, telemetry: SharedTelemetryLog) -> Self {
        Self { sender, telemetry }
    }

    /// Hand an envelope to the reporter. Never blocks.
    ///
    /// A full or closed handoff loses the envelope; the loss is counted.
    pub fn submit(&self, envelope: ReportEnvelope) -> bool {
        let kind = envelope.kind();
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.telemetry.record_report_enqueued();
                true
            }
            Err(TrySendError::Full(lost)) => {
                tracing::warn!(envelope = %lost.id, %kind, "Report handoff full, envelope lost");
                self.telemetry.record_queue_overflow();
                false
            }
            Err(TrySendError::Disconnected(lost)) => {
                tracing::warn!(envelope = %lost.id, %kind, "Reporter gone, envelope lost");
                self.telemetry.record_report_dropped();
                false
            }
        }
    }

    pub fn telemetry(&self) -> &SharedTelemetryLog {
        &self.telemetry
    }

    /// Envelopes waiting in the handoff.
    pub fn backlog(&self) -> usize {
        self.sender.len()
    }
}

/// Consumer side: owns the dispatcher.
pub struct Reporter<T> {
    dispatcher: ReportDispatcher<T>,
    inbox: Receiver<ReportEnvelope>,
    task: PeriodicTask,
}

impl<T: Transport> Reporter<T> {
    pub fn new(
        dispatcher: ReportDispatcher<T>,
        inbox: Receiver<ReportEnvelope>,
        period: Duration,
        level: u8,
    ) -> Self {
        Self {
            dispatcher,
            inbox,
            task: PeriodicTask::new("report", TaskPriority::Medium, level, period, Instant::now()),
        }
    }

    /// Move everything waiting in the handoff into the dispatcher and run
    /// one flush.
    pub fn pump(&mut self) -> DeliveryResult {
        self.drain_inbox();
        self.dispatcher.flush(Utc::now())
    }

    /// Run until every [`ReportSink`] is dropped, then make a final flush.
    ///
    /// Returns the dispatcher so callers can inspect what was left.
    pub fn run(mut self) -> ReportDispatcher<T> {
        tracing::info!(
            period_ms = self.task.period().as_millis() as u64,
            priority = self.task.level(),
            "Reporter started"
        );

        loop {
            let wait = self.task.time_until_due(Instant::now());
            match self.inbox.recv_timeout(wait) {
                Ok(envelope) => {
                    self.dispatcher.enqueue(envelope);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if self.task.is_due(now) {
                let result = self.pump();
                self.task.complete(now, now.elapsed());
                if result.delivered + result.dropped > 0 {
                    tracing::debug!(
                        delivered = result.delivered,
                        retried = result.retried,
                        dropped = result.dropped,
                        pending = result.pending,
                        "Report flush"
                    );
                }
            }
        }

        let result = self.pump();
        let abandoned = self.dispatcher.abandon_pending();
        tracing::info!(
            delivered = result.delivered,
            abandoned,
            "Reporter stopped"
        );
        self.dispatcher
    }

    pub fn dispatcher(&self) -> &ReportDispatcher<T> {
        &self.dispatcher
    }

    pub fn task(&self) -> &PeriodicTask {
        &self.task
    }

    fn drain_inbox(&mut self) {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.dispatcher.enqueue(envelope);
        }
    }
}

/// Start the reporter on its own thread.
pub fn spawn_reporter<T>(reporter: Reporter<T>) -> std::io::Result<JoinHandle<ReportDispatcher<T>>>
where
    T: Transport + Send + 'static,
{
    std::thread::Builder::new()
        .name("reporter".to_string())
        .spawn(move || reporter.run())
}
