//! Atomic telemetry counters shared between the agent's tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session (plus any loaded from disk).
#[derive(Debug)]
pub struct TelemetryLog {
    samples_taken: AtomicU64,
    sensor_unavailable: AtomicU64,
    sensor_faults: AtomicU64,
    posture_transitions: AtomicU64,
    reports_enqueued: AtomicU64,
    reports_delivered: AtomicU64,
    delivery_retries: AtomicU64,
    reports_dropped: AtomicU64,
    queue_overflows: AtomicU64,
    breaks_due: AtomicU64,
    breaks_acknowledged: AtomicU64,
    breaks_snoozed: AtomicU64,
    escalations: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self {
            samples_taken: AtomicU64::new(0),
            sensor_unavailable: AtomicU64::new(0),
            sensor_faults: AtomicU64::new(0),
            posture_transitions: AtomicU64::new(0),
            reports_enqueued: AtomicU64::new(0),
            reports_delivered: AtomicU64::new(0),
            delivery_retries: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            queue_overflows: AtomicU64::new(0),
            breaks_due: AtomicU64::new(0),
            breaks_acknowledged: AtomicU64::new(0),
            breaks_snoozed: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a telemetry log that loads from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous telemetry counters: {e}");
        }

        log
    }

    pub fn record_sample(&self) {
        self.samples_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_unavailable(&self) {
        self.sensor_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_fault(&self) {
        self.sensor_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_posture_transition(&self) {
        self.posture_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_enqueued(&self) {
        self.reports_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_delivered(&self) {
        self.reports_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_retry(&self) {
        self.delivery_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// An envelope exhausted its attempts.
    pub fn record_report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// An envelope was displaced by a full queue.
    pub fn record_queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_break_due(&self) {
        self.breaks_due.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_break_acknowledged(&self) {
        self.breaks_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_break_snoozed(&self) {
        self.breaks_snoozed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Reports that will never reach the API.
    pub fn telemetry_losses(&self) -> u64 {
        self.reports_dropped.load(Ordering::Relaxed) + self.queue_overflows.load(Ordering::Relaxed)
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            samples_taken: self.samples_taken.load(Ordering::Relaxed),
            sensor_unavailable: self.sensor_unavailable.load(Ordering::Relaxed),
            sensor_faults: self.sensor_faults.load(Ordering::Relaxed),
            posture_transitions: self.posture_transitions.load(Ordering::Relaxed),
            reports_enqueued: self.reports_enqueued.load(Ordering::Relaxed),
            reports_delivered: self.reports_delivered.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            breaks_due: self.breaks_due.load(Ordering::Relaxed),
            breaks_acknowledged: self.breaks_acknowledged.load(Ordering::Relaxed),
            breaks_snoozed: self.breaks_snoozed.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Samples taken: {}\n\
             - Sensor unavailable: {}\n\
             - Sensor faults: {}\n\
             - Posture transitions: {}\n\
             - Reports delivered: {} of {} ({} retries)\n\
             - Reports lost: {} dropped, {} overflowed\n\
             - Breaks: {} due, {} taken, {} snoozed, {} escalations\n\
             - Session duration: {} seconds",
            stats.samples_taken,
            stats.sensor_unavailable,
            stats.sensor_faults,
            stats.posture_transitions,
            stats.reports_delivered,
            stats.reports_enqueued,
            stats.delivery_retries,
            stats.reports_dropped,
            stats.queue_overflows,
            stats.breaks_due,
            stats.breaks_acknowledged,
            stats.breaks_snoozed,
            stats.escalations,
            stats.session_duration_secs
        )
    }

    /// One line for a small display.
    pub fn status_line(&self) -> String {
        let stats = self.stats();
        format!(
            "faults {} lost {} breaks {}/{}",
            stats.sensor_faults + stats.sensor_unavailable,
            stats.reports_dropped + stats.queue_overflows,
            stats.breaks_acknowledged,
            stats.breaks_due
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_taken: stats.samples_taken,
                sensor_unavailable: stats.sensor_unavailable,
                sensor_faults: stats.sensor_faults,
                posture_transitions: stats.posture_transitions,
                reports_enqueued: stats.reports_enqueued,
                reports_delivered: stats.reports_delivered,
                delivery_retries: stats.delivery_retries,
                reports_dropped: stats.reports_dropped,
                queue_overflows: stats.queue_overflows,
                breaks_due: stats.breaks_due,
                breaks_acknowledged: stats.breaks_acknowledged,
                breaks_snoozed: stats.breaks_snoozed,
                escalations: stats.escalations,
                last_updated: Some(Utc::now()),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                for (counter, value) in [
                    (&self.samples_taken, persisted.samples_taken),
                    (&self.sensor_unavailable, persisted.sensor_unavailable),
                    (&self.sensor_faults, persisted.sensor_faults),
                    (&self.posture_transitions, persisted.posture_transitions),
                    (&self.reports_enqueued, persisted.reports_enqueued),
                    (&self.reports_delivered, persisted.reports_delivered),
                    (&self.delivery_retries, persisted.delivery_retries),
                    (&self.reports_dropped, persisted.reports_dropped),
                    (&self.queue_overflows, persisted.queue_overflows),
                    (&self.breaks_due, persisted.breaks_due),
                    (&self.breaks_acknowledged, persisted.breaks_acknowledged),
                    (&self.breaks_snoozed, persisted.breaks_snoozed),
                    (&self.escalations, persisted.escalations),
                ] {
                    counter.store(value, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.samples_taken,
            &self.sensor_unavailable,
            &self.sensor_faults,
            &self.posture_transitions,
            &self.reports_enqueued,
            &self.reports_delivered,
            &self.delivery_retries,
            &self.reports_dropped,
            &self.queue_overflows,
            &self.breaks_due,
            &self.breaks_acknowledged,
            &self.breaks_snoozed,
            &self.escalations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of telemetry counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub samples_taken: u64,
    pub sensor_unavailable: u64,
    pub sensor_faults: u64,
    pub posture_transitions: u64,
    pub reports_enqueued: u64,
    pub reports_delivered: u64,
    pub delivery_retries: u64,
    pub reports_dropped: u64,
    pub queue_overflows: u64,
    pub breaks_due: u64,
    pub breaks_acknowledged: u64,
    pub breaks_snoozed: u64,
    pub escalations: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Counters kept across restarts. Missing keys (older files) load as zero.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PersistedStats {
    samples_taken: u64,
    sensor_unavailable: u64,
    sensor_faults: u64,
    posture_transitions: u64,
    reports_enqueued: u64,
    reports_delivered: u64,
    delivery_retries: u64,
    reports_dropped: u64,
    queue_overflows: u64,
    breaks_due: u64,
    breaks_acknowledged: u64,
    breaks_snoozed: u64,
    escalations: u64,
    last_updated: Option<DateTime<Utc>>,
}

/// Thread-safe shared telemetry log.
pub type SharedTelemetryLog = Arc<TelemetryLog>;

/// Create a new shared telemetry log.
pub fn create_shared_log() -> SharedTelemetryLog {
    Arc::new(TelemetryLog::new())
}

/// Create a new shared telemetry log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTelemetryLog {
    Arc::new(TelemetryLog::with_persistence(path))
}
