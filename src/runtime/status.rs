//! Shared status snapshot and operator commands.

use crate::config::SettingsUpdate;
use crate::core::{BreakState, PostureState};
use crate::telemetry::TelemetryStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Commands accepted by the agent loop (button, status API, signals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Take the pending break
    Acknowledge,
    /// Postpone the pending break
    Snooze,
    /// Suppress (or resume) posture reports
    SetPrivacy { enabled: bool },
    /// Flip privacy mode
    TogglePrivacy,
    /// Apply dashboard settings; rejected if the result does not validate
    UpdateSettings { settings: SettingsUpdate },
    /// Stop the agent loop
    Shutdown,
}

/// Posture score totals for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Samples scored since start
    pub total: u64,
    pub avg_score: f64,
}

impl SessionStats {
    pub fn record(&mut self, score: u8) {
        self.total += 1;
        self.avg_score += (f64::from(score) - self.avg_score) / self.total as f64;
    }
}

/// Point-in-time view of the agent, refreshed by the sampling task.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub device_id: String,
    pub posture_state: PostureState,
    pub posture_value: Option<i32>,
    pub posture_score: Option<u8>,
    pub session: SessionStats,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub sampled_at: Option<DateTime<Utc>>,
    pub sensor_fault: bool,
    pub break_state: BreakState,
    pub break_interval_secs: u32,
    pub break_remaining_secs: i64,
    pub privacy_mode: bool,
    pub pending_handoff: usize,
    pub stats: TelemetryStats,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(device_id: impl Into<String>, stats: TelemetryStats) -> Self {
        Self {
            device_id: device_id.into(),
            posture_state: PostureState::Normal,
            posture_value: None,
            posture_score: None,
            session: SessionStats::default(),
            temperature: None,
            humidity: None,
            sampled_at: None,
            sensor_fault: false,
            break_state: BreakState::Idle,
            break_interval_secs: 0,
            break_remaining_secs: 0,
            privacy_mode: false,
            pending_handoff: 0,
            stats,
            updated_at: Utc::now(),
        }
    }
}

pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

pub fn create_shared_status(snapshot: StatusSnapshot) -> SharedStatus {
    Arc::new(RwLock::new(snapshot))
}

/// Clone the current snapshot, tolerating a poisoned lock.
pub fn read_status(status: &SharedStatus) -> StatusSnapshot {
    match status.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Mutate the snapshot in place, tolerating a poisoned lock.
pub fn update_status(status: &SharedStatus, f: impl FnOnce(&mut StatusSnapshot)) {
    match status.write() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryLog;

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&Command::SetPrivacy { enabled: true }).unwrap();
        assert_eq!(json, r#"{"command":"set_privacy","enabled":true}"#);

        let parsed: Command = serde_json::from_str(r#"{"command":"snooze"}"#).unwrap();
        assert_eq!(parsed, Command::Snooze);

        let parsed: Command = serde_json::from_str(
            r#"{"command":"update_settings","settings":{"dwell_count":6}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            Command::UpdateSettings {
                settings: SettingsUpdate {
                    dwell_count: Some(6),
                    ..SettingsUpdate::default()
                }
            }
        );
    }

    #[test]
    fn test_session_average() {
        let mut session = SessionStats::default();
        for score in [100, 50, 75, 75] {
            session.record(score);
        }
        assert_eq!(session.total, 4);
        assert!((session.avg_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_and_read() {
        let status = create_shared_status(StatusSnapshot::new("dev", TelemetryLog::new().stats()));
        update_status(&status, |s| {
            s.posture_state = PostureState::Warning;
            s.posture_value = Some(150);
        });

        let snapshot = read_status(&status);
        assert_eq!(snapshot.posture_state, PostureState::Warning);
        assert_eq!(snapshot.posture_value, Some(150));
        assert_eq!(snapshot.device_id, "dev");
    }
}
