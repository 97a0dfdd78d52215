//! User-facing alerts.
//!
//! The agent only speaks in [`AlertCommand`]s. [`AlertCommand::pattern`] maps
//! each command to the buzzer tone, LED colour and display text the node
//! should show; an [`AlertActuator`] implementation drives the hardware.

use crate::core::PostureState;
use serde::{Deserialize, Serialize};

/// Buzzer frequency for urgent alerts (Hz).
pub const BUZZER_FREQ_HIGH: u32 = 2000;
/// Buzzer frequency for soft alerts (Hz).
pub const BUZZER_FREQ_LOW: u32 = 1000;

pub const LED_COLOR_RED: u32 = 0xFF0000;
pub const LED_COLOR_GREEN: u32 = 0x00FF00;
pub const LED_COLOR_BLUE: u32 = 0x0000FF;

/// Buzzer setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuzzerTone {
    Silent,
    Low,
    High,
}

impl BuzzerTone {
    pub fn frequency_hz(&self) -> Option<u32> {
        match self {
            BuzzerTone::Silent => None,
            BuzzerTone::Low => Some(BUZZER_FREQ_LOW),
            BuzzerTone::High => Some(BUZZER_FREQ_HIGH),
        }
    }
}

/// Peripheral action for one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPattern {
    pub tone: BuzzerTone,
    pub beeps: u8,
    /// 0xRRGGBB
    pub led_color: u32,
    pub text: String,
}

/// High-level "notify the user" commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AlertCommand {
    BreakDue,
    BreakEscalated { count: u32 },
    BreakAcknowledged { next_break_mins: u32 },
    PostureWarning,
    PostureAnomaly,
    PostureRecovered,
    SensorFault { detail: String },
    /// Periodic fault/loss counters for operator visibility
    Status { line: String, degraded: bool },
}

impl AlertCommand {
    /// Alert for a posture state entered from a different one.
    pub fn for_posture(state: PostureState) -> Self {
        match state {
            PostureState::Normal => AlertCommand::PostureRecovered,
            PostureState::Warning => AlertCommand::PostureWarning,
            PostureState::Anomaly => AlertCommand::PostureAnomaly,
        }
    }

    /// Map the command to a peripheral pattern.
    pub fn pattern(&self) -> AlertPattern {
        match self {
            AlertCommand::BreakDue => AlertPattern {
                tone: BuzzerTone::Low,
                beeps: 2,
                led_color: LED_COLOR_BLUE,
                text: "Time for a break".to_string(),
            },
            AlertCommand::BreakEscalated { count } => AlertPattern {
                tone: BuzzerTone::High,
                // Gets more insistent, capped so the buzzer stays bearable.
                beeps: (2 + *count).min(6) as u8,
                led_color: LED_COLOR_RED,
                text: format!("Break overdue (x{count})"),
            },
            AlertCommand::BreakAcknowledged { next_break_mins } => AlertPattern {
                tone: BuzzerTone::Silent,
                beeps: 0,
                led_color: LED_COLOR_GREEN,
                text: format!("Next break in {next_break_mins} min"),
            },
            AlertCommand::PostureWarning => AlertPattern {
                tone: BuzzerTone::Low,
                beeps: 1,
                led_color: LED_COLOR_BLUE,
                text: "Check your posture".to_string(),
            },
            AlertCommand::PostureAnomaly => AlertPattern {
                tone: BuzzerTone::High,
                beeps: 3,
                led_color: LED_COLOR_RED,
                text: "Sit up straight".to_string(),
            },
            AlertCommand::PostureRecovered => AlertPattern {
                tone: BuzzerTone::Silent,
                beeps: 0,
                led_color: LED_COLOR_GREEN,
                text: "Posture OK".to_string(),
            },
            AlertCommand::SensorFault { detail } => AlertPattern {
                tone: BuzzerTone::Silent,
                beeps: 0,
                led_color: LED_COLOR_RED,
                text: format!("Sensor {detail}"),
            },
            AlertCommand::Status { line, degraded } => AlertPattern {
                tone: BuzzerTone::Silent,
                beeps: 0,
                led_color: if *degraded { LED_COLOR_RED } else { LED_COLOR_GREEN },
                text: line.clone(),
            },
        }
    }
}

/// Peripheral side of alerting, implemented by the firmware.
pub trait AlertActuator {
    /// Drive buzzer and LED (and show the pattern's text).
    fn notify(&mut self, pattern: &AlertPattern);

    /// Show text without sounding anything.
    fn render(&mut self, text: &str);

    /// Dispatch a command: status lines are rendered, everything else notifies.
    fn alert(&mut self, command: &AlertCommand) {
        match command {
            AlertCommand::Status { line, .. } => self.render(line),
            other => self.notify(&other.pattern()),
        }
    }
}

impl<A: AlertActuator + ?Sized> AlertActuator for Box<A> {
    fn notify(&mut self, pattern: &AlertPattern) {
        (**self).notify(pattern)
    }

    fn render(&mut self, text: &str) {
        (**self).render(text)
    }
}

/// Actuator that writes alerts to the log, for hosts without peripherals.
#[derive(Debug, Default)]
pub struct LogActuator;

impl AlertActuator for LogActuator {
    fn notify(&mut self, pattern: &AlertPattern) {
        tracing::info!(
            tone_hz = pattern.tone.frequency_hz().unwrap_or(0),
            beeps = pattern.beeps,
            led = %format!("#{:06X}", pattern.led_color),
            "[ALERT] {}",
            pattern.text
        );
    }

    fn render(&mut self, text: &str) {
        tracing::info!("[DISPLAY] {text}");
    }
}
