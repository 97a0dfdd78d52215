//! Configuration for the Posture Coach Agent.
//!
//! The defaults mirror the calibration of the reference ESP32-CAM and
//! WEMOS D1 R1 nodes. A configuration is validated once at startup with
//! [`Config::validated`]; the resulting [`ValidatedConfig`] is immutable.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;

/// Longest break interval, grace period or snooze accepted (one day).
pub const MAX_BREAK_MINUTES: u32 = 24 * 60;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identity and remote API endpoints
    pub device: DeviceConfig,

    /// Posture classification thresholds
    pub thresholds: ThresholdConfig,

    /// In-range bounds for environmental readings
    pub environment: EnvironmentConfig,

    /// Break reminder timing
    pub breaks: BreakConfig,

    /// Delivery and retry policy for outbound reports
    pub reporting: ReportingConfig,

    /// Periodic task cadence and priority tiers
    pub tasks: TaskConfig,

    /// Feature switches
    pub features: FeatureConfig,

    /// Peripheral calibration
    pub hardware: HardwareConfig,

    /// Path for storing telemetry counters
    pub data_path: PathBuf,

    /// When set, posture reports are not sent to the remote API
    pub privacy_mode: bool,

    /// Verbose logging
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posture-coach");

        Self {
            device: DeviceConfig::default(),
            thresholds: ThresholdConfig::default(),
            environment: EnvironmentConfig::default(),
            breaks: BreakConfig::default(),
            reporting: ReportingConfig::default(),
            tasks: TaskConfig::default(),
            features: FeatureConfig::default(),
            hardware: HardwareConfig::default(),
            data_path: data_dir,
            privacy_mode: false,
            debug: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posture-coach")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Check every cross-field invariant the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.anomaly_threshold <= t.posture_threshold {
            return Err(ConfigError::invalid(
                "thresholds.anomaly_threshold",
                format!(
                    "must be greater than posture_threshold ({} <= {})",
                    t.anomaly_threshold, t.posture_threshold
                ),
            ));
        }
        if t.dwell_count == 0 {
            return Err(ConfigError::invalid("thresholds.dwell_count", "must be at least 1"));
        }
        if t.debounce_samples == 0 {
            return Err(ConfigError::invalid(
                "thresholds.debounce_samples",
                "must be at least 1",
            ));
        }
        // A clean recovery straight after entering Warning must complete
        // before the dwell count escalates it.
        if t.dwell_count <= t.debounce_samples {
            return Err(ConfigError::invalid(
                "thresholds.dwell_count",
                format!(
                    "must exceed debounce_samples ({} <= {})",
                    t.dwell_count, t.debounce_samples
                ),
            ));
        }

        let env = &self.environment;
        if !(env.temp_min < env.temp_max) {
            return Err(ConfigError::invalid(
                "environment.temp_min",
                format!("must be below temp_max ({} >= {})", env.temp_min, env.temp_max),
            ));
        }
        if !(env.humidity_min < env.humidity_max) {
            return Err(ConfigError::invalid(
                "environment.humidity_min",
                format!(
                    "must be below humidity_max ({} >= {})",
                    env.humidity_min, env.humidity_max
                ),
            ));
        }

        let b = &self.breaks;
        if b.interval_min_minutes == 0 {
            return Err(ConfigError::invalid(
                "breaks.interval_min_minutes",
                "must be at least 1",
            ));
        }
        if b.interval_min_minutes > b.interval_max_minutes {
            return Err(ConfigError::invalid(
                "breaks.interval_min_minutes",
                format!(
                    "must not exceed interval_max_minutes ({} > {})",
                    b.interval_min_minutes, b.interval_max_minutes
                ),
            ));
        }
        if b.interval_max_minutes > MAX_BREAK_MINUTES {
            return Err(ConfigError::invalid(
                "breaks.interval_max_minutes",
                format!("must not exceed {MAX_BREAK_MINUTES}"),
            ));
        }
        if b.grace_period.is_zero() {
            return Err(ConfigError::invalid("breaks.grace_period", "must be non-zero"));
        }
        let longest = Duration::from_secs(u64::from(MAX_BREAK_MINUTES) * 60);
        for (field, period) in [
            ("breaks.grace_period", b.grace_period),
            ("breaks.snooze", b.snooze),
        ] {
            if period > longest {
                return Err(ConfigError::invalid(
                    field,
                    format!("must not exceed {} seconds", longest.as_secs()),
                ));
            }
        }

        let r = &self.reporting;
        if r.max_attempts == 0 {
            return Err(ConfigError::invalid("reporting.max_attempts", "must be at least 1"));
        }
        if r.http_timeout.is_zero() {
            return Err(ConfigError::invalid("reporting.http_timeout", "must be non-zero"));
        }
        if r.base_backoff > r.http_timeout {
            return Err(ConfigError::invalid(
                "reporting.base_backoff",
                "must not exceed http_timeout",
            ));
        }
        if r.queue_capacity == 0 {
            return Err(ConfigError::invalid("reporting.queue_capacity", "must be at least 1"));
        }

        let tasks = &self.tasks;
        for (field, period) in [
            ("tasks.sample_interval", tasks.sample_interval),
            ("tasks.report_interval", tasks.report_interval),
            ("tasks.housekeeping_interval", tasks.housekeeping_interval),
            ("tasks.status_interval", tasks.status_interval),
        ] {
            if period.is_zero() {
                return Err(ConfigError::invalid(field, "must be non-zero"));
            }
        }
        if tasks.read_timeout >= tasks.sample_interval {
            return Err(ConfigError::invalid(
                "tasks.read_timeout",
                "must be shorter than sample_interval",
            ));
        }
        if tasks.handoff_capacity == 0 {
            return Err(ConfigError::invalid("tasks.handoff_capacity", "must be at least 1"));
        }

        let d = &self.device;
        if !(d.api_url.starts_with("http://") || d.api_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "device.api_url",
                format!("'{}' is not an http(s) URL", d.api_url),
            ));
        }
        for (field, path) in [
            ("device.posture_path", &d.posture_path),
            ("device.sensor_path", &d.sensor_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid(field, "must start with '/'"));
            }
        }
        if d.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::invalid(
                "device.timezone",
                format!("unknown timezone '{}'", d.timezone),
            ));
        }

        if !(self.hardware.echo_calibration_factor > 0.0) {
            return Err(ConfigError::invalid(
                "hardware.echo_calibration_factor",
                "must be positive",
            ));
        }

        Ok(())
    }

    /// Validate and freeze the configuration.
    pub fn validated(self) -> Result<ValidatedConfig, ConfigError> {
        self.validate()?;
        Ok(ValidatedConfig(self))
    }
}

/// A partial settings change from the dashboard. Unset fields keep their
/// current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posture_threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_samples: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_min_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_max_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_mode: Option<bool>,
}

impl SettingsUpdate {
    /// Merge onto `config` and validate the result as a whole.
    pub fn apply_to(&self, config: &Config) -> Result<ValidatedConfig, ConfigError> {
        let mut next = config.clone();
        let t = &mut next.thresholds;
        t.posture_threshold = self.posture_threshold.unwrap_or(t.posture_threshold);
        t.anomaly_threshold = self.anomaly_threshold.unwrap_or(t.anomaly_threshold);
        t.dwell_count = self.dwell_count.unwrap_or(t.dwell_count);
        t.debounce_samples = self.debounce_samples.unwrap_or(t.debounce_samples);

        let b = &mut next.breaks;
        b.interval_min_minutes = self.interval_min_minutes.unwrap_or(b.interval_min_minutes);
        b.interval_max_minutes = self.interval_max_minutes.unwrap_or(b.interval_max_minutes);

        next.privacy_mode = self.privacy_mode.unwrap_or(next.privacy_mode);
        next.validated()
    }
}

/// A configuration that passed [`Config::validate`]. Read-only.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(Config);

impl Deref for ValidatedConfig {
    type Target = Config;

    fn deref(&self) -> &Config {
        &self.0
    }
}

/// Device identity and remote API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Explicit device identifier; derived from the hostname when unset
    pub device_id: Option<String>,
    /// IANA timezone reported alongside every request
    pub timezone: String,
    /// Base URL of the remote API
    pub api_url: String,
    /// Path for posture detection reports
    pub posture_path: String,
    /// Path for environmental sensor reports
    pub sensor_path: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            timezone: "UTC".to_string(),
            api_url: "http://your.api.endpoint".to_string(),
            posture_path: "/posture/detect".to_string(),
            sensor_path: "/sensor/data".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Full URL for posture reports.
    pub fn posture_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), self.posture_path)
    }

    /// Full URL for sensor reports.
    pub fn sensor_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), self.sensor_path)
    }

    /// The configured device ID, or one generated from hostname + instance.
    pub fn resolve_device_id(&self) -> String {
        if let Some(ref id) = self.device_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!(
            "posture-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        )
    }
}

/// Posture classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Values above this leave Normal
    pub posture_threshold: i32,
    /// Values above this escalate Warning to Anomaly
    pub anomaly_threshold: i32,
    /// Samples spent in Warning before escalating to Anomaly
    pub dwell_count: u32,
    /// Consecutive samples below posture_threshold before returning to Normal
    pub debounce_samples: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            posture_threshold: 100,
            anomaly_threshold: 200,
            dwell_count: 5,
            debounce_samples: 3,
        }
    }
}

/// In-range bounds for environmental readings (inclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub temp_min: f32,
    pub temp_max: f32,
    pub humidity_min: f32,
    pub humidity_max: f32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            temp_min: 15.0,
            temp_max: 30.0,
            humidity_min: 20.0,
            humidity_max: 80.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn temperature_in_range(&self, celsius: f32) -> bool {
        celsius >= self.temp_min && celsius <= self.temp_max
    }

    pub fn humidity_in_range(&self, percent: f32) -> bool {
        percent >= self.humidity_min && percent <= self.humidity_max
    }
}

/// Break reminder timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakConfig {
    pub interval_min_minutes: u32,
    pub interval_max_minutes: u32,
    /// Time a Due reminder may go unacknowledged before re-escalating
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,
    /// Countdown restarted by a snooze
    #[serde(with = "duration_secs")]
    pub snooze: Duration,
}

impl Default for BreakConfig {
    fn default() -> Self {
        Self {
            interval_min_minutes: 5,
            interval_max_minutes: 30,
            grace_period: Duration::from_secs(120),
            snooze: Duration::from_secs(5 * 60),
        }
    }
}

impl BreakConfig {
    pub fn interval_min_secs(&self) -> u32 {
        self.interval_min_minutes.saturating_mul(60)
    }

    pub fn interval_max_secs(&self) -> u32 {
        self.interval_max_minutes.saturating_mul(60)
    }
}

/// Delivery and retry policy for outbound reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Per-request timeout; also the ceiling for retry backoff
    #[serde(with = "duration_millis")]
    pub http_timeout: Duration,
    /// Attempts per envelope before it is dropped
    pub max_attempts: u32,
    /// Backoff after the first failed attempt
    #[serde(with = "duration_millis")]
    pub base_backoff: Duration,
    /// Envelopes held per report kind
    pub queue_capacity: usize,
    /// Heartbeat period for posture reports while the state is unchanged
    #[serde(with = "duration_secs")]
    pub posture_report_interval: Duration,
    /// Batching period for environmental readings
    #[serde(with = "duration_secs")]
    pub sensor_report_interval: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_millis(5000),
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            queue_capacity: 64,
            posture_report_interval: Duration::from_secs(30),
            sensor_report_interval: Duration::from_secs(60),
        }
    }
}

/// Periodic task cadence and priority tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    #[serde(with = "duration_millis")]
    pub sample_interval: Duration,
    #[serde(with = "duration_millis")]
    pub report_interval: Duration,
    #[serde(with = "duration_millis")]
    pub housekeeping_interval: Duration,
    /// How often telemetry counters are surfaced to the actuator
    #[serde(with = "duration_secs")]
    pub status_interval: Duration,
    /// Upper bound on a single peripheral read
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
    /// Capacity of the sampling → reporting handoff queue
    pub handoff_capacity: usize,
    pub priority_high: u8,
    pub priority_medium: u8,
    pub priority_low: u8,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(1000),
            report_interval: Duration::from_millis(1000),
            housekeeping_interval: Duration::from_millis(250),
            status_interval: Duration::from_secs(300),
            read_timeout: Duration::from_millis(500),
            handoff_capacity: 128,
            priority_high: 5,
            priority_medium: 3,
            priority_low: 1,
        }
    }
}

/// Feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub posture_detection: bool,
    pub sensor_monitoring: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            posture_detection: true,
            sensor_monitoring: true,
        }
    }
}

/// Peripheral calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Speed of sound in cm/µs for the ultrasonic ranger
    pub echo_calibration_factor: f64,
    #[serde(with = "duration_millis")]
    pub button_poll_interval: Duration,
    #[serde(with = "duration_millis")]
    pub button_debounce: Duration,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            echo_calibration_factor: 0.0343,
            button_poll_interval: Duration::from_millis(50),
            button_debounce: Duration::from_millis(200),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    /// A value or combination of values the runtime cannot operate with
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid configuration: {field} {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
