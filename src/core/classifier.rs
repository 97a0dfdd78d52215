//! Hysteresis-based posture classification.
//!
//! The classifier holds the previous [`PostureState`] plus the dwell and
//! debounce counters, so a single noisy sample can neither escalate to
//! Anomaly nor drop back to Normal.

use crate::config::{Config, EnvironmentConfig, ThresholdConfig};
use crate::sampler::SensorSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified posture state. Ordered by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    #[default]
    Normal,
    Warning,
    Anomaly,
}

impl std::fmt::Display for PostureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PostureState::Normal => "normal",
            PostureState::Warning => "warning",
            PostureState::Anomaly => "anomaly",
        };
        write!(f, "{name}")
    }
}

/// A state change (or hold) produced by one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub previous: PostureState,
    pub current: PostureState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// An environmental reading outside its configured range.
///
/// Reported, never classified as a posture anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorFault {
    pub timestamp: DateTime<Utc>,
    pub temperature: f32,
    pub humidity: f32,
    pub temperature_in_range: bool,
    pub humidity_in_range: bool,
}

impl std::fmt::Display for SensorFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.temperature_in_range {
            parts.push(format!("temperature {:.1}C", self.temperature));
        }
        if !self.humidity_in_range {
            parts.push(format!("humidity {:.1}%", self.humidity));
        }
        write!(f, "out of range: {}", parts.join(", "))
    }
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Posture was evaluated
    Posture(Transition),
    /// Environment in range, posture detection switched off
    EnvironmentOnly,
    /// Environment out of range; posture state untouched
    Fault(SensorFault),
    /// The sample's source was not valid; nothing evaluated
    Skipped,
}

/// Threshold classifier with hysteresis.
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    thresholds: ThresholdConfig,
    /// `None` disables the environmental range check
    environment: Option<EnvironmentConfig>,
    posture_enabled: bool,
    state: PostureState,
    /// Samples spent in Warning, including the one that entered it
    dwell: u32,
    /// Consecutive samples below the posture threshold
    below: u32,
}

impl ThresholdClassifier {
    /// Create a classifier with posture detection and range checking enabled.
    pub fn new(thresholds: ThresholdConfig, environment: EnvironmentConfig) -> Self {
        Self {
            thresholds,
            environment: Some(environment),
            posture_enabled: true,
            state: PostureState::Normal,
            dwell: 0,
            below: 0,
        }
    }

    /// Create a classifier honouring the feature switches.
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            environment: config
                .features
                .sensor_monitoring
                .then(|| config.environment.clone()),
            posture_enabled: config.features.posture_detection,
            state: PostureState::Normal,
            dwell: 0,
            below: 0,
        }
    }

    /// Current (sticky) state.
    pub fn state(&self) -> PostureState {
        self.state
    }

    /// Classify a sample against the previous state.
    pub fn classify(&mut self, sample: &SensorSample) -> Classification {
        if !sample.source_valid {
            return Classification::Skipped;
        }

        if let Some(ref env) = self.environment {
            let temperature_in_range = env.temperature_in_range(sample.temperature);
            let humidity_in_range = env.humidity_in_range(sample.humidity);
            if !(temperature_in_range && humidity_in_range) {
                return Classification::Fault(SensorFault {
                    timestamp: sample.timestamp,
                    temperature: sample.temperature,
                    humidity: sample.humidity,
                    temperature_in_range,
                    humidity_in_range,
                });
            }
        }

        if !self.posture_enabled {
            return Classification::EnvironmentOnly;
        }

        let previous = self.state;
        self.advance(sample.posture_value);
        Classification::Posture(Transition {
            previous,
            current: self.state,
        })
    }

    /// Adopt new thresholds. The state is kept; dwell and debounce restart.
    pub fn set_thresholds(&mut self, thresholds: ThresholdConfig) {
        self.thresholds = thresholds;
        self.dwell = 0;
        self.below = 0;
    }

    /// Forget history and return to Normal.
    pub fn reset(&mut self) {
        self.state = PostureState::Normal;
        self.dwell = 0;
        self.below = 0;
    }

    fn advance(&mut self, value: i32) {
        let posture = self.thresholds.posture_threshold;
        let anomaly = self.thresholds.anomaly_threshold;

        if value < posture {
            self.below += 1;
        } else {
            self.below = 0;
        }

        match self.state {
            PostureState::Normal => {
                // Entry from Normal always goes through Warning.
                if value > posture {
                    self.enter(PostureState::Warning);
                    self.dwell = 1;
                }
            }
            PostureState::Warning => {
                // Every sample that does not complete the recovery counts
                // toward the dwell, so hovering at the threshold escalates.
                if value > anomaly {
                    self.enter(PostureState::Anomaly);
                } else if self.below >= self.thresholds.debounce_samples {
                    self.enter(PostureState::Normal);
                } else {
                    self.dwell += 1;
                    if self.dwell >= self.thresholds.dwell_count {
                        self.enter(PostureState::Anomaly);
                    }
                }
            }
            PostureState::Anomaly => {
                if self.below >= self.thresholds.debounce_samples {
                    self.enter(PostureState::Normal);
                }
            }
        }
    }

    fn enter(&mut self, state: PostureState) {
        self.state = state;
        self.dwell = 0;
        self.below = 0;
    }
}

/// Dashboard score for a posture value: 100 at or below the posture
/// threshold, 50 at the anomaly threshold, 0 as far again beyond it.
pub fn posture_score(value: i32, thresholds: &ThresholdConfig) -> u8 {
    let posture = i64::from(thresholds.posture_threshold);
    let anomaly = i64::from(thresholds.anomaly_threshold);
    let value = i64::from(value);
    if value <= posture {
        return 100;
    }
    let span = (anomaly - posture).max(1);
    (100 - (value - posture) * 50 / span).clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ThresholdClassifier {
        ThresholdClassifier::new(ThresholdConfig::default(), EnvironmentConfig::default())
    }

    fn sample(value: i32) -> SensorSample {
        SensorSample {
            timestamp: Utc::now(),
            posture_value: value,
            temperature: 22.0,
            humidity: 50.0,
            source_valid: true,
        }
    }

    fn run(classifier: &mut ThresholdClassifier, values: &[i32]) -> Vec<PostureState> {
        values
            .iter()
            .map(|&v| match classifier.classify(&sample(v)) {
                Classification::Posture(t) => t.current,
                other => panic!("unexpected classification {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_reference_sequence() {
        let mut c = classifier();
        let states = run(&mut c, &[50, 50, 150, 250, 250]);
        assert_eq!(
            states,
            vec![
                PostureState::Normal,
                PostureState::Normal,
                PostureState::Warning,
                PostureState::Anomaly,
                PostureState::Anomaly,
            ]
        );
    }

    #[test]
    fn test_just_above_threshold_enters_warning() {
        let mut c = classifier();
        assert_eq!(run(&mut c, &[101]), vec![PostureState::Warning]);

        let mut c = classifier();
        assert_eq!(run(&mut c, &[100]), vec![PostureState::Normal]);
    }

    #[test]
    fn test_never_skips_warning_from_normal() {
        let mut c = classifier();
        assert_eq!(
            run(&mut c, &[500, 500]),
            vec![PostureState::Warning, PostureState::Anomaly]
        );
    }

    #[test]
    fn test_dwell_escalates_sustained_warning() {
        let mut c = classifier();
        // Enter Warning, then stay between thresholds until the dwell count.
        let states = run(&mut c, &[150, 150, 150, 150, 150]);
        assert_eq!(states[3], PostureState::Warning);
        assert_eq!(states[4], PostureState::Anomaly);
    }

    #[test]
    fn test_debounced_return_to_normal() {
        let mut c = classifier();
        run(&mut c, &[150, 250]);
        assert_eq!(c.state(), PostureState::Anomaly);

        let states = run(&mut c, &[50, 50, 50]);
        assert_eq!(
            states,
            vec![
                PostureState::Anomaly,
                PostureState::Anomaly,
                PostureState::Normal
            ]
        );
    }

    #[test]
    fn test_noise_resets_debounce() {
        let mut c = classifier();
        run(&mut c, &[150]);
        let states = run(&mut c, &[50, 50, 100]);
        assert!(states.iter().all(|s| *s == PostureState::Warning));

        let mut c = classifier();
        run(&mut c, &[150, 250]);
        let states = run(&mut c, &[50, 50, 100, 50, 50]);
        assert!(states.iter().all(|s| *s == PostureState::Anomaly));
        assert_eq!(run(&mut c, &[50]), vec![PostureState::Normal]);
    }

    #[test]
    fn test_hovering_at_threshold_escalates() {
        let mut c = classifier();
        run(&mut c, &[150]);
        let states = run(&mut c, &[50, 50, 100, 50]);
        assert_eq!(
            states,
            vec![
                PostureState::Warning,
                PostureState::Warning,
                PostureState::Warning,
                PostureState::Anomaly
            ]
        );

        // Sustained hovering never leaves Warning stuck.
        let mut c = classifier();
        run(&mut c, &[150]);
        for _ in 0..100 {
            run(&mut c, &[50, 50, 100]);
        }
        assert_ne!(c.state(), PostureState::Warning);
    }

    #[test]
    fn test_clean_recovery_beats_dwell() {
        let mut c = classifier();
        let states = run(&mut c, &[150, 50, 50, 50]);
        assert_eq!(states[3], PostureState::Normal);
    }

    #[test]
    fn test_out_of_range_temperature_is_fault() {
        let mut c = classifier();
        run(&mut c, &[150]);

        let mut hot = sample(250);
        hot.temperature = 40.0;
        match c.classify(&hot) {
            Classification::Fault(fault) => {
                assert!(!fault.temperature_in_range);
                assert!(fault.humidity_in_range);
                assert!(fault.to_string().contains("temperature"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
        // Posture state untouched by the faulty sample.
        assert_eq!(c.state(), PostureState::Warning);
    }

    #[test]
    fn test_invalid_source_is_skipped() {
        let mut c = classifier();
        let mut s = sample(300);
        s.source_valid = false;
        assert_eq!(c.classify(&s), Classification::Skipped);
        assert_eq!(c.state(), PostureState::Normal);
    }

    #[test]
    fn test_feature_switches() {
        let mut config = Config::default();
        config.features.sensor_monitoring = false;
        let mut c = ThresholdClassifier::from_config(&config);
        let mut hot = sample(150);
        hot.temperature = 40.0;
        assert!(matches!(c.classify(&hot), Classification::Posture(_)));

        let mut config = Config::default();
        config.features.posture_detection = false;
        let mut c = ThresholdClassifier::from_config(&config);
        assert_eq!(c.classify(&sample(300)), Classification::EnvironmentOnly);
    }

    #[test]
    fn test_sustained_low_values_converge_to_normal() {
        for start in [&[150][..], &[150, 250][..], &[150, 150, 150, 150, 150][..]] {
            let mut c = classifier();
            run(&mut c, start);
            run(&mut c, &[10, 99, 0]);
            assert_eq!(c.state(), PostureState::Normal);
        }
    }

    #[test]
    fn test_posture_score() {
        let t = ThresholdConfig::default();
        assert_eq!(posture_score(50, &t), 100);
        assert_eq!(posture_score(100, &t), 100);
        assert_eq!(posture_score(150, &t), 75);
        assert_eq!(posture_score(200, &t), 50);
        assert_eq!(posture_score(300, &t), 0);
        assert_eq!(posture_score(i32::MAX, &t), 0);
    }

    #[test]
    fn test_new_thresholds_keep_state() {
        let mut c = classifier();
        run(&mut c, &[150]);
        c.set_thresholds(ThresholdConfig {
            posture_threshold: 160,
            anomaly_threshold: 300,
            ..ThresholdConfig::default()
        });
        assert_eq!(c.state(), PostureState::Warning);
        assert_eq!(run(&mut c, &[250]), vec![PostureState::Warning]);
    }
}
