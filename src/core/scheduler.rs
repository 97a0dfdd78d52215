//! Adaptive break scheduling.
//!
//! The scheduler is a small state machine driven by [`BreakScheduler::tick`]:
//!
//! ```text
//!   Idle ──tick──▶ CountingDown ──remaining ≤ 0──▶ Due ──acknowledge──▶ Acknowledged ──tick──▶ Idle
//!                       ▲                           │ │
//!                       └──────────snooze───────────┘ └── grace elapsed: Escalated (repeats)
//! ```
//!
//! Each acknowledgement reseeds the interval from the posture observed during
//! the last cycle: poor posture shortens the next interval, good posture
//! lengthens it. The interval always stays within the configured bounds.

use crate::config::{BreakConfig, MAX_BREAK_MINUTES};
use crate::core::classifier::PostureState;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Break scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakState {
    Idle,
    CountingDown,
    Due,
    Acknowledged,
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BreakEvent {
    /// A new countdown started
    Armed { interval_secs: u32 },
    /// The countdown ran out
    Due { at: DateTime<Utc> },
    /// Still unacknowledged after another grace period
    Escalated { count: u32, at: DateTime<Utc> },
    /// The user took the break
    Acknowledged { next_interval_secs: u32 },
    /// The reminder was postponed
    Snoozed { remaining_secs: u32 },
}

/// The break timer. Only the scheduler mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakTimer {
    pub interval_seconds: u32,
    pub last_fired_at: Option<DateTime<Utc>>,
}

/// Break scheduler with adaptive interval reseeding.
pub struct BreakScheduler<R = StdRng> {
    timer: BreakTimer,
    state: BreakState,
    remaining: Duration,
    last_tick: Option<DateTime<Utc>>,
    /// Start of the current grace window while Due
    grace_started: Option<DateTime<Utc>>,
    escalations: u32,
    /// Worst posture observed since the last reseed
    worst_recent: Option<PostureState>,
    min_secs: u32,
    max_secs: u32,
    grace: Duration,
    snooze: Duration,
    rng: R,
}

impl BreakScheduler<StdRng> {
    /// Create a scheduler seeded from OS entropy.
    pub fn new(config: &BreakConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> BreakScheduler<R> {
    /// Create a scheduler with an explicit random source.
    pub fn with_rng(config: &BreakConfig, rng: R) -> Self {
        let mut scheduler = Self {
            timer: BreakTimer {
                interval_seconds: config.interval_min_secs(),
                last_fired_at: None,
            },
            state: BreakState::Idle,
            remaining: Duration::zero(),
            last_tick: None,
            grace_started: None,
            escalations: 0,
            worst_recent: None,
            min_secs: config.interval_min_secs(),
            max_secs: config.interval_max_secs(),
            grace: break_span(config.grace_period),
            snooze: break_span(config.snooze),
            rng,
        };
        scheduler.timer.interval_seconds = scheduler.draw_interval(None);
        scheduler
    }

    pub fn state(&self) -> BreakState {
        self.state
    }

    pub fn timer(&self) -> BreakTimer {
        self.timer
    }

    /// Seconds left on the countdown (zero unless counting down).
    pub fn remaining_secs(&self) -> i64 {
        match self.state {
            BreakState::CountingDown => self.remaining.num_seconds().max(0),
            _ => 0,
        }
    }

    /// Re-escalations since the break became due.
    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    /// Feed back a classified posture state.
    pub fn observe(&mut self, state: PostureState) {
        self.worst_recent = Some(match self.worst_recent {
            Some(worst) => worst.max(state),
            None => state,
        });
    }

    /// Advance the state machine to `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<BreakEvent> {
        let elapsed = match self.last_tick {
            Some(prev) if now > prev => now - prev,
            _ => Duration::zero(),
        };
        self.last_tick = Some(now);

        match self.state {
            BreakState::Idle => {
                self.remaining = Duration::seconds(self.timer.interval_seconds as i64);
                self.state = BreakState::CountingDown;
                Some(BreakEvent::Armed {
                    interval_secs: self.timer.interval_seconds,
                })
            }
            BreakState::CountingDown => {
                self.remaining = self.remaining - elapsed;
                if self.remaining <= Duration::zero() {
                    self.state = BreakState::Due;
                    self.timer.last_fired_at = Some(now);
                    self.grace_started = Some(now);
                    self.escalations = 0;
                    Some(BreakEvent::Due { at: now })
                } else {
                    None
                }
            }
            BreakState::Due => {
                let started = *self.grace_started.get_or_insert(now);
                if now - started >= self.grace {
                    self.escalations += 1;
                    self.grace_started = Some(now);
                    Some(BreakEvent::Escalated {
                        count: self.escalations,
                        at: now,
                    })
                } else {
                    None
                }
            }
            BreakState::Acknowledged => {
                self.state = BreakState::Idle;
                None
            }
        }
    }

    /// The user took a break.
    ///
    /// Accepted while Due, or while counting down (an early break restarts
    /// the cycle). Reseeds the interval from recent posture.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Option<BreakEvent> {
        match self.state {
            BreakState::Due | BreakState::CountingDown => {
                let recent = self.worst_recent.take();
                self.timer.interval_seconds = self.draw_interval(recent);
                self.state = BreakState::Acknowledged;
                self.grace_started = None;
                self.escalations = 0;
                self.remaining = Duration::zero();
                self.last_tick = Some(now);
                tracing::debug!(
                    ?recent,
                    next_interval_secs = self.timer.interval_seconds,
                    "Break acknowledged"
                );
                Some(BreakEvent::Acknowledged {
                    next_interval_secs: self.timer.interval_seconds,
                })
            }
            BreakState::Idle | BreakState::Acknowledged => None,
        }
    }

    /// Postpone a due break by the snooze period.
    pub fn snooze(&mut self, now: DateTime<Utc>) -> Option<BreakEvent> {
        if self.state != BreakState::Due {
            return None;
        }
        self.state = BreakState::CountingDown;
        self.remaining = self.snooze;
        self.grace_started = None;
        self.escalations = 0;
        self.last_tick = Some(now);
        Some(BreakEvent::Snoozed {
            remaining_secs: self.snooze.num_seconds().max(0) as u32,
        })
    }

    /// A fault takes over the actuator: restart the grace window so the
    /// pending re-escalation is deferred. Returns whether anything was
    /// pre-empted.
    pub fn preempt_for_fault(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == BreakState::Due {
            self.grace_started = Some(now);
            true
        } else {
            false
        }
    }

    /// Adopt new bounds and timing. A running countdown is cut short if it
    /// would now outlast the new maximum.
    pub fn reconfigure(&mut self, config: &BreakConfig) {
        self.min_secs = config.interval_min_secs();
        self.max_secs = config.interval_max_secs();
        self.grace = break_span(config.grace_period);
        self.snooze = break_span(config.snooze);
        self.timer.interval_seconds = self
            .timer
            .interval_seconds
            .clamp(self.min_secs, self.max_secs);
        self.remaining = self.remaining.min(Duration::seconds(i64::from(self.max_secs)));
    }

    fn draw_interval(&mut self, recent: Option<PostureState>) -> u32 {
        let (lo, hi) = match recent {
            Some(state) => interval_band(self.min_secs, self.max_secs, state),
            None => (self.min_secs, self.max_secs),
        };
        self.rng.gen_range(lo..=hi)
    }
}

/// Convert a configured span, clamped to the longest one validation accepts.
fn break_span(span: std::time::Duration) -> Duration {
    let longest = Duration::minutes(i64::from(MAX_BREAK_MINUTES));
    Duration::from_std(span).map_or(longest, |span| span.min(longest))
}

/// The slice of `[min, max]` an interval is drawn from after a cycle whose
/// worst posture was `state`.
pub fn interval_band(min: u32, max: u32, state: PostureState) -> (u32, u32) {
    let third = (max - min) / 3;
    match state {
        PostureState::Anomaly => (min, min + third),
        PostureState::Warning => (min + third, min + 2 * third),
        PostureState::Normal => (min + 2 * third, max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn config() -> BreakConfig {
        BreakConfig {
            interval_min_minutes: 5,
            interval_max_minutes: 30,
            grace_period: StdDuration::from_secs(120),
            snooze: StdDuration::from_secs(300),
        }
    }

    fn scheduler(seed: u64) -> BreakScheduler<StdRng> {
        BreakScheduler::with_rng(&config(), StdRng::seed_from_u64(seed))
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    /// Tick until the break is due, returning the time it fired.
    fn run_until_due(s: &mut BreakScheduler<StdRng>, start: DateTime<Utc>) -> DateTime<Utc> {
        let mut now = start;
        assert!(matches!(s.tick(now), Some(BreakEvent::Armed { .. })));
        loop {
            now = now + secs(10);
            if let Some(BreakEvent::Due { at }) = s.tick(now) {
                return at;
            }
            assert!(now - start < secs(3600), "break never became due");
        }
    }

    #[test]
    fn test_initial_interval_in_bounds() {
        for seed in 0..50 {
            let s = scheduler(seed);
            let interval = s.timer().interval_seconds;
            assert!((300..=1800).contains(&interval));
            assert_eq!(s.state(), BreakState::Idle);
        }
    }

    #[test]
    fn test_countdown_reaches_due() {
        let mut s = scheduler(1);
        let start = Utc::now();
        let interval = s.timer().interval_seconds as i64;

        let fired = run_until_due(&mut s, start);
        assert_eq!(s.state(), BreakState::Due);
        assert!(fired - start >= secs(interval));
        assert!(fired - start < secs(interval + 10));
        assert_eq!(s.timer().last_fired_at, Some(fired));
    }

    #[test]
    fn test_acknowledge_cycle() {
        let mut s = scheduler(2);
        let start = Utc::now();
        let fired = run_until_due(&mut s, start);

        match s.acknowledge(fired + secs(5)) {
            Some(BreakEvent::Acknowledged { next_interval_secs }) => {
                assert!((300..=1800).contains(&next_interval_secs));
            }
            other => panic!("expected acknowledgement, got {other:?}"),
        }
        assert_eq!(s.state(), BreakState::Acknowledged);
        assert_eq!(s.tick(fired + secs(6)), None);
        assert_eq!(s.state(), BreakState::Idle);
        assert!(matches!(
            s.tick(fired + secs(7)),
            Some(BreakEvent::Armed { .. })
        ));
        assert_eq!(s.state(), BreakState::CountingDown);
    }

    #[test]
    fn test_escalates_each_grace_period() {
        let mut s = scheduler(3);
        let fired = run_until_due(&mut s, Utc::now());

        assert_eq!(s.tick(fired + secs(60)), None);
        assert_eq!(
            s.tick(fired + secs(120)),
            Some(BreakEvent::Escalated {
                count: 1,
                at: fired + secs(120)
            })
        );
        assert_eq!(s.tick(fired + secs(200)), None);
        assert!(matches!(
            s.tick(fired + secs(240)),
            Some(BreakEvent::Escalated { count: 2, .. })
        ));
    }

    #[test]
    fn test_huge_grace_never_escalates_without_elapsed_time() {
        let mut config = config();
        config.grace_period = StdDuration::from_secs(u64::MAX);
        config.snooze = StdDuration::from_secs(u64::MAX);
        let mut s = BreakScheduler::with_rng(&config, StdRng::seed_from_u64(8));
        let fired = run_until_due(&mut s, Utc::now());

        for _ in 0..3 {
            assert_eq!(s.tick(fired), None);
        }
        assert_eq!(s.tick(fired + secs(3600)), None);
        assert_eq!(
            s.snooze(fired),
            Some(BreakEvent::Snoozed {
                remaining_secs: 24 * 3600
            })
        );
    }

    #[test]
    fn test_fault_preempts_escalation() {
        let mut s = scheduler(4);
        let fired = run_until_due(&mut s, Utc::now());

        assert!(s.preempt_for_fault(fired + secs(100)));
        // Grace window restarted at +100s
        assert_eq!(s.tick(fired + secs(150)), None);
        assert!(matches!(
            s.tick(fired + secs(220)),
            Some(BreakEvent::Escalated { count: 1, .. })
        ));
    }

    #[test]
    fn test_snooze_restarts_countdown() {
        let mut s = scheduler(5);
        let fired = run_until_due(&mut s, Utc::now());
        let interval = s.timer().interval_seconds;

        assert_eq!(
            s.snooze(fired),
            Some(BreakEvent::Snoozed {
                remaining_secs: 300
            })
        );
        assert_eq!(s.state(), BreakState::CountingDown);
        assert_eq!(s.timer().interval_seconds, interval);
        assert_eq!(s.tick(fired + secs(299)), None);
        assert!(matches!(
            s.tick(fired + secs(300)),
            Some(BreakEvent::Due { .. })
        ));
    }

    #[test]
    fn test_snooze_and_acknowledge_ignored_when_idle() {
        let mut s = scheduler(6);
        let now = Utc::now();
        assert_eq!(s.snooze(now), None);
        assert_eq!(s.acknowledge(now), None);
        assert!(!s.preempt_for_fault(now));
    }

    #[test]
    fn test_adaptive_reseed_bands() {
        for seed in 0..100 {
            let mut s = scheduler(seed);
            let now = Utc::now();
            s.tick(now);
            s.observe(PostureState::Normal);
            s.observe(PostureState::Anomaly);
            s.observe(PostureState::Normal);
            let Some(BreakEvent::Acknowledged { next_interval_secs }) = s.acknowledge(now) else {
                panic!("acknowledge rejected");
            };
            assert!((300..=800).contains(&next_interval_secs));

            s.tick(now);
            s.tick(now);
            s.observe(PostureState::Normal);
            let Some(BreakEvent::Acknowledged { next_interval_secs }) = s.acknowledge(now) else {
                panic!("acknowledge rejected");
            };
            assert!((1300..=1800).contains(&next_interval_secs));
        }
    }

    #[test]
    fn test_interval_always_within_bounds_after_reseed() {
        let mut s = scheduler(42);
        let mut now = Utc::now();
        let states = [
            PostureState::Normal,
            PostureState::Warning,
            PostureState::Anomaly,
        ];
        for i in 0..300 {
            s.tick(now);
            s.tick(now);
            if i % 4 != 3 {
                s.observe(states[i % 3]);
            }
            s.acknowledge(now);
            let interval = s.timer().interval_seconds;
            assert!((300..=1800).contains(&interval), "interval {interval}");
            now = now + secs(1);
        }
    }

    #[test]
    fn test_reconfigure_keeps_interval_in_new_bounds() {
        let mut s = scheduler(11);
        let now = Utc::now();
        s.tick(now);

        let mut narrow = config();
        narrow.interval_min_minutes = 2;
        narrow.interval_max_minutes = 3;
        s.reconfigure(&narrow);

        assert!((120..=180).contains(&s.timer().interval_seconds));
        assert!(s.remaining_secs() <= 180);
        assert!(matches!(
            s.tick(now + secs(180)),
            Some(BreakEvent::Due { .. })
        ));
        for _ in 0..20 {
            s.acknowledge(now);
            assert!((120..=180).contains(&s.timer().interval_seconds));
            s.tick(now);
            s.tick(now);
        }
    }

    #[test]
    fn test_interval_band_edges() {
        assert_eq!(interval_band(300, 1800, PostureState::Anomaly), (300, 800));
        assert_eq!(interval_band(300, 1800, PostureState::Warning), (800, 1300));
        assert_eq!(interval_band(300, 1800, PostureState::Normal), (1300, 1800));
        assert_eq!(interval_band(600, 600, PostureState::Warning), (600, 600));
    }
}
