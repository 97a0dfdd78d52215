//! The agent loop.
//!
//! [`Agent`] owns the sampler, the classifier, the break scheduler and the
//! actuator, and drives them from two cooperative tasks on the calling
//! thread:
//!
//! - **sampling** (high priority): read, classify, feed the scheduler, hand
//!   reports to the reporter
//! - **housekeeping** (low priority): scheduler tick, commands, periodic
//!   telemetry surfacing
//!
//! The optional button is polled on its own short cadence. Reporting runs on
//! a separate thread (see [`super::reporter`]).

use super::button::{ButtonDebouncer, ButtonInput};
use super::reporter::ReportSink;
use super::status::{update_status, Command, SessionStats, SharedStatus};
use super::task::{PeriodicTask, TaskPriority, TaskStats};
use crate::alert::{AlertActuator, AlertCommand};
use crate::config::ValidatedConfig;
use crate::core::{
    posture_score, summarize, BreakEvent, BreakScheduler, Classification, EnvironmentReading,
    PostureState, SensorFault, ThresholdClassifier, Transition, WindowManager,
};
use crate::report::{PosturePayload, ReportEnvelope, SensorPayload};
use crate::sampler::{Peripheral, SensorSample, SensorSampler};
use crate::telemetry::SharedTelemetryLog;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest the loop sleeps before re-checking the running flag.
const MAX_IDLE: Duration = Duration::from_millis(100);

/// Builder for [`Agent`].
pub struct AgentBuilder<P, A> {
    config: ValidatedConfig,
    peripheral: P,
    actuator: A,
    status: Option<SharedStatus>,
    button: Option<Box<dyn ButtonInput>>,
    seed: Option<u64>,
}

impl<P: Peripheral, A: AlertActuator> AgentBuilder<P, A> {
    /// Publish a [`super::StatusSnapshot`] after every cycle.
    pub fn status(mut self, status: SharedStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Poll an acknowledgement button.
    pub fn button(mut self, button: impl ButtonInput + 'static) -> Self {
        self.button = Some(Box::new(button));
        self
    }

    /// Seed the break scheduler's random source.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self, sink: ReportSink, commands: Receiver<Command>) -> Agent<P, A> {
        let config = self.config;
        let now = Instant::now();
        let tasks = &config.tasks;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let button = self.button.map(|input| {
            (
                input,
                ButtonDebouncer::new(config.hardware.button_debounce),
            )
        });

        Agent {
            sampler: SensorSampler::new(self.peripheral, tasks.read_timeout),
            classifier: ThresholdClassifier::from_config(&config),
            scheduler: BreakScheduler::with_rng(&config.breaks, rng),
            windows: WindowManager::new(config.reporting.sensor_report_interval),
            actuator: self.actuator,
            telemetry: sink.telemetry().clone(),
            sink,
            commands,
            status: self.status,
            button,
            sampling: PeriodicTask::new(
                "sample",
                TaskPriority::High,
                tasks.priority_high,
                tasks.sample_interval,
                now,
            )
            .with_budget(tasks.sample_interval / 2),
            housekeeping: PeriodicTask::new(
                "housekeeping",
                TaskPriority::Low,
                tasks.priority_low,
                tasks.housekeeping_interval,
                now,
            ),
            button_poll: PeriodicTask::new(
                "button",
                TaskPriority::Low,
                tasks.priority_low,
                config.hardware.button_poll_interval,
                now,
            ),
            privacy: config.privacy_mode,
            last_sample: None,
            fault_active: false,
            last_posture_report: None,
            last_status_at: None,
            session: SessionStats::default(),
            surfaced_faults: 0,
            surfaced_losses: 0,
            stopping: false,
            config,
        }
    }
}

/// The posture coach engine.
pub struct Agent<P, A> {
    config: ValidatedConfig,
    sampler: SensorSampler<P>,
    classifier: ThresholdClassifier,
    scheduler: BreakScheduler<StdRng>,
    windows: WindowManager,
    actuator: A,
    telemetry: SharedTelemetryLog,
    sink: ReportSink,
    commands: Receiver<Command>,
    status: Option<SharedStatus>,
    button: Option<(Box<dyn ButtonInput>, ButtonDebouncer)>,
    sampling: PeriodicTask,
    housekeeping: PeriodicTask,
    button_poll: PeriodicTask,
    privacy: bool,
    last_sample: Option<SensorSample>,
    fault_active: bool,
    last_posture_report: Option<DateTime<Utc>>,
    last_status_at: Option<DateTime<Utc>>,
    session: SessionStats,
    surfaced_faults: u64,
    surfaced_losses: u64,
    stopping: bool,
}

impl<P: Peripheral, A: AlertActuator> Agent<P, A> {
    pub fn builder(config: ValidatedConfig, peripheral: P, actuator: A) -> AgentBuilder<P, A> {
        AgentBuilder {
            config,
            peripheral,
            actuator,
            status: None,
            button: None,
            seed: None,
        }
    }

    /// Run until `running` is cleared or a [`Command::Shutdown`] arrives.
    ///
    /// Due tasks run highest priority first. Between tasks the loop waits on
    /// the command channel, so commands are handled without waiting for the
    /// next housekeeping pass.
    pub fn run(&mut self, running: &AtomicBool) {
        tracing::info!(
            sample_ms = self.sampling.period().as_millis() as u64,
            housekeeping_ms = self.housekeeping.period().as_millis() as u64,
            button = self.button.is_some(),
            "Agent loop started"
        );

        while running.load(Ordering::SeqCst) && !self.stopping {
            let now = Instant::now();

            if self.sampling.is_due(now) {
                self.sample_cycle(Utc::now());
                self.sampling.complete(now, now.elapsed());
            }

            let now = Instant::now();
            if self.housekeeping.is_due(now) {
                self.housekeeping_cycle(Utc::now());
                self.housekeeping.complete(now, now.elapsed());
            }

            let now = Instant::now();
            if self.button.is_some() && self.button_poll.is_due(now) {
                self.poll_button(now, Utc::now());
                self.button_poll.complete(now, now.elapsed());
            }

            let wait = self.next_wait(Instant::now());
            match self.commands.recv_timeout(wait) {
                Ok(command) => self.handle_command(command, Utc::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Nobody can send commands any more; keep running on the timer.
                    std::thread::sleep(wait);
                }
            }
        }

        self.finish(Utc::now());
        tracing::info!(
            sample = ?self.sampling.stats(),
            housekeeping = ?self.housekeeping.stats(),
            "Agent loop stopped"
        );
    }

    /// One sampling iteration: read, classify and report.
    pub fn sample_cycle(&mut self, now: DateTime<Utc>) {
        let sample = match self.sampler.sample() {
            Ok(sample) => sample,
            Err(e) => {
                self.telemetry.record_sensor_unavailable();
                tracing::debug!(
                    failures = self.sampler.consecutive_failures(),
                    "Skipping cycle: {e}"
                );
                return;
            }
        };
        self.telemetry.record_sample();

        match self.classifier.classify(&sample) {
            Classification::Skipped => {
                tracing::debug!("Sample source not valid, skipped");
            }
            Classification::Fault(fault) => self.handle_fault(fault, now),
            Classification::EnvironmentOnly => {
                self.clear_fault();
                self.record_environment(&sample);
            }
            Classification::Posture(transition) => {
                self.clear_fault();
                self.record_environment(&sample);
                self.handle_posture(&sample, transition, now);
            }
        }

        self.windows.check_window_expiry(now);
        self.report_completed_windows(now);

        if sample.source_valid {
            self.last_sample = Some(sample);
        }
        self.publish_status(now);
    }

    /// One housekeeping iteration: commands, the break timer and telemetry.
    pub fn housekeeping_cycle(&mut self, now: DateTime<Utc>) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command, now);
        }

        if let Some(event) = self.scheduler.tick(now) {
            self.handle_break_event(event, now);
        }

        let status_due = self
            .last_status_at
            .map(|at| now - at >= chrono_duration(self.config.tasks.status_interval))
            .unwrap_or(true);
        if status_due {
            self.surface_telemetry(now);
        }

        self.publish_status(now);
    }

    /// Apply one operator command.
    pub fn handle_command(&mut self, command: Command, now: DateTime<Utc>) {
        tracing::debug!(?command, "Command received");
        match command {
            Command::Acknowledge => {
                if let Some(event) = self.scheduler.acknowledge(now) {
                    self.handle_break_event(event, now);
                }
            }
            Command::Snooze => {
                if let Some(event) = self.scheduler.snooze(now) {
                    self.handle_break_event(event, now);
                }
            }
            Command::SetPrivacy { enabled } => self.set_privacy(enabled),
            Command::TogglePrivacy => self.set_privacy(!self.privacy),
            Command::UpdateSettings { settings } => match settings.apply_to(&self.config) {
                Ok(config) => {
                    self.classifier.set_thresholds(config.thresholds.clone());
                    self.scheduler.reconfigure(&config.breaks);
                    if let Some(enabled) = settings.privacy_mode {
                        self.set_privacy(enabled);
                    }
                    self.config = config;
                    tracing::info!(?settings, "Settings updated");
                }
                Err(e) => tracing::warn!(?settings, "Settings rejected: {e}"),
            },
            Command::Shutdown => {
                tracing::info!("Shutdown requested");
                self.stopping = true;
            }
        }
        self.publish_status(now);
    }

    pub fn session(&self) -> SessionStats {
        self.session
    }

    /// Close the current environment window and report it.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.windows.flush();
        self.report_completed_windows(now);
    }

    pub fn posture_state(&self) -> PostureState {
        self.classifier.state()
    }

    pub fn scheduler(&self) -> &BreakScheduler<StdRng> {
        &self.scheduler
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn privacy_mode(&self) -> bool {
        self.privacy
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn task_stats(&self) -> [(&'static str, TaskStats); 3] {
        [
            (self.sampling.name(), self.sampling.stats()),
            (self.housekeeping.name(), self.housekeeping.stats()),
            (self.button_poll.name(), self.button_poll.stats()),
        ]
    }

    fn set_privacy(&mut self, enabled: bool) {
        if self.privacy != enabled {
            tracing::info!(enabled, "Privacy mode changed");
        }
        self.privacy = enabled;
    }

    fn handle_posture(&mut self, sample: &SensorSample, transition: Transition, now: DateTime<Utc>) {
        self.scheduler.observe(transition.current);
        self.session
            .record(posture_score(sample.posture_value, &self.config.thresholds));

        let heartbeat_due = self
            .last_posture_report
            .map(|at| now - at >= chrono_duration(self.config.reporting.posture_report_interval))
            .unwrap_or(true);

        if transition.changed() {
            self.telemetry.record_posture_transition();
            tracing::info!(
                from = %transition.previous,
                to = %transition.current,
                value = sample.posture_value,
                "Posture changed"
            );
            self.actuator.alert(&AlertCommand::for_posture(transition.current));
        }

        if transition.changed() || heartbeat_due {
            self.last_posture_report = Some(now);
            self.submit_posture(PosturePayload::new(sample, transition), now);
        }
    }

    fn handle_fault(&mut self, fault: SensorFault, now: DateTime<Utc>) {
        self.telemetry.record_sensor_fault();

        if !self.fault_active {
            self.fault_active = true;
            tracing::warn!("Sensor fault: {fault}");
            if self.scheduler.preempt_for_fault(now) {
                tracing::debug!("Pending break re-escalation deferred by fault");
            }
            self.actuator.alert(&AlertCommand::SensorFault {
                detail: fault.to_string(),
            });
        }

        if self.config.features.sensor_monitoring {
            self.sink
                .submit(ReportEnvelope::sensor(SensorPayload::Fault { fault }, now));
        }
    }

    fn clear_fault(&mut self) {
        if self.fault_active {
            self.fault_active = false;
            tracing::info!("Sensor readings back in range");
        }
    }

    fn record_environment(&mut self, sample: &SensorSample) {
        if self.config.features.sensor_monitoring {
            self.windows.process_reading(EnvironmentReading::from(sample));
        }
    }

    fn report_completed_windows(&mut self, now: DateTime<Utc>) {
        for window in self.windows.take_completed_windows() {
            if window.is_empty() {
                continue;
            }
            let summary = summarize(&window);
            tracing::debug!(
                readings = summary.sample_count,
                temperature = summary.temperature.mean,
                humidity = summary.humidity.mean,
                "Environment window complete"
            );
            self.sink.submit(ReportEnvelope::sensor(
                SensorPayload::Summary {
                    window_start: window.start,
                    window_end: window.end,
                    summary,
                },
                now,
            ));
        }
    }

    fn handle_break_event(&mut self, event: BreakEvent, now: DateTime<Utc>) {
        let command = match event {
            BreakEvent::Armed { interval_secs } => {
                tracing::info!(interval_secs, "Break timer armed");
                None
            }
            BreakEvent::Due { .. } => {
                self.telemetry.record_break_due();
                tracing::info!("Break due");
                Some(AlertCommand::BreakDue)
            }
            BreakEvent::Escalated { count, .. } => {
                self.telemetry.record_escalation();
                tracing::info!(count, "Break still not taken");
                Some(AlertCommand::BreakEscalated { count })
            }
            BreakEvent::Acknowledged { next_interval_secs } => {
                self.telemetry.record_break_acknowledged();
                tracing::info!(next_interval_secs, "Break taken");
                Some(AlertCommand::BreakAcknowledged {
                    next_break_mins: (next_interval_secs + 59) / 60,
                })
            }
            BreakEvent::Snoozed { remaining_secs } => {
                self.telemetry.record_break_snoozed();
                tracing::info!(remaining_secs, "Break snoozed");
                None
            }
        };

        if let Some(command) = command {
            self.actuator.alert(&command);
        }

        if matches!(event, BreakEvent::Due { .. } | BreakEvent::Acknowledged { .. }) {
            if let Some(sample) = self.last_sample {
                let state = self.classifier.state();
                let transition = Transition {
                    previous: state,
                    current: state,
                };
                self.submit_posture(
                    PosturePayload::new(&sample, transition).with_break_event(event),
                    now,
                );
            }
        }
    }

    fn submit_posture(&mut self, payload: PosturePayload, now: DateTime<Utc>) {
        if self.privacy {
            tracing::debug!("Privacy mode on, posture report suppressed");
            return;
        }
        self.sink.submit(ReportEnvelope::posture(payload, now));
    }

    fn surface_telemetry(&mut self, now: DateTime<Utc>) {
        self.last_status_at = Some(now);

        let stats = self.telemetry.stats();
        let losses = self.telemetry.telemetry_losses();
        let degraded = stats.sensor_faults > self.surfaced_faults || losses > self.surfaced_losses;
        if degraded {
            tracing::warn!(
                new_faults = stats.sensor_faults - self.surfaced_faults,
                new_losses = losses - self.surfaced_losses,
                "Telemetry degraded since last status"
            );
        }
        self.surfaced_faults = stats.sensor_faults;
        self.surfaced_losses = losses;

        self.actuator.alert(&AlertCommand::Status {
            line: self.telemetry.status_line(),
            degraded,
        });
    }

    fn poll_button(&mut self, now: Instant, utc: DateTime<Utc>) {
        let pressed = match self.button.as_mut() {
            Some((input, debouncer)) => {
                let level = input.is_pressed();
                debouncer.update(level, now)
            }
            None => false,
        };
        if pressed {
            self.handle_command(Command::Acknowledge, utc);
        }
    }

    fn next_wait(&self, now: Instant) -> Duration {
        let mut wait = self
            .sampling
            .time_until_due(now)
            .min(self.housekeeping.time_until_due(now));
        if self.button.is_some() {
            wait = wait.min(self.button_poll.time_until_due(now));
        }
        wait.min(MAX_IDLE)
    }

    fn publish_status(&self, now: DateTime<Utc>) {
        let Some(status) = self.status.as_ref() else {
            return;
        };
        update_status(status, |s| {
            s.posture_state = self.classifier.state();
            if let Some(sample) = self.last_sample {
                s.posture_value = Some(sample.posture_value);
                s.posture_score = Some(posture_score(
                    sample.posture_value,
                    &self.config.thresholds,
                ));
                s.temperature = Some(sample.temperature);
                s.humidity = Some(sample.humidity);
                s.sampled_at = Some(sample.timestamp);
            }
            s.session = self.session;
            s.sensor_fault = self.fault_active;
            s.break_state = self.scheduler.state();
            s.break_interval_secs = self.scheduler.timer().interval_seconds;
            s.break_remaining_secs = self.scheduler.remaining_secs();
            s.privacy_mode = self.privacy;
            s.pending_handoff = self.sink.backlog();
            s.stats = self.telemetry.stats();
            s.updated_at = now;
        });
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertPattern;
    use crate::config::{Config, SettingsUpdate};
    use crate::core::BreakState;
    use crate::report::{ReportKind, ReportPayload};
    use crate::runtime::status::{create_shared_status, read_status, StatusSnapshot};
    use crate::sampler::{PeripheralError, RawReading};
    use crate::telemetry::create_shared_log;
    use crossbeam_channel::Sender;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<RawReading, PeripheralError>>);

    impl Peripheral for Scripted {
        fn read(&mut self, _timeout: Duration) -> Result<RawReading, PeripheralError> {
            self.0.pop_front().unwrap_or(Err(PeripheralError::Timeout))
        }
    }

    #[derive(Default)]
    struct Recorder {
        notified: Vec<AlertPattern>,
        rendered: Vec<String>,
    }

    impl AlertActuator for Recorder {
        fn notify(&mut self, pattern: &AlertPattern) {
            self.notified.push(pattern.clone());
        }

        fn render(&mut self, text: &str) {
            self.rendered.push(text.to_string());
        }
    }

    fn reading(value: i32, temperature: f32) -> Result<RawReading, PeripheralError> {
        Ok(RawReading {
            posture_value: value,
            temperature,
            humidity: 50.0,
            subject_present: true,
        })
    }

    struct Harness {
        agent: Agent<Scripted, Recorder>,
        outbound: Receiver<ReportEnvelope>,
        commands: Sender<Command>,
        telemetry: SharedTelemetryLog,
    }

    fn harness(config: Config, readings: Vec<Result<RawReading, PeripheralError>>) -> Harness {
        let telemetry = create_shared_log();
        let (out_tx, outbound) = crossbeam_channel::bounded(64);
        let (commands, cmd_rx) = crossbeam_channel::unbounded();
        let agent = Agent::builder(
            config.validated().unwrap(),
            Scripted(readings.into()),
            Recorder::default(),
        )
        .seed(7)
        .build(ReportSink::new(out_tx, telemetry.clone()), cmd_rx);
        Harness {
            agent,
            outbound,
            commands,
            telemetry,
        }
    }

    fn drain(rx: &Receiver<ReportEnvelope>) -> Vec<ReportEnvelope> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_transitions_alert_and_report() {
        let readings = [50, 50, 150, 250, 250]
            .iter()
            .map(|v| reading(*v, 22.0))
            .collect();
        let mut h = harness(Config::default(), readings);
        let now = Utc::now();

        for i in 0..5 {
            h.agent.sample_cycle(now + chrono::Duration::seconds(i));
        }

        assert_eq!(h.agent.posture_state(), PostureState::Anomaly);
        assert_eq!(h.telemetry.stats().posture_transitions, 2);
        assert_eq!(h.agent.actuator().notified.len(), 2);

        // First sample (heartbeat) plus the two transitions.
        let posture: Vec<_> = drain(&h.outbound)
            .into_iter()
            .filter(|e| e.kind() == ReportKind::Posture)
            .collect();
        assert_eq!(posture.len(), 3);
    }

    #[test]
    fn test_unavailable_sensor_skips_cycle() {
        let mut h = harness(Config::default(), vec![Err(PeripheralError::Timeout)]);
        h.agent.sample_cycle(Utc::now());

        assert_eq!(h.telemetry.stats().sensor_unavailable, 1);
        assert_eq!(h.telemetry.stats().samples_taken, 0);
        assert!(drain(&h.outbound).is_empty());
    }

    #[test]
    fn test_fault_reported_and_alerted_once() {
        let mut h = harness(
            Config::default(),
            vec![reading(50, 40.0), reading(50, 41.0), reading(50, 22.0)],
        );
        let now = Utc::now();
        for i in 0..3 {
            h.agent.sample_cycle(now + chrono::Duration::seconds(i));
        }

        let faults = drain(&h.outbound)
            .into_iter()
            .filter(|e| {
                matches!(
                    e.payload,
                    ReportPayload::Sensor(SensorPayload::Fault { .. })
                )
            })
            .count();
        assert_eq!(faults, 2);
        assert_eq!(h.telemetry.stats().sensor_faults, 2);
        assert_eq!(h.agent.actuator().notified.len(), 1);
        assert_eq!(h.agent.posture_state(), PostureState::Normal);
    }

    #[test]
    fn test_privacy_mode_suppresses_posture_reports() {
        let mut h = harness(Config::default(), vec![reading(150, 22.0)]);
        h.commands.send(Command::SetPrivacy { enabled: true }).unwrap();
        h.agent.housekeeping_cycle(Utc::now());
        assert!(h.agent.privacy_mode());

        drain(&h.outbound);
        h.agent.sample_cycle(Utc::now());
        assert_eq!(h.agent.posture_state(), PostureState::Warning);
        assert!(drain(&h.outbound)
            .iter()
            .all(|e| e.kind() != ReportKind::Posture));
    }

    #[test]
    fn test_break_cycle_through_commands() {
        let mut config = Config::default();
        config.breaks.interval_min_minutes = 1;
        config.breaks.interval_max_minutes = 1;
        let mut h = harness(config, vec![reading(50, 22.0)]);
        let start = Utc::now();

        h.agent.sample_cycle(start);
        h.agent.housekeeping_cycle(start);
        assert_eq!(h.agent.scheduler().state(), BreakState::CountingDown);

        h.agent.housekeeping_cycle(start + chrono::Duration::seconds(61));
        assert_eq!(h.agent.scheduler().state(), BreakState::Due);
        assert_eq!(h.telemetry.stats().breaks_due, 1);

        drain(&h.outbound);
        h.agent
            .handle_command(Command::Acknowledge, start + chrono::Duration::seconds(70));
        assert_eq!(h.agent.scheduler().state(), BreakState::Acknowledged);
        assert_eq!(h.telemetry.stats().breaks_acknowledged, 1);

        let reports = drain(&h.outbound);
        assert!(reports.iter().any(|e| matches!(
            &e.payload,
            ReportPayload::Posture(p)
                if matches!(p.break_event, Some(BreakEvent::Acknowledged { .. }))
        )));
    }

    #[test]
    fn test_status_surfaced_and_published() {
        let status = create_shared_status(StatusSnapshot::new("dev", create_shared_log().stats()));
        let telemetry = create_shared_log();
        let (out_tx, _out_rx) = crossbeam_channel::bounded(8);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let mut agent = Agent::builder(
            Config::default().validated().unwrap(),
            Scripted(vec![reading(150, 22.0)].into()),
            Recorder::default(),
        )
        .status(status.clone())
        .seed(1)
        .build(ReportSink::new(out_tx, telemetry), cmd_rx);

        agent.sample_cycle(Utc::now());
        agent.housekeeping_cycle(Utc::now());

        assert_eq!(agent.actuator().rendered.len(), 1);
        let snapshot = read_status(&status);
        assert_eq!(snapshot.posture_state, PostureState::Warning);
        assert_eq!(snapshot.posture_value, Some(150));
        assert_eq!(snapshot.posture_score, Some(75));
        assert_eq!(snapshot.session.total, 1);
        assert_eq!(snapshot.break_state, BreakState::CountingDown);
    }

    #[test]
    fn test_settings_update_applies_only_when_valid() {
        let mut h = harness(Config::default(), vec![reading(150, 22.0), reading(150, 22.0)]);
        let now = Utc::now();

        h.agent.handle_command(
            Command::UpdateSettings {
                settings: SettingsUpdate {
                    posture_threshold: Some(160),
                    interval_min_minutes: Some(1),
                    interval_max_minutes: Some(2),
                    ..SettingsUpdate::default()
                },
            },
            now,
        );
        h.agent.sample_cycle(now);
        assert_eq!(h.agent.posture_state(), PostureState::Normal);
        h.agent.housekeeping_cycle(now);
        assert!((60..=120).contains(&h.agent.scheduler().timer().interval_seconds));

        // Inverted thresholds are rejected; the previous ones stay in force.
        h.agent.handle_command(
            Command::UpdateSettings {
                settings: SettingsUpdate {
                    anomaly_threshold: Some(100),
                    ..SettingsUpdate::default()
                },
            },
            now,
        );
        h.agent.sample_cycle(now);
        assert_eq!(h.agent.posture_state(), PostureState::Normal);
    }

    #[test]
    fn test_toggle_privacy() {
        let mut h = harness(Config::default(), Vec::new());
        h.agent.handle_command(Command::TogglePrivacy, Utc::now());
        assert!(h.agent.privacy_mode());
        h.agent.handle_command(Command::TogglePrivacy, Utc::now());
        assert!(!h.agent.privacy_mode());
    }

    #[test]
    fn test_shutdown_command_stops_loop() {
        let mut h = harness(Config::default(), Vec::new());
        h.commands.send(Command::Shutdown).unwrap();
        let running = AtomicBool::new(true);
        h.agent.run(&running);
        assert!(h.agent.is_stopping());
    }
}
