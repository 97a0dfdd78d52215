//! Periodic task bookkeeping.
//!
//! A [`PeriodicTask`] knows when it is next due and how long an iteration
//! may take. Iterations that run past the budget count as deadline misses.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Priority tier of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

/// Execution statistics for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub runs: u64,
    pub deadline_misses: u64,
    pub worst_case_us: u64,
}

/// A task released every `period`.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: &'static str,
    priority: TaskPriority,
    /// Numeric tier from configuration, for logging
    level: u8,
    period: Duration,
    budget: Duration,
    next_due: Instant,
    stats: TaskStats,
}

impl PeriodicTask {
    /// Create a task that is due immediately, with a budget of one period.
    pub fn new(
        name: &'static str,
        priority: TaskPriority,
        level: u8,
        period: Duration,
        now: Instant,
    ) -> Self {
        Self {
            name,
            priority,
            level,
            period,
            budget: period,
            next_due: now,
            stats: TaskStats::default(),
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Time until the next release (zero if already due).
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Record one iteration that started at `now` and took `elapsed`.
    ///
    /// Releases stay on a fixed grid; releases missed while the loop
    /// was busy are skipped rather than run back to back.
    pub fn complete(&mut self, now: Instant, elapsed: Duration) {
        self.stats.runs += 1;
        self.stats.worst_case_us = self.stats.worst_case_us.max(elapsed.as_micros() as u64);

        if elapsed > self.budget {
            self.stats.deadline_misses += 1;
            tracing::warn!(
                task = self.name,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.budget.as_millis() as u64,
                "Task exceeded its budget"
            );
        }

        self.next_due += self.period;
        let finished = now + elapsed;
        if self.next_due <= finished {
            self.next_due = finished + self.period;
        }
    }
}
