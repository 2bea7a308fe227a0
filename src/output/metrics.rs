//! Throughput and success-rate aggregation
//!
//! The aggregator is a pure fold over transition events: feeding it the same
//! events always yields the same counters, so a replayed log reproduces the
//! live numbers exactly. Only the active count and the cap come from the pool.

use crate::output::events::TransitionEvent;
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Point-in-time view of pool health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs currently in Fetching or Processing
    pub active: usize,
    /// Configured concurrency cap
    pub max_concurrency: usize,
    /// Jobs waiting for a slot
    pub queued: usize,
    /// Terminal jobs per minute over the sliding window
    pub throughput_per_minute: f64,
    /// Integer percentage of terminal jobs that succeeded; 0 when none finished
    pub success_rate: u8,
    pub succeeded: u64,
    pub failed: u64,
    /// Length of the throughput window in seconds
    pub window_secs: u64,
}

/// `round(100 * succeeded / (succeeded + failed))`, or 0 with no terminal jobs
pub fn success_rate(succeeded: u64, failed: u64) -> u8 {
    let total = succeeded + failed;
    if total == 0 {
        return 0;
    }
    // Integer round-half-up keeps replayed values bit-identical
    ((succeeded * 200 + total) / (2 * total)) as u8
}

/// Running counters derived from the transition stream
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    window: Duration,
    completions: VecDeque<DateTime<Utc>>,
    succeeded: u64,
    failed: u64,
}

impl MetricsAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            completions: VecDeque::new(),
            succeeded: 0,
            failed: 0,
        }
    }

    /// Rebuilds an aggregator from a recorded event log
    pub fn replay<'a, I>(events: I, window: Duration) -> Self
    where
        I: IntoIterator<Item = &'a TransitionEvent>,
    {
        let mut aggregator = Self::new(window);
        for event in events {
            aggregator.apply(event);
        }
        aggregator
    }

    /// Folds one transition into the counters
    pub fn apply(&mut self, event: &TransitionEvent) {
        match event.to {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            _ => return,
        }
        self.completions.push_back(event.at);
        self.prune(event.at);
    }

    /// Drops completions that fell out of the window as of `now`
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window_delta();
        while self.completions.front().is_some_and(|at| *at <= cutoff) {
            self.completions.pop_front();
        }
    }

    fn window_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::days(1))
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// `round(100 * succeeded / (succeeded + failed))`, or 0 with no terminal jobs
    pub fn success_rate(&self) -> u8 {
        success_rate(self.succeeded, self.failed)
    }

    /// Terminal jobs per minute inside the window ending at `now`
    pub fn throughput_at(&self, now: DateTime<Utc>) -> f64 {
        let cutoff = now - self.window_delta();
        let in_window = self
            .completions
            .iter()
            .filter(|at| **at > cutoff && **at <= now)
            .count();
        let window_secs = self.window.as_secs_f64();
        if window_secs <= 0.0 {
            return 0.0;
        }
        in_window as f64 * 60.0 / window_secs
    }

    pub fn snapshot_at(
        &self,
        now: DateTime<Utc>,
        active: usize,
        max_concurrency: usize,
        queued: usize,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            active,
            max_concurrency,
            queued,
            throughput_per_minute: self.throughput_at(now),
            success_rate: self.success_rate(),
            succeeded: self.succeeded,
            failed: self.failed,
            window_secs: self.window.as_secs(),
        }
    }

    /// Resets counters and the window
    pub fn clear(&mut self) {
        self.completions.clear();
        self.succeeded = 0;
        self.failed = 0;
    }
}
