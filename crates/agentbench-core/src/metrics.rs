//! Process-wide benchmark counters.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`] at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no locking.
pub struct Metrics {
    turns_sent: AtomicU64,
    turn_timeouts: AtomicU64,
    scenarios_run: AtomicU64,
    adjustments_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            turns_sent: AtomicU64::new(0),
            turn_timeouts: AtomicU64::new(0),
            scenarios_run: AtomicU64::new(0),
            adjustments_applied: AtomicU64::new(0),
        }
    }

    /// Count one prompt sent to the agent (retries included).
    pub fn inc_turns_sent(&self) {
        self.turns_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turns_sent", "counter incremented");
    }

    pub fn inc_turn_timeouts(&self) {
        self.turn_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turn_timeouts", "counter incremented");
    }

    pub fn inc_scenarios_run(&self) {
        self.scenarios_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scenarios_run", "counter incremented");
    }

    pub fn add_adjustments_applied(&self, count: u64) {
        self.adjustments_applied.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "adjustments_applied", count, "counter incremented");
    }

    /// Emit all counters as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            turns_sent = self.turns_sent(),
            turn_timeouts = self.turn_timeouts(),
            scenarios_run = self.scenarios_run(),
            adjustments_applied = self.adjustments_applied(),
        );
    }

    pub fn turns_sent(&self) -> u64 {
        self.turns_sent.load(Ordering::Relaxed)
    }

    pub fn turn_timeouts(&self) -> u64 {
        self.turn_timeouts.load(Ordering::Relaxed)
    }

    pub fn scenarios_run(&self) -> u64 {
        self.scenarios_run.load(Ordering::Relaxed)
    }

    pub fn adjustments_applied(&self) -> u64 {
        self.adjustments_applied.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.turns_sent.store(0, Ordering::Relaxed);
        self.turn_timeouts.store(0, Ordering::Relaxed);
        self.scenarios_run.store(0, Ordering::Relaxed);
        self.adjustments_applied.store(0, Ordering::Relaxed);
    }
}
