//! Structured observability hooks for benchmark lifecycle events.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it. [`run_span`] tags everything inside a run with its `run_id`.

use tracing::{info, warn};

use crate::gate::GateDecision;
use crate::tuner::AppliedAdjustment;

/// Span for everything inside one run.
///
/// ```ignore
/// run_benchmark().instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("agentbench.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, suite: &str, scenarios: usize, loops: u32) {
    info!(
        event = "bench.run_started",
        run_id = %run_id,
        suite = %suite,
        scenarios = scenarios,
        loops = loops,
    );
}

pub fn emit_scenario_finished(
    loop_index: u32,
    scenario_id: &str,
    status: &str,
    score: f64,
    max_score: f64,
    duration_ms: u64,
) {
    info!(
        event = "bench.scenario_finished",
        loop_index = loop_index,
        scenario_id = %scenario_id,
        status = %status,
        score = score,
        max_score = max_score,
        duration_ms = duration_ms,
    );
}

pub fn emit_loop_finished(loop_index: u32, score: f64, max_score: f64, pass_rate: f64) {
    info!(
        event = "bench.loop_finished",
        loop_index = loop_index,
        score = score,
        max_score = max_score,
        pass_rate = pass_rate,
    );
}

/// One event per applied or reverted adjustment.
pub fn emit_tuning_applied(loop_index: u32, adjustment: &AppliedAdjustment, reverted: bool) {
    info!(
        event = "bench.tuning_applied",
        loop_index = loop_index,
        adjustment = %adjustment.adjustment,
        signature = %adjustment.signature,
        changes = adjustment.changes.len(),
        reverted = reverted,
    );
}

pub fn emit_run_finished(run_id: &str, status: &str, loops: usize, duration_ms: u64) {
    info!(
        event = "bench.run_finished",
        run_id = %run_id,
        status = %status,
        loops = loops,
        duration_ms = duration_ms,
    );
}

pub fn emit_gate_decided(decision: &GateDecision) {
    info!(
        event = "gate.decided",
        loop_index = decision.loop_index,
        pass_rate = decision.pass_rate,
        score_ratio = decision.score_ratio,
        passed = decision.passed,
        exit_code = decision.exit_code,
    );
}

/// Delivery failures are logged, never escalated.
pub fn emit_delivery_failed(channel: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notify.delivery_failed", channel = %channel, error = %error);
}

/// Artifact write failures after the summary is safe on disk.
pub fn emit_artifact_error(path: &str, error: &dyn std::fmt::Display) {
    warn!(event = "bench.artifact_error", path = %path, error = %error);
}
