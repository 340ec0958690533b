//! Observability tests for benchmark lifecycle tracing.

use agentbench_core::obs::{
    emit_artifact_error, emit_delivery_failed, emit_gate_decided, emit_loop_finished,
    emit_run_finished, emit_run_started, emit_scenario_finished, emit_tuning_applied, run_span,
};
use agentbench_core::{
    decide, Adjustment, AppliedAdjustment, FailureSignature, GateThresholds, LoopResult,
    RunSummary, Tunables, METRICS,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn run_lifecycle_events_are_logged() {
    let _span = run_span("run-obs-1").entered();
    emit_run_started("run-obs-1", "agent_tasks", 6, 2);
    emit_scenario_finished(1, "exact_reply", "passed", 10.0, 10.0, 42);
    emit_loop_finished(1, 10.0, 10.0, 100.0);
    emit_run_finished("run-obs-1", "completed", 1, 1234);

    assert!(logs_contain("bench.run_started"));
    assert!(logs_contain("bench.scenario_finished"));
    assert!(logs_contain("bench.loop_finished"));
    assert!(logs_contain("bench.run_finished"));
    assert!(logs_contain("run-obs-1"));
}

#[traced_test]
#[test]
fn tuning_and_gate_events_are_logged() {
    let applied = AppliedAdjustment {
        adjustment: Adjustment::EnableStepsHint,
        signature: FailureSignature::TooFewSteps,
        changes: Vec::new(),
        rationale: None,
    };
    emit_tuning_applied(1, &applied, false);
    assert!(logs_contain("bench.tuning_applied"));
    assert!(logs_contain("enable_steps_hint"));

    let mut summary = RunSummary::new("run-obs-2", "");
    summary.push_loop(&LoopResult::aggregate(1, Vec::new(), Tunables::new()));
    let decision = decide(&summary, GateThresholds::default()).expect("decide");
    emit_gate_decided(&decision);
    assert!(logs_contain("gate.decided"));
}

#[traced_test]
#[test]
fn failures_are_logged_as_warnings() {
    emit_delivery_failed("webhook", &"connection refused");
    emit_artifact_error("runs/x.loop1.md", &"disk full");
    assert!(logs_contain("notify.delivery_failed"));
    assert!(logs_contain("connection refused"));
    assert!(logs_contain("bench.artifact_error"));
}

#[traced_test]
#[test]
fn metrics_flush_emits_counters() {
    METRICS.inc_turns_sent();
    METRICS.flush();
    assert!(logs_contain("turns_sent"));
    assert!(logs_contain("adjustments_applied"));
}
