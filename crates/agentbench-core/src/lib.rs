//! AgentBench Core Library
//!
//! Scenario model, suite loading, check evaluation, heuristic tuning, the
//! quality gate, and run recording. Agent execution lives in
//! `agentbench-harness`.

pub mod config;
pub mod domain;
pub mod evaluator;
pub mod gate;
pub mod metrics;
pub mod obs;
pub mod recording;
pub mod reporting;
pub mod store;
pub mod telemetry;
pub mod tuner;

pub use config::HarnessConfig;

pub use domain::{
    new_run_id, score_ratio, BenchError, Check, CheckFailure, CheckKind, CheckScope,
    FailureKind, GateInputError, LoopResult, LoopSummary, Result, RunStatus, RunSummary,
    Scenario, ScenarioResult, ScenarioStatus, ScoringMode, StepMarkers, Suite, TunableError,
    TunableValue, Tunables, Turn, TurnRecord, ValidationError,
};

pub use evaluator::{evaluate, CheckEvaluator, CheckTally, Evaluation};

pub use gate::{
    decide, decide_from_path, GateDecision, GateRule, GateThresholds, Violation, EXIT_FAIL,
    EXIT_INPUT_ERROR, EXIT_PASS,
};

pub use metrics::METRICS;
pub use recording::RunRecorder;
pub use reporting::{append_leaderboard_row, LeaderboardRow};
pub use store::{load, load_path, load_str, SuiteSource};
pub use telemetry::init_tracing;

pub use tuner::{
    failure_signatures, Adjustment, AppliedAdjustment, FailureSignature, HeuristicTuner,
    ParameterChange, TuningOutcome,
};
