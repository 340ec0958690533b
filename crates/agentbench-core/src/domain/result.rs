//! Scenario and loop result types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::check::CheckKind;
use crate::domain::tunables::Tunables;

/// How a scenario's checks translate into score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Full weight iff every check passes, otherwise zero.
    #[default]
    Binary,

    /// `weight * passed / total` for scenarios that did not error.
    Partial,
}

/// What produced a failure entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "type", content = "check", rename_all = "snake_case")]
pub enum FailureKind {
    /// A declarative check did not hold.
    Check(CheckKind),

    /// A check could not be evaluated (malformed configuration).
    Evaluation(CheckKind),

    /// The agent did not answer a turn in time.
    Timeout,

    /// The agent exited non-zero, crashed, or could not be spawned.
    AgentCrash,
}

/// One failed check (or synthetic turn failure) with its reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckFailure {
    /// Description of the failing check, or `turn N` for turn failures.
    pub check: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Terminal state of a scenario run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Ended early on timeout or agent failure.
    Errored,
}

/// Record of one turn exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub turn_index: usize,
    pub prompt: String,
    /// Cleaned agent output (empty when the turn failed).
    pub response: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Number of attempts made, including retries.
    pub attempts: u32,
}

/// Outcome of running one scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResult {
    pub scenario_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub weight: f64,
    pub status: ScenarioStatus,
    pub passed_checks: usize,
    pub total_checks: usize,
    pub check_failures: Vec<CheckFailure>,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    /// Whether every check passed and the scenario did not error.
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// Score for a scenario given its check tally.
    pub fn score_for(
        mode: ScoringMode,
        weight: f64,
        errored: bool,
        passed_checks: usize,
        total_checks: usize,
    ) -> f64 {
        if errored {
            return 0.0;
        }
        let all_passed = passed_checks == total_checks;
        match mode {
            ScoringMode::Binary if all_passed => weight,
            ScoringMode::Binary => 0.0,
            ScoringMode::Partial if total_checks == 0 => weight,
            ScoringMode::Partial => weight * passed_checks as f64 / total_checks as f64,
        }
    }
}

/// Aggregate result of one full pass through the suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopResult {
    /// 1-based loop number.
    pub loop_index: u32,
    pub scenario_results: Vec<ScenarioResult>,
    pub score: f64,
    pub max_score: f64,
    /// Percentage (0–100) of scenarios whose checks all passed.
    pub pass_rate: f64,
    pub passed_scenarios: usize,
    pub total_scenarios: usize,
    pub avg_duration_ms: u64,
    /// Tunables snapshot this loop ran with.
    pub tunables: Tunables,
}

impl LoopResult {
    /// Aggregate scenario results, preserving their order.
    pub fn aggregate(
        loop_index: u32,
        scenario_results: Vec<ScenarioResult>,
        tunables: Tunables,
    ) -> Self {
        let total = scenario_results.len();
        let score = scenario_results.iter().map(|r| r.score).sum();
        let max_score = scenario_results.iter().map(|r| r.max_score).sum();
        let passed = scenario_results.iter().filter(|r| r.passed()).count();
        let pass_rate = if total == 0 {
            0.0
        } else {
            100.0 * passed as f64 / total as f64
        };
        let avg_duration_ms = if total == 0 {
            0
        } else {
            scenario_results.iter().map(|r| r.duration_ms).sum::<u64>() / total as u64
        };
        Self {
            loop_index,
            scenario_results,
            score,
            max_score,
            pass_rate,
            passed_scenarios: passed,
            total_scenarios: total,
            avg_duration_ms,
            tunables,
        }
    }

    /// `score / max_score`, or 0 when `max_score` is 0.
    pub fn score_ratio(&self) -> f64 {
        score_ratio(self.score, self.max_score)
    }

    /// Scenarios that did not pass, in suite order.
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.scenario_results.iter().filter(|r| !r.passed())
    }
}

/// Ratio helper shared by the aggregator and the gate.
pub fn score_ratio(score: f64, max_score: f64) -> f64 {
    if max_score > 0.0 {
        (score / max_score).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
