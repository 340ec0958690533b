//! Quality gate.
//!
//! Decides from a [`RunSummary`] whether the agent's current configuration
//! is good enough to promote. Only the final loop counts. The gate passes
//! iff the final loop meets both thresholds (`>=`).
//!
//! Exit codes: [`EXIT_PASS`] when the gate passes, [`EXIT_FAIL`] when a
//! threshold is missed, [`EXIT_INPUT_ERROR`] when the summary cannot be used.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{BenchError, GateInputError, LoopSummary, RunSummary};

pub const EXIT_PASS: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_INPUT_ERROR: i32 = 2;

/// Thresholds the final loop must meet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateThresholds {
    /// Minimum pass rate, as a percentage (0–100).
    pub min_pass_rate: f64,
    /// Minimum `score / max_score` (0–1).
    pub min_score_ratio: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_pass_rate: 70.0,
            min_score_ratio: 0.70,
        }
    }
}

impl GateThresholds {
    pub fn new(min_pass_rate: f64, min_score_ratio: f64) -> Self {
        Self {
            min_pass_rate,
            min_score_ratio,
        }
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if !(0.0..=100.0).contains(&self.min_pass_rate) {
            return Err(BenchError::InvalidConfig(format!(
                "min_pass_rate must be within 0..=100, got {}",
                self.min_pass_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.min_score_ratio) {
            return Err(BenchError::InvalidConfig(format!(
                "min_score_ratio must be within 0..=1, got {}",
                self.min_score_ratio
            )));
        }
        Ok(())
    }
}

/// A threshold the gate checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateRule {
    MinPassRate,
    MinScoreRatio,
}

/// A single missed threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub rule: GateRule,
    pub reason: String,
}

/// The gate decision for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecision {
    pub passed: bool,
    pub exit_code: i32,
    pub loop_index: u32,
    pub pass_rate: f64,
    pub score_ratio: f64,
    pub violations: Vec<Violation>,
}

/// Decide on the final loop of `summary`.
pub fn decide(
    summary: &RunSummary,
    thresholds: GateThresholds,
) -> Result<GateDecision, GateInputError> {
    let last = summary.latest().ok_or(GateInputError::NoLoops)?;
    check_consistent(last)?;
    let pass_rate = last.pass_rate;
    let score_ratio = last.score_ratio();

    // NaN never meets a threshold.
    let meets = |value: f64, min: f64| value >= min;

    let mut violations = Vec::new();
    if !meets(pass_rate, thresholds.min_pass_rate) {
        violations.push(Violation {
            rule: GateRule::MinPassRate,
            reason: format!(
                "pass rate {:.2}% < required {:.2}%",
                pass_rate, thresholds.min_pass_rate
            ),
        });
    }
    if !meets(score_ratio, thresholds.min_score_ratio) {
        violations.push(Violation {
            rule: GateRule::MinScoreRatio,
            reason: format!(
                "score ratio {:.3} < required {:.3} ({:.2}/{:.2})",
                score_ratio, thresholds.min_score_ratio, last.score, last.max_score
            ),
        });
    }

    let passed = violations.is_empty();
    Ok(GateDecision {
        passed,
        exit_code: if passed { EXIT_PASS } else { EXIT_FAIL },
        loop_index: last.loop_index,
        pass_rate,
        score_ratio,
        violations,
    })
}

/// Reject loop metrics a run could not have produced, so a hand-edited or
/// corrupted summary is an input error rather than a silent pass.
fn check_consistent(last: &LoopSummary) -> Result<(), GateInputError> {
    let inconsistent = |detail: String| {
        Err(GateInputError::Inconsistent(format!(
            "loop {}: {}",
            last.loop_index, detail
        )))
    };
    for (name, value) in [
        ("score", last.score),
        ("max_score", last.max_score),
        ("pass_rate", last.pass_rate),
    ] {
        if !value.is_finite() {
            return inconsistent(format!("{} is {}", name, value));
        }
    }
    if last.score < 0.0 || last.max_score < 0.0 {
        return inconsistent(format!(
            "negative score {}/{}",
            last.score, last.max_score
        ));
    }
    // Scores are sums of weights; allow for rounding in the last digits.
    let slack = 1e-9 * last.max_score.max(1.0);
    if last.score > last.max_score + slack {
        return inconsistent(format!(
            "score {} exceeds max_score {}",
            last.score, last.max_score
        ));
    }
    if !(0.0..=100.0).contains(&last.pass_rate) {
        return inconsistent(format!("pass_rate {} is outside 0..=100", last.pass_rate));
    }
    Ok(())
}

/// Read a summary file and decide on it.
pub fn decide_from_path(
    path: &Path,
    thresholds: GateThresholds,
) -> Result<GateDecision, GateInputError> {
    if !path.exists() {
        return Err(GateInputError::NotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path).map_err(|source| GateInputError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let summary: RunSummary = serde_json::from_str(&raw)?;
    decide(&summary, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoopSummary;

    fn summary(loops: &[(f64, f64, f64)]) -> RunSummary {
        let mut summary = RunSummary::new("run", "");
        for (i, (score, max_score, pass_rate)) in loops.iter().enumerate() {
            summary.loops.push(LoopSummary {
                loop_index: i as u32 + 1,
                score: *score,
                max_score: *max_score,
                pass_rate: *pass_rate,
                tunables: Default::default(),
                adjustments: Vec::new(),
            });
        }
        summary
    }

    #[test]
    fn only_final_loop_counts() {
        let s = summary(&[(10.0, 10.0, 100.0), (2.0, 10.0, 20.0)]);
        let decision = decide(&s, GateThresholds::default()).expect("decide");
        assert!(!decision.passed);
        assert_eq!(decision.loop_index, 2);
        assert_eq!(decision.violations.len(), 2);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let s = summary(&[(7.0, 10.0, 70.0)]);
        let decision = decide(&s, GateThresholds::default()).expect("decide");
        assert!(decision.passed);
        assert_eq!(decision.exit_code, EXIT_PASS);
    }

    #[test]
    fn zero_max_score_is_zero_ratio() {
        let s = summary(&[(0.0, 0.0, 100.0)]);
        let decision = decide(&s, GateThresholds::default()).expect("decide");
        assert_eq!(decision.score_ratio, 0.0);
        assert_eq!(decision.violations[0].rule, GateRule::MinScoreRatio);
    }

    #[test]
    fn impossible_final_loop_is_input_error() {
        for loops in [
            [(12.0, 10.0, 100.0)],
            [(-1.0, 10.0, 50.0)],
            [(5.0, 10.0, 150.0)],
            [(f64::NAN, 10.0, 50.0)],
        ] {
            let err = decide(&summary(&loops), GateThresholds::new(0.0, 0.0)).unwrap_err();
            assert!(matches!(err, GateInputError::Inconsistent(_)), "{:?}", loops);
        }
        // Only the final loop is checked.
        let s = summary(&[(12.0, 10.0, 100.0), (7.0, 10.0, 70.0)]);
        assert!(decide(&s, GateThresholds::default()).is_ok());
    }

    #[test]
    fn no_loops_is_input_error() {
        let s = summary(&[]);
        assert!(matches!(
            decide(&s, GateThresholds::default()),
            Err(GateInputError::NoLoops)
        ));
    }

    #[test]
    fn threshold_validation() {
        assert!(GateThresholds::default().validate().is_ok());
        assert!(GateThresholds::new(120.0, 0.5).validate().is_err());
        assert!(GateThresholds::new(50.0, 1.5).validate().is_err());
    }
}
