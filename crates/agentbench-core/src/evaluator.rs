//! Check evaluation against transcript text.
//!
//! Evaluation is pure: the same check and text always produce the same
//! [`Evaluation`]. Matching is case-sensitive.

use serde::{Deserialize, Serialize};

use crate::domain::check::quote_all;
use crate::domain::{Check, CheckFailure, FailureKind, StepMarkers};

/// Outcome of evaluating a single check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub reason: String,
    /// The check itself could not be evaluated; counted as a failure.
    #[serde(default)]
    pub malformed: bool,
}

impl Evaluation {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            malformed: false,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            malformed: false,
        }
    }

    fn malformed(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            malformed: true,
        }
    }
}

/// Tally of a scenario's checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckTally {
    pub passed: usize,
    pub total: usize,
    pub failures: Vec<CheckFailure>,
}

impl CheckTally {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Evaluates checks using a configured step-marker set.
#[derive(Debug, Clone, Default)]
pub struct CheckEvaluator {
    markers: StepMarkers,
}

impl CheckEvaluator {
    pub fn new(markers: StepMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &StepMarkers {
        &self.markers
    }

    /// Evaluate one check against `text`.
    pub fn evaluate(&self, check: &Check, text: &str) -> Evaluation {
        match check {
            Check::Equals(expected) => eval_equals(expected, text),
            Check::MustContain(strings) => eval_must_contain(strings, text),
            Check::MustNotContain(strings) => eval_must_not_contain(strings, text),
            Check::AnyOf(strings) => eval_any_of(strings, text),
            Check::NumberedStepsMin(count) => self.eval_numbered_steps(*count, text),
        }
    }

    /// Evaluate every check independently, in order.
    pub fn evaluate_all(&self, checks: &[Check], text: &str) -> CheckTally {
        let mut tally = CheckTally {
            total: checks.len(),
            ..CheckTally::default()
        };
        for check in checks {
            let evaluation = self.evaluate(check, text);
            if evaluation.passed {
                tally.passed += 1;
                continue;
            }
            let kind = if evaluation.malformed {
                FailureKind::Evaluation(check.kind())
            } else {
                FailureKind::Check(check.kind())
            };
            tally.failures.push(CheckFailure {
                check: check.describe(),
                kind,
                reason: evaluation.reason,
            });
        }
        tally
    }

    fn eval_numbered_steps(&self, required: u32, text: &str) -> Evaluation {
        if required == 0 {
            return Evaluation::malformed("numbered_steps_min requires a positive count");
        }
        if let Err(problem) = self.markers.validate() {
            return Evaluation::malformed(format!("check evaluation error: {}", problem));
        }
        let found = self.markers.count(text);
        if found >= required as usize {
            Evaluation::pass(format!("found {} step markers (>= {})", found, required))
        } else {
            Evaluation::fail(format!(
                "numbered_steps_min failed: expected >= {}, got {}",
                required, found
            ))
        }
    }
}

/// Evaluate with the default step-marker set.
pub fn evaluate(check: &Check, text: &str) -> Evaluation {
    CheckEvaluator::default().evaluate(check, text)
}

fn eval_equals(expected: &str, text: &str) -> Evaluation {
    let actual = text.trim();
    if actual == expected {
        Evaluation::pass("exact match")
    } else {
        Evaluation::fail(format!(
            "equals failed: expected `{}` got `{}`",
            expected, actual
        ))
    }
}

fn eval_must_contain(strings: &[String], text: &str) -> Evaluation {
    let missing: Vec<String> = strings
        .iter()
        .filter(|s| !text.contains(s.as_str()))
        .cloned()
        .collect();
    if missing.is_empty() {
        Evaluation::pass(format!("all {} strings present", strings.len()))
    } else {
        Evaluation::fail(format!("must_contain missing: {}", quote_all(&missing)))
    }
}

fn eval_must_not_contain(strings: &[String], text: &str) -> Evaluation {
    let found: Vec<String> = strings
        .iter()
        .filter(|s| text.contains(s.as_str()))
        .cloned()
        .collect();
    if found.is_empty() {
        Evaluation::pass("no forbidden strings present")
    } else {
        Evaluation::fail(format!("must_not_contain matched: {}", quote_all(&found)))
    }
}

fn eval_any_of(strings: &[String], text: &str) -> Evaluation {
    match strings.iter().find(|s| text.contains(s.as_str())) {
        Some(hit) => Evaluation::pass(format!("matched `{}`", hit)),
        None => Evaluation::fail(format!("any_of failed: none of {}", quote_all(strings))),
    }
}
