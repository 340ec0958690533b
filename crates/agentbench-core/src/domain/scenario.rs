//! Scenario and suite definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::check::Check;
use crate::domain::error::ValidationError;

/// One prompt sent to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// Prompt text.
    pub prompt: String,

    /// Per-turn timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Turn {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Which part of the transcript checks are evaluated against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckScope {
    /// All turn outputs joined with newlines.
    #[default]
    Transcript,

    /// Only the last completed turn's output.
    FinalTurn,
}

/// One scripted multi-turn test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Unique, stable identifier.
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Positive scoring weight.
    pub weight: f64,

    /// Ordered prompts; never empty in a validated suite.
    pub turns: Vec<Turn>,

    /// Ordered checks; the scenario passes iff all of them pass.
    #[serde(default)]
    pub checks: Vec<Check>,

    #[serde(default)]
    pub check_scope: CheckScope,
}

impl Scenario {
    /// Create a scenario with no turns or checks.
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            weight,
            turns: Vec::new(),
            checks: Vec::new(),
            check_scope: CheckScope::Transcript,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_turn(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }

    /// Shorthand for a turn without a timeout override.
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.with_turn(Turn::new(prompt))
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_check_scope(mut self, scope: CheckScope) -> Self {
        self.check_scope = scope;
        self
    }

    /// Validate the per-scenario invariants.
    pub fn validate(&self, index: usize) -> std::result::Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId { index });
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(ValidationError::InvalidWeight {
                id: self.id.clone(),
                weight: self.weight,
            });
        }
        if self.turns.is_empty() {
            return Err(ValidationError::NoTurns {
                id: self.id.clone(),
            });
        }
        for (turn_index, turn) in self.turns.iter().enumerate() {
            if turn.prompt.trim().is_empty() {
                return Err(ValidationError::EmptyPrompt {
                    id: self.id.clone(),
                    turn_index,
                });
            }
            if turn.timeout_secs == Some(0) {
                return Err(ValidationError::ZeroTimeout {
                    id: self.id.clone(),
                    turn_index,
                });
            }
        }
        for (check_index, check) in self.checks.iter().enumerate() {
            let problem = match check {
                Check::NumberedStepsMin(0) => Some("count must be positive"),
                Check::MustContain(s) | Check::MustNotContain(s) | Check::AnyOf(s)
                    if s.is_empty() =>
                {
                    Some("string set must not be empty")
                }
                _ => None,
            };
            if let Some(reason) = problem {
                return Err(ValidationError::InvalidCheck {
                    id: self.id.clone(),
                    check_index,
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A validated, ordered collection of scenarios.
///
/// Constructed only through [`Suite::new`] (or the store), so every suite in
/// hand satisfies the scenario invariants and has unique ids.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suite {
    name: String,
    version: String,
    scenarios: Vec<Scenario>,
}

impl Suite {
    /// Validate and build a suite. Fails on the first invalid scenario.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        scenarios: Vec<Scenario>,
    ) -> std::result::Result<Self, ValidationError> {
        let mut seen = BTreeSet::new();
        for (index, scenario) in scenarios.iter().enumerate() {
            scenario.validate(index)?;
            if !seen.insert(scenario.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    id: scenario.id.clone(),
                });
            }
        }
        Ok(Self {
            name: name.into(),
            version: version.into(),
            scenarios,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Scenarios in suite order.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Look up a scenario by id.
    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Sum of all scenario weights.
    pub fn max_score(&self) -> f64 {
        self.scenarios.iter().map(|s| s.weight).sum()
    }

    /// SHA-256 hex digest of the canonical JSON of the scenarios.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        for scenario in &self.scenarios {
            hasher.update(serde_json::to_vec(scenario)?);
            hasher.update(b"\0");
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting(id: &str) -> Scenario {
        Scenario::new(id, 10.0)
            .with_prompt("Say hello")
            .with_check(Check::MustContain(vec!["hello".to_string()]))
    }

    #[test]
    fn suite_accepts_valid_scenarios() {
        let suite = Suite::new("smoke", "1", vec![greeting("a"), greeting("b")]).expect("valid");
        assert_eq!(suite.len(), 2);
        assert_eq!(suite.max_score(), 20.0);
        assert!(suite.get("b").is_some());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = Suite::new("smoke", "1", vec![greeting("a"), greeting("a")]).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateId { id } if id == "a"));
    }

    #[test]
    fn non_positive_weight_rejected() {
        let scenario = Scenario::new("zero", 0.0).with_prompt("hi");
        let err = Suite::new("s", "1", vec![scenario]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidWeight { .. }));

        let nan = Scenario::new("nan", f64::NAN).with_prompt("hi");
        assert!(Suite::new("s", "1", vec![nan]).is_err());
    }

    #[test]
    fn empty_turns_and_prompts_rejected() {
        let no_turns = Scenario::new("none", 1.0);
        assert!(matches!(
            Suite::new("s", "1", vec![no_turns]).unwrap_err(),
            ValidationError::NoTurns { .. }
        ));

        let blank = Scenario::new("blank", 1.0).with_prompt("   ");
        assert!(matches!(
            Suite::new("s", "1", vec![blank]).unwrap_err(),
            ValidationError::EmptyPrompt { turn_index: 0, .. }
        ));
    }

    #[test]
    fn zero_step_count_rejected() {
        let scenario = Scenario::new("steps", 1.0)
            .with_prompt("plan")
            .with_check(Check::NumberedStepsMin(0));
        assert!(matches!(
            Suite::new("s", "1", vec![scenario]).unwrap_err(),
            ValidationError::InvalidCheck { check_index: 0, .. }
        ));
    }

    #[test]
    fn digest_is_stable_and_order_sensitive() {
        let a = Suite::new("s", "1", vec![greeting("a"), greeting("b")]).expect("valid");
        let b = Suite::new("s", "1", vec![greeting("a"), greeting("b")]).expect("valid");
        let c = Suite::new("s", "1", vec![greeting("b"), greeting("a")]).expect("valid");
        let digest = |suite: &Suite| suite.digest().expect("digest");
        assert_eq!(digest(&a), digest(&b));
        assert_ne!(digest(&a), digest(&c));
        assert_eq!(digest(&a).len(), 64);
    }
}
