//! Heuristic tuner.
//!
//! Between loops the tuner derives failure signatures from the previous
//! loop and maps each to a fixed catalogue of adjustments. Adjustments set
//! absolute values, so reapplying one is a no-op, and they record the
//! values they replaced, so a batch can be reverted.
//!
//! A `(signature, adjustment)` pair is tried at most once per run. When the
//! loop after a batch scores a lower ratio than the loop before it, the
//! batch is reverted and its pairs stay marked as tried.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::tunables::{
    EXACT_REPLY_HINT, PROFILE_PREFIX, RETRY_BUDGET, STEPS_HINT, TIMEOUT_SCALE_PCT,
};
use crate::domain::{CheckKind, FailureKind, LoopResult, TunableError, TunableValue, Tunables};

/// Coarse classification of why scenarios failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureSignature {
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "agent_crash")]
    AgentCrash,
    #[serde(rename = "exact_mismatch")]
    ExactMismatch,
    #[serde(rename = "too_few_steps")]
    TooFewSteps,
    #[serde(rename = "missing_content")]
    MissingContent,
    #[serde(rename = "forbidden_content")]
    ForbiddenContent,
    #[serde(rename = "no_alternative_matched")]
    NoAlternativeMatched,
    /// A failing scenario tagged `memory`.
    #[serde(rename = "tag:memory")]
    MemoryTag,
    /// A failing scenario tagged `context`.
    #[serde(rename = "tag:context")]
    ContextTag,
}

impl FailureSignature {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureSignature::Timeout => "timeout",
            FailureSignature::AgentCrash => "agent_crash",
            FailureSignature::ExactMismatch => "exact_mismatch",
            FailureSignature::TooFewSteps => "too_few_steps",
            FailureSignature::MissingContent => "missing_content",
            FailureSignature::ForbiddenContent => "forbidden_content",
            FailureSignature::NoAlternativeMatched => "no_alternative_matched",
            FailureSignature::MemoryTag => "tag:memory",
            FailureSignature::ContextTag => "tag:context",
        }
    }

    fn from_failure(kind: FailureKind) -> Option<Self> {
        match kind {
            FailureKind::Timeout => Some(FailureSignature::Timeout),
            FailureKind::AgentCrash => Some(FailureSignature::AgentCrash),
            FailureKind::Check(CheckKind::Equals) => Some(FailureSignature::ExactMismatch),
            FailureKind::Check(CheckKind::NumberedStepsMin) => Some(FailureSignature::TooFewSteps),
            FailureKind::Check(CheckKind::MustContain) => Some(FailureSignature::MissingContent),
            FailureKind::Check(CheckKind::MustNotContain) => {
                Some(FailureSignature::ForbiddenContent)
            }
            FailureKind::Check(CheckKind::AnyOf) => Some(FailureSignature::NoAlternativeMatched),
            FailureKind::Evaluation(_) => None,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "memory" => Some(FailureSignature::MemoryTag),
            "context" => Some(FailureSignature::ContextTag),
            _ => None,
        }
    }

    /// Catalogue entries addressing this signature, in application order.
    pub fn remedies(&self) -> &'static [Adjustment] {
        match self {
            FailureSignature::Timeout => {
                &[Adjustment::ExtendTurnTimeout, Adjustment::EnableTurnRetry]
            }
            FailureSignature::AgentCrash => &[Adjustment::EnableTurnRetry],
            FailureSignature::ExactMismatch => &[Adjustment::EnableExactReplyHint],
            FailureSignature::TooFewSteps => &[Adjustment::EnableStepsHint],
            FailureSignature::MemoryTag => &[Adjustment::EnableMemoryAutosave],
            FailureSignature::ContextTag => &[Adjustment::EnableContextSync],
            FailureSignature::MissingContent
            | FailureSignature::ForbiddenContent
            | FailureSignature::NoAlternativeMatched => &[],
        }
    }
}

impl fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed adjustment catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    EnableTurnRetry,
    ExtendTurnTimeout,
    EnableStepsHint,
    EnableExactReplyHint,
    EnableMemoryAutosave,
    EnableContextSync,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::EnableTurnRetry => "enable_turn_retry",
            Adjustment::ExtendTurnTimeout => "extend_turn_timeout",
            Adjustment::EnableStepsHint => "enable_steps_hint",
            Adjustment::EnableExactReplyHint => "enable_exact_reply_hint",
            Adjustment::EnableMemoryAutosave => "enable_memory_autosave",
            Adjustment::EnableContextSync => "enable_context_sync",
        }
    }

    /// Target values for this adjustment given the current snapshot.
    fn targets(&self, current: &Tunables) -> Vec<(String, TunableValue)> {
        let profile = |path: &str| format!("{}{}", PROFILE_PREFIX, path);
        match self {
            Adjustment::EnableTurnRetry => {
                vec![(RETRY_BUDGET.to_string(), TunableValue::Int(1))]
            }
            Adjustment::ExtendTurnTimeout => {
                vec![(TIMEOUT_SCALE_PCT.to_string(), TunableValue::Int(200))]
            }
            Adjustment::EnableStepsHint => {
                vec![(STEPS_HINT.to_string(), TunableValue::Bool(true))]
            }
            Adjustment::EnableExactReplyHint => {
                vec![(EXACT_REPLY_HINT.to_string(), TunableValue::Bool(true))]
            }
            Adjustment::EnableMemoryAutosave => {
                let approve_key = profile("autonomy.auto_approve");
                let mut approve = match current.get(&approve_key) {
                    Some(TunableValue::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                if !approve.iter().any(|item| item == "memory_store") {
                    approve.push("memory_store".to_string());
                }
                vec![
                    (profile("memory.auto_save"), TunableValue::Bool(true)),
                    (approve_key, TunableValue::List(approve)),
                ]
            }
            Adjustment::EnableContextSync => vec![
                (profile(CONTEXT_SYNC_KEY), TunableValue::Bool(true)),
                (profile("integration.shared_memory"), TunableValue::Bool(true)),
            ],
        }
    }
}

/// Profile key the agent reads to keep workspace context files in sync.
pub const CONTEXT_SYNC_KEY: &str = "integration.openclaw_sync";

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter written by an adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterChange {
    pub name: String,
    /// Value before the change; `None` means it was unset.
    pub previous: Option<TunableValue>,
    pub value: TunableValue,
}

/// An adjustment the tuner applied, with enough detail to undo it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedAdjustment {
    pub adjustment: Adjustment,
    pub signature: FailureSignature,
    pub changes: Vec<ParameterChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Result of one tuning step.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    /// Snapshot for the next loop.
    pub tunables: Tunables,
    pub applied: Vec<AppliedAdjustment>,
    /// Batch undone because the loop after it scored lower.
    pub reverted: Vec<AppliedAdjustment>,
    /// Signatures seen with no untried remedy left.
    pub unaddressed: Vec<FailureSignature>,
}

#[derive(Debug, Clone)]
struct PendingBatch {
    baseline_ratio: f64,
    applied: Vec<AppliedAdjustment>,
}

/// Stateful heuristic tuner for one run.
#[derive(Debug, Clone, Default)]
pub struct HeuristicTuner {
    tried: BTreeSet<(FailureSignature, Adjustment)>,
    pending: Option<PendingBatch>,
    self_analysis: bool,
}

impl HeuristicTuner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a textual rationale to every applied adjustment.
    pub fn with_self_analysis(mut self, enabled: bool) -> Self {
        self.self_analysis = enabled;
        self
    }

    /// Whether a pair has already been tried this run.
    pub fn has_tried(&self, signature: FailureSignature, adjustment: Adjustment) -> bool {
        self.tried.contains(&(signature, adjustment))
    }

    /// Produce the snapshot for the loop after `previous`.
    ///
    /// `tunables` must be the snapshot `previous` ran with.
    pub fn adjust(&mut self, tunables: &Tunables, previous: &LoopResult) -> TuningOutcome {
        if let Some(batch) = self.pending.take() {
            if previous.score_ratio() < batch.baseline_ratio {
                debug!(
                    baseline = batch.baseline_ratio,
                    observed = previous.score_ratio(),
                    adjustments = batch.applied.len(),
                    "reverting adjustment batch"
                );
                let reverted_tunables = match revert(tunables, &batch.applied) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "failed to revert adjustment batch");
                        tunables.clone()
                    }
                };
                return TuningOutcome {
                    tunables: reverted_tunables,
                    applied: Vec::new(),
                    reverted: batch.applied,
                    unaddressed: Vec::new(),
                };
            }
        }

        let signatures = failure_signatures(previous);
        let mut next = tunables.clone();
        let mut applied = Vec::new();
        let mut unaddressed = Vec::new();

        for (signature, scenario_ids) in &signatures {
            let mut addressed = false;
            for &adjustment in signature.remedies() {
                if !self.tried.insert((*signature, adjustment)) {
                    continue;
                }
                addressed = true;
                match apply(&next, adjustment) {
                    Ok((updated, changes)) if !changes.is_empty() => {
                        let rationale = self
                            .self_analysis
                            .then(|| rationale(*signature, adjustment, scenario_ids, &changes));
                        next = updated;
                        applied.push(AppliedAdjustment {
                            adjustment,
                            signature: *signature,
                            changes,
                            rationale,
                        });
                    }
                    Ok(_) => {
                        debug!(%signature, %adjustment, "adjustment already in effect");
                    }
                    Err(e) => {
                        warn!(%signature, %adjustment, error = %e, "adjustment rejected");
                    }
                }
            }
            if !addressed {
                unaddressed.push(*signature);
            }
        }

        if !applied.is_empty() {
            self.pending = Some(PendingBatch {
                baseline_ratio: previous.score_ratio(),
                applied: applied.clone(),
            });
        }

        TuningOutcome {
            tunables: next,
            applied,
            reverted: Vec::new(),
            unaddressed,
        }
    }
}

/// Failure signatures of a loop, each with the ids of the scenarios showing it.
pub fn failure_signatures(result: &LoopResult) -> BTreeMap<FailureSignature, Vec<String>> {
    let mut signatures: BTreeMap<FailureSignature, Vec<String>> = BTreeMap::new();
    for scenario in result.failures() {
        let from_checks = scenario
            .check_failures
            .iter()
            .filter_map(|f| FailureSignature::from_failure(f.kind));
        let from_tags = scenario
            .tags
            .iter()
            .filter_map(|t| FailureSignature::from_tag(t));
        for signature in from_checks.chain(from_tags) {
            let ids = signatures.entry(signature).or_default();
            if !ids.contains(&scenario.scenario_id) {
                ids.push(scenario.scenario_id.clone());
            }
        }
    }
    signatures
}

fn apply(
    tunables: &Tunables,
    adjustment: Adjustment,
) -> Result<(Tunables, Vec<ParameterChange>), TunableError> {
    let mut next = tunables.clone();
    let mut changes = Vec::new();
    for (name, value) in adjustment.targets(tunables) {
        let previous = tunables.get(&name).cloned();
        if previous.as_ref() == Some(&value) {
            continue;
        }
        next = next.with(&name, value.clone())?;
        changes.push(ParameterChange {
            name,
            previous,
            value,
        });
    }
    Ok((next, changes))
}

fn revert(tunables: &Tunables, batch: &[AppliedAdjustment]) -> Result<Tunables, TunableError> {
    let mut next = tunables.clone();
    for change in batch.iter().rev().flat_map(|a| a.changes.iter().rev()) {
        next = match &change.previous {
            Some(value) => next.with(&change.name, value.clone())?,
            None => next.without(&change.name),
        };
    }
    Ok(next)
}

fn rationale(
    signature: FailureSignature,
    adjustment: Adjustment,
    scenario_ids: &[String],
    changes: &[ParameterChange],
) -> String {
    let settings = changes
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} failed with {}; {} sets {}",
        scenario_ids.join(", "),
        signature,
        adjustment,
        settings
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckFailure, ScenarioResult, ScenarioStatus};

    fn failed(id: &str, tags: &[&str], kinds: &[FailureKind]) -> ScenarioResult {
        ScenarioResult {
            scenario_id: id.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            weight: 1.0,
            status: ScenarioStatus::Failed,
            passed_checks: 0,
            total_checks: kinds.len(),
            check_failures: kinds
                .iter()
                .map(|kind| CheckFailure {
                    check: "c".to_string(),
                    kind: *kind,
                    reason: "r".to_string(),
                })
                .collect(),
            score: 0.0,
            max_score: 1.0,
            turns: Vec::new(),
            duration_ms: 0,
        }
    }

    #[test]
    fn signatures_cover_checks_and_tags() {
        let result = LoopResult::aggregate(
            1,
            vec![
                failed("exact", &[], &[FailureKind::Check(CheckKind::Equals)]),
                failed("recall", &["memory"], &[FailureKind::Check(CheckKind::MustContain)]),
                failed("slow", &[], &[FailureKind::Timeout]),
            ],
            Tunables::new(),
        );
        let signatures = failure_signatures(&result);
        assert_eq!(signatures[&FailureSignature::ExactMismatch], vec!["exact"]);
        assert_eq!(signatures[&FailureSignature::MemoryTag], vec!["recall"]);
        assert_eq!(signatures[&FailureSignature::MissingContent], vec!["recall"]);
        assert_eq!(signatures[&FailureSignature::Timeout], vec!["slow"]);
    }

    #[test]
    fn memory_autosave_merges_auto_approve() {
        let current = Tunables::new()
            .with(
                "profile.autonomy.auto_approve",
                TunableValue::List(vec!["file_read".to_string()]),
            )
            .expect("valid");
        let (next, changes) = apply(&current, Adjustment::EnableMemoryAutosave).expect("apply");
        assert_eq!(changes.len(), 2);
        assert_eq!(
            next.get("profile.autonomy.auto_approve"),
            Some(&TunableValue::List(vec![
                "file_read".to_string(),
                "memory_store".to_string()
            ]))
        );

        let (again, no_changes) = apply(&next, Adjustment::EnableMemoryAutosave).expect("apply");
        assert!(no_changes.is_empty());
        assert_eq!(again, next);
    }

    #[test]
    fn context_sync_writes_keys_the_agent_reads() {
        let (next, changes) = apply(&Tunables::new(), Adjustment::EnableContextSync).expect("apply");
        let keys: Vec<&str> = changes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "profile.integration.openclaw_sync",
                "profile.integration.shared_memory"
            ]
        );
        assert_eq!(
            next.get("profile.integration.openclaw_sync"),
            Some(&TunableValue::Bool(true))
        );
    }

    #[test]
    fn revert_restores_previous_values() {
        let start = Tunables::new()
            .with(TIMEOUT_SCALE_PCT, TunableValue::Int(150))
            .expect("valid");
        let (next, changes) = apply(&start, Adjustment::ExtendTurnTimeout).expect("apply");
        assert_eq!(next.timeout_scale_pct(), 200);

        let batch = vec![AppliedAdjustment {
            adjustment: Adjustment::ExtendTurnTimeout,
            signature: FailureSignature::Timeout,
            changes,
            rationale: None,
        }];
        assert_eq!(revert(&next, &batch).expect("revert"), start);
    }

    #[test]
    fn rationale_only_with_self_analysis() {
        let result = LoopResult::aggregate(
            1,
            vec![failed(
                "plan",
                &[],
                &[FailureKind::Check(CheckKind::NumberedStepsMin)],
            )],
            Tunables::new(),
        );

        let plain = HeuristicTuner::new().adjust(&Tunables::new(), &result);
        assert!(plain.applied[0].rationale.is_none());

        let analysed = HeuristicTuner::new()
            .with_self_analysis(true)
            .adjust(&Tunables::new(), &result);
        let text = analysed.applied[0].rationale.clone().expect("rationale");
        assert!(text.contains("plan"));
        assert!(text.contains("too_few_steps"));
        assert!(text.contains("steps_hint=true"));
    }

    #[test]
    fn content_signatures_are_unaddressed() {
        let result = LoopResult::aggregate(
            1,
            vec![failed("leak", &[], &[FailureKind::Check(CheckKind::MustNotContain)])],
            Tunables::new(),
        );
        let outcome = HeuristicTuner::new().adjust(&Tunables::new(), &result);
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.unaddressed, vec![FailureSignature::ForbiddenContent]);
        assert_eq!(outcome.tunables, Tunables::new());
    }

    #[test]
    fn signature_serializes_with_tag_prefix() {
        let json = serde_json::to_value(FailureSignature::ContextTag).expect("serialize");
        assert_eq!(json, serde_json::json!("tag:context"));
    }
}
