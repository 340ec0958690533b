//! Scenario runner: drives one scenario turn by turn against the agent.
//!
//! State machine: `Pending -> Running(turn) -> Completed | Errored`.
//! A timed-out or crashed turn is retried up to the snapshot's retry budget;
//! once retries are exhausted the scenario is `Errored`, scores zero, and its
//! checks still run against the text gathered so far.

use std::time::{Duration, Instant};

use agentbench_core::{
    CheckEvaluator, CheckFailure, CheckScope, FailureKind, HarnessConfig, Scenario,
    ScenarioResult, ScenarioStatus, ScoringMode, Tunables, Turn, TurnRecord, METRICS,
};
use tracing::{debug, trace, warn};

use crate::agent::{AgentError, AgentHandle};
use crate::cancel::CancelSignal;

/// Time an agent gets past its turn timeout to stop and hand back partial
/// output before the runner abandons the turn.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Appended to prompts when `steps_hint` is set.
pub const STEPS_HINT_TEXT: &str = "Format the answer as numbered steps (1., 2., 3.).";
/// Appended to prompts when `exact_reply_hint` is set.
pub const EXACT_REPLY_HINT_TEXT: &str = "Reply with exactly the requested text and nothing else.";

/// Lifecycle of a single scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Pending,
    Running(usize),
    Completed,
    Errored,
}

/// The run was cancelled while this scenario was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("benchmark run cancelled")]
pub struct Cancelled;

/// Runs scenarios against an agent with a fixed evaluator and scoring mode.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    evaluator: CheckEvaluator,
    default_timeout: Duration,
    scoring: ScoringMode,
    cancel: CancelSignal,
}

impl ScenarioRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            evaluator: CheckEvaluator::default(),
            default_timeout,
            scoring: ScoringMode::default(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(Duration::from_secs(config.turn_timeout_secs))
            .with_evaluator(CheckEvaluator::new(config.step_markers.clone()))
            .with_scoring(config.scoring)
    }

    pub fn with_evaluator(mut self, evaluator: CheckEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Prompt as sent to the agent, with any enabled hints appended.
    pub fn prompt_for(turn: &Turn, tunables: &Tunables) -> String {
        let mut prompt = turn.prompt.clone();
        if tunables.steps_hint() {
            prompt.push_str("\n\n");
            prompt.push_str(STEPS_HINT_TEXT);
        }
        if tunables.exact_reply_hint() {
            prompt.push_str("\n\n");
            prompt.push_str(EXACT_REPLY_HINT_TEXT);
        }
        prompt
    }

    /// Turn timeout (override or default) scaled by `timeout_scale_pct`.
    pub fn timeout_for(&self, turn: &Turn, tunables: &Tunables) -> Duration {
        let base = turn
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let scaled_ms = base.as_millis() * u128::from(tunables.timeout_scale_pct()) / 100;
        Duration::from_millis(u64::try_from(scaled_ms).unwrap_or(u64::MAX))
    }

    /// Run every turn of `scenario`, then evaluate its checks.
    pub async fn run(
        &self,
        scenario: &Scenario,
        agent: &dyn AgentHandle,
        tunables: &Tunables,
    ) -> Result<ScenarioResult, Cancelled> {
        let started = Instant::now();
        let mut state = ScenarioState::Pending;
        trace!(scenario = %scenario.id, ?state, "scenario queued");

        let mut turns: Vec<TurnRecord> = Vec::with_capacity(scenario.turns.len());
        let mut turn_failure: Option<CheckFailure> = None;

        for (turn_index, turn) in scenario.turns.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Cancelled);
            }
            state = ScenarioState::Running(turn_index);
            trace!(scenario = %scenario.id, ?state, "sending turn");

            let prompt = Self::prompt_for(turn, tunables);
            let timeout = self.timeout_for(turn, tunables);
            let (record, error) = self
                .send_with_retries(agent, turn_index, &prompt, timeout, tunables.retry_budget())
                .await?;
            turns.push(record);

            if let Some(error) = error {
                turn_failure = Some(CheckFailure {
                    check: format!("turn {}", turn_index),
                    kind: if error.is_timeout() {
                        FailureKind::Timeout
                    } else {
                        FailureKind::AgentCrash
                    },
                    reason: error.to_string(),
                });
                state = ScenarioState::Errored;
                break;
            }
        }
        if state != ScenarioState::Errored {
            state = ScenarioState::Completed;
        }

        let text = match scenario.check_scope {
            CheckScope::Transcript => turns
                .iter()
                .map(|t| t.response.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            CheckScope::FinalTurn => turns.last().map(|t| t.response.clone()).unwrap_or_default(),
        };
        let tally = self.evaluator.evaluate_all(&scenario.checks, &text);

        let errored = state == ScenarioState::Errored;
        let status = if errored {
            ScenarioStatus::Errored
        } else if tally.all_passed() {
            ScenarioStatus::Passed
        } else {
            ScenarioStatus::Failed
        };
        let score = ScenarioResult::score_for(
            self.scoring,
            scenario.weight,
            errored,
            tally.passed,
            tally.total,
        );

        let mut check_failures: Vec<CheckFailure> = turn_failure.into_iter().collect();
        check_failures.extend(tally.failures);

        METRICS.inc_scenarios_run();
        debug!(scenario = %scenario.id, ?state, score, "scenario finished");

        Ok(ScenarioResult {
            scenario_id: scenario.id.clone(),
            description: scenario.description.clone(),
            tags: scenario.tags.clone(),
            weight: scenario.weight,
            status,
            passed_checks: tally.passed,
            total_checks: tally.total,
            check_failures,
            score,
            max_score: scenario.weight,
            turns,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Send one turn, retrying timeouts and crashes up to `retry_budget` times.
    async fn send_with_retries(
        &self,
        agent: &dyn AgentHandle,
        turn_index: usize,
        prompt: &str,
        timeout: Duration,
        retry_budget: u32,
    ) -> Result<(TurnRecord, Option<AgentError>), Cancelled> {
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            METRICS.inc_turns_sent();

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Cancelled),
                outcome = tokio::time::timeout(timeout + STOP_GRACE, agent.send_turn(prompt, timeout)) => {
                    outcome.unwrap_or(Err(AgentError::timeout(timeout)))
                }
            };

            match outcome {
                Ok(reply) => {
                    let record = TurnRecord {
                        turn_index,
                        prompt: prompt.to_string(),
                        response: reply.text,
                        exit_code: reply.exit_code,
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempts,
                    };
                    return Ok((record, None));
                }
                Err(error) => {
                    if error.is_timeout() {
                        METRICS.inc_turn_timeouts();
                    }
                    if attempts <= retry_budget {
                        warn!(turn_index, attempts, error = %error, "turn failed, retrying");
                        continue;
                    }
                    let record = TurnRecord {
                        turn_index,
                        prompt: prompt.to_string(),
                        response: error.partial_output().to_string(),
                        exit_code: error.exit_code(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempts,
                    };
                    return Ok((record, Some(error)));
                }
            }
        }
    }
}
