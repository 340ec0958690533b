//! Multi-loop benchmark orchestration.
//!
//! One run: `loops` sequential passes over the suite on a single agent
//! handle, tuning between passes, then the quality gate on the final loop,
//! the leaderboard row, and notifications.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use agentbench_core::obs;
use agentbench_core::reporting::{build_self_analysis_prompt, render_self_analysis_md};
use agentbench_core::{
    append_leaderboard_row, decide, load_path, new_run_id, GateDecision, HarnessConfig,
    HeuristicTuner, LeaderboardRow, LoopResult, RunRecorder, RunStatus, RunSummary, Suite,
    Tunables, METRICS,
};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn, Instrument};

use crate::agent::AgentHandle;
use crate::aggregator::run_loop;
use crate::cancel::CancelSignal;
use crate::notify::{NotificationPayload, Notifier};
use crate::process::ProcessAgent;
use crate::profile::AgentProfile;
use crate::runner::ScenarioRunner;
use crate::simulate::SimulatedAgent;

/// What a finished, cancelled or failed run produced.
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub summary: RunSummary,
    pub summary_path: PathBuf,
    /// `None` when no loop completed.
    pub decision: Option<GateDecision>,
    /// Every loop that completed, in order.
    pub loops: Vec<LoopResult>,
    /// Notification channels that accepted the payload.
    pub notifications_delivered: usize,
}

impl BenchmarkOutcome {
    pub fn cancelled(&self) -> bool {
        self.summary.status == RunStatus::Cancelled
    }

    /// The run stopped early because the agent could not be configured.
    pub fn failed(&self) -> bool {
        self.summary.status == RunStatus::Failed
    }

    /// Gate exit code, or `None` when there was nothing to gate.
    pub fn exit_code(&self) -> Option<i32> {
        self.decision.as_ref().map(|d| d.exit_code)
    }
}

pub struct Benchmark {
    config: HarnessConfig,
    suite: Suite,
    agent: Box<dyn AgentHandle>,
    notifier: Notifier,
    cancel: CancelSignal,
    run_id: Option<String>,
}

impl Benchmark {
    pub fn new(config: HarnessConfig, suite: Suite, agent: Box<dyn AgentHandle>) -> Self {
        let notifier = Notifier::from_config(&config);
        Self {
            config,
            suite,
            agent,
            notifier,
            cancel: CancelSignal::never(),
            run_id: None,
        }
    }

    /// Load the suite and build the agent the configuration asks for.
    pub fn from_config(config: HarnessConfig) -> Result<Self> {
        config.validate().context("invalid harness configuration")?;
        let suite = load_path(&config.suite)
            .with_context(|| format!("load suite {:?}", config.suite))?;
        let agent: Box<dyn AgentHandle> = if config.simulate {
            Box::new(SimulatedAgent::new())
        } else {
            let profile =
                AgentProfile::prepare(&config.profile_root, config.source_profile.as_deref())
                    .with_context(|| format!("prepare profile {:?}", config.profile_root))?;
            Box::new(ProcessAgent::from_config(&config, profile)?)
        };
        Ok(Self::new(config, suite, agent))
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fixed run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    pub async fn run(self) -> Result<BenchmarkOutcome> {
        let run_id = self.run_id.clone().unwrap_or_else(new_run_id);
        let span = obs::run_span(&run_id);
        self.run_loops(run_id).instrument(span).await
    }

    async fn run_loops(self, run_id: String) -> Result<BenchmarkOutcome> {
        let started = Instant::now();
        let digest = self.suite.digest().context("digest suite")?;
        let mut recorder = RunRecorder::create(&self.config.run_dir, &run_id, &digest)?;
        let mut loops = Vec::new();

        obs::emit_run_started(&run_id, self.suite.name(), self.suite.len(), self.config.loops);

        // Whatever happens from here on, the summary ends terminal, the gate
        // sees the completed loops and the notifiers hear about it.
        let mut fatal = None;
        let status = match self.drive_loops(&mut recorder, &mut loops).await {
            Ok(status) => status,
            Err(e) => {
                error!(
                    run_id = %run_id,
                    error = %format!("{:#}", e),
                    "run stopped by an error"
                );
                fatal = Some(e);
                RunStatus::Failed
            }
        };

        let summary_path = recorder.summary_path();
        if let Err(e) = recorder.finish(status) {
            obs::emit_artifact_error(&summary_path.display().to_string(), &e);
            if fatal.is_none() {
                fatal = Some(e);
            }
        }
        let summary = recorder.into_summary();

        let decision = match decide(&summary, self.config.gate) {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "gate skipped");
                None
            }
        };
        if let Some(decision) = &decision {
            obs::emit_gate_decided(decision);
            if let Some(leaderboard) = &self.config.leaderboard {
                let row = LeaderboardRow {
                    timestamp: Utc::now(),
                    summary_reference: summary_path.display().to_string(),
                    gate_exit_code: decision.exit_code,
                    min_pass_rate: self.config.gate.min_pass_rate,
                    min_score_ratio: self.config.gate.min_score_ratio,
                };
                if let Err(e) = append_leaderboard_row(leaderboard, &row) {
                    obs::emit_artifact_error(&leaderboard.display().to_string(), &e);
                }
            }
        }

        let payload = NotificationPayload::from_run(&summary, decision.as_ref(), self.config.gate);
        let notifications_delivered = self.notifier.deliver_all(&payload).await;

        METRICS.flush();
        obs::emit_run_finished(
            &run_id,
            summary.status.as_str(),
            summary.loops.len(),
            started.elapsed().as_millis() as u64,
        );

        if let Some(e) = fatal {
            return Err(e);
        }
        Ok(BenchmarkOutcome {
            summary,
            summary_path,
            decision,
            loops,
            notifications_delivered,
        })
    }

    /// Run the loops and return the terminal status. A loop the agent could
    /// not be configured for ends the run as failed; errors persisting
    /// artifacts are returned.
    async fn drive_loops(
        &self,
        recorder: &mut RunRecorder,
        loops: &mut Vec<LoopResult>,
    ) -> Result<RunStatus> {
        let runner = ScenarioRunner::from_config(&self.config).with_cancel(self.cancel.clone());
        let mut tuner = HeuristicTuner::new().with_self_analysis(self.config.self_analysis);
        let mut tunables = self.config.tunables.clone();

        for loop_index in 1..=self.config.loops {
            if self.cancel.is_cancelled() {
                return Ok(RunStatus::Cancelled);
            }
            if let Err(e) = self.agent.configure(&tunables).await {
                error!(
                    loop_index,
                    agent = self.agent.name(),
                    error = %e,
                    "agent configuration failed"
                );
                return Ok(RunStatus::Failed);
            }

            let agent = self.agent.as_ref();
            let result = match run_loop(&runner, &self.suite, agent, &tunables, loop_index).await {
                Ok(result) => result,
                Err(_) => {
                    info!(loop_index, "loop cancelled");
                    return Ok(RunStatus::Cancelled);
                }
            };
            recorder
                .record_loop(&result)
                .with_context(|| format!("record loop {}", loop_index))?;

            if self.config.self_analysis {
                self.self_analysis(recorder, &result, &tunables).await;
            }

            let last = loop_index == self.config.loops;
            if self.config.apply_heuristics && !last {
                let outcome = tuner.adjust(&tunables, &result);
                for adjustment in &outcome.reverted {
                    obs::emit_tuning_applied(loop_index, adjustment, true);
                }
                for adjustment in &outcome.applied {
                    obs::emit_tuning_applied(loop_index, adjustment, false);
                }
                if !outcome.unaddressed.is_empty() {
                    info!(
                        loop_index,
                        unaddressed = ?outcome.unaddressed,
                        "failure signatures with no remedy left"
                    );
                }
                METRICS.add_adjustments_applied(outcome.applied.len() as u64);
                recorder
                    .record_adjustments(outcome.applied)
                    .with_context(|| format!("record adjustments after loop {}", loop_index))?;
                tunables = outcome.tunables;
            }
            loops.push(result);
        }
        Ok(RunStatus::Completed)
    }

    /// Ask the agent to analyse the loop and store its answer. Failures are
    /// logged and recorded in the document; they never stop the run.
    async fn self_analysis(
        &self,
        recorder: &RunRecorder,
        result: &LoopResult,
        tunables: &Tunables,
    ) {
        let prompt = build_self_analysis_prompt(result, tunables);
        let timeout = Duration::from_secs(self.config.self_analysis_timeout_secs);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            reply = tokio::time::timeout(timeout, self.agent.send_turn(&prompt, timeout)) => match reply {
                Ok(Ok(reply)) => reply.text,
                Ok(Err(e)) => {
                    warn!(loop_index = result.loop_index, error = %e, "self-analysis failed");
                    format!("_self-analysis failed: {}_", e)
                }
                Err(_) => {
                    warn!(loop_index = result.loop_index, "self-analysis timed out");
                    format!("_self-analysis timed out after {}s_", timeout.as_secs())
                }
            },
        };
        let markdown = render_self_analysis_md(result.loop_index, &prompt, &response);
        if let Err(e) = recorder.write_self_analysis(result.loop_index, &markdown) {
            obs::emit_artifact_error(
                &recorder.loop_path(result.loop_index, "self_analysis.md").display().to_string(),
                &e,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use agentbench_core::{Check, Scenario};

    fn suite() -> Suite {
        Suite::new(
            "unit",
            "1",
            vec![Scenario::new("ok", 1.0)
                .with_prompt("say OK")
                .with_check(Check::Equals("OK".to_string()))],
        )
        .expect("suite")
    }

    fn config(dir: &std::path::Path) -> HarnessConfig {
        HarnessConfig::default()
            .with_run_dir(dir.join("runs"))
            .with_loops(2)
    }

    #[tokio::test]
    async fn completed_run_is_gated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = Benchmark::new(
            config(dir.path()),
            suite(),
            Box::new(ScriptedAgent::always("OK")),
        )
        .with_notifier(Notifier::new())
        .with_run_id("unit-run")
        .run()
        .await
        .expect("run");

        assert_eq!(outcome.summary.status, RunStatus::Completed);
        assert_eq!(outcome.summary.loops.len(), 2);
        assert_eq!(outcome.exit_code(), Some(0));
        assert!(outcome.summary_path.ends_with("unit-run.summary.json"));
        assert!(outcome.summary_path.exists());
    }

    #[tokio::test]
    async fn cancelled_before_start_has_no_loops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        let outcome = Benchmark::new(
            config(dir.path()),
            suite(),
            Box::new(ScriptedAgent::always("OK")),
        )
        .with_notifier(Notifier::new())
        .with_cancel(signal)
        .run()
        .await
        .expect("run");

        assert!(outcome.cancelled());
        assert!(outcome.summary.loops.is_empty());
        assert!(outcome.decision.is_none());
    }

    #[tokio::test]
    async fn self_analysis_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = Benchmark::new(
            config(dir.path()).with_loops(1).with_self_analysis(true),
            suite(),
            Box::new(ScriptedAgent::always("OK")),
        )
        .with_notifier(Notifier::new())
        .with_run_id("sa")
        .run()
        .await
        .expect("run");

        assert_eq!(outcome.loops.len(), 1);
        let doc = std::fs::read_to_string(dir.path().join("runs/sa.loop1.self_analysis.md"))
            .expect("self analysis");
        assert!(doc.starts_with("# Self-analysis, loop 1"));
    }
}
