//! Loop aggregator: one full, sequential pass through the suite.

use agentbench_core::obs;
use agentbench_core::{LoopResult, Suite, Tunables};

use crate::agent::AgentHandle;
use crate::runner::{Cancelled, ScenarioRunner};

/// Run every scenario of `suite` in order on one agent handle.
///
/// A cancelled loop yields no partial result.
pub async fn run_loop(
    runner: &ScenarioRunner,
    suite: &Suite,
    agent: &dyn AgentHandle,
    tunables: &Tunables,
    loop_index: u32,
) -> Result<LoopResult, Cancelled> {
    let mut results = Vec::with_capacity(suite.len());
    for scenario in suite.scenarios() {
        let result = runner.run(scenario, agent, tunables).await?;
        obs::emit_scenario_finished(
            loop_index,
            &result.scenario_id,
            status_name(&result),
            result.score,
            result.max_score,
            result.duration_ms,
        );
        results.push(result);
    }
    let result = LoopResult::aggregate(loop_index, results, tunables.clone());
    obs::emit_loop_finished(loop_index, result.score, result.max_score, result.pass_rate);
    Ok(result)
}

fn status_name(result: &agentbench_core::ScenarioResult) -> &'static str {
    match result.status {
        agentbench_core::ScenarioStatus::Passed => "passed",
        agentbench_core::ScenarioStatus::Failed => "failed",
        agentbench_core::ScenarioStatus::Errored => "errored",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use agentbench_core::{Check, Scenario};
    use std::time::Duration;

    #[tokio::test]
    async fn aggregates_in_suite_order() {
        let suite = Suite::new(
            "smoke",
            "1",
            vec![
                Scenario::new("a", 10.0)
                    .with_prompt("one")
                    .with_check(Check::Equals("OK".to_string())),
                Scenario::new("b", 5.0)
                    .with_prompt("two")
                    .with_check(Check::Equals("nope".to_string())),
            ],
        )
        .expect("suite");
        let agent = ScriptedAgent::always("OK");
        let runner = ScenarioRunner::new(Duration::from_secs(5));

        let result = run_loop(&runner, &suite, &agent, &Tunables::new(), 1)
            .await
            .expect("loop");
        let ids: Vec<&str> = result
            .scenario_results
            .iter()
            .map(|r| r.scenario_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(result.max_score, suite.max_score());
        assert_eq!(result.score, 10.0);
        assert_eq!(result.pass_rate, 50.0);
        assert_eq!(agent.prompts(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn empty_suite_scores_zero() {
        let suite = Suite::new("empty", "", Vec::new()).expect("suite");
        let agent = ScriptedAgent::always("OK");
        let runner = ScenarioRunner::new(Duration::from_secs(5));
        let result = run_loop(&runner, &suite, &agent, &Tunables::new(), 1)
            .await
            .expect("loop");
        assert_eq!(result.total_scenarios, 0);
        assert_eq!(result.pass_rate, 0.0);
        assert_eq!(result.score_ratio(), 0.0);
    }
}
