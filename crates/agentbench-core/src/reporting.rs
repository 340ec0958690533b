//! Report rendering and artifact writers.
//!
//! Rendering is pure; writers use `anyhow` with path context.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LoopResult, ScenarioStatus, Tunables};

/// Number of failing scenarios included in the self-analysis prompt.
pub const SELF_ANALYSIS_TOP_FAILURES: usize = 5;

/// One row of the append-only leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardRow {
    pub timestamp: DateTime<Utc>,
    /// Path of the run summary the row refers to.
    pub summary_reference: String,
    pub gate_exit_code: i32,
    pub min_pass_rate: f64,
    pub min_score_ratio: f64,
}

/// Serialize `value` as pretty JSON and write it to `path`.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("{:?} has no file name", path))?
        .to_string_lossy();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, contents).with_context(|| format!("write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

/// Append one JSON line to the leaderboard, creating the file if needed.
pub fn append_leaderboard_row(path: &Path, row: &LeaderboardRow) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let line = serde_json::to_string(row).context("serialize leaderboard row")?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {:?}", path))?;
    writeln!(file, "{}", line).with_context(|| format!("append {:?}", path))?;
    Ok(())
}

/// Render the human-readable loop report.
pub fn render_loop_report_md(run_id: &str, result: &LoopResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Benchmark loop {}\n", result.loop_index);
    let _ = writeln!(out, "- run: `{}`", run_id);
    let _ = writeln!(
        out,
        "- score: {:.2}/{:.2} ({:.1}%)",
        result.score,
        result.max_score,
        result.score_ratio() * 100.0
    );
    let _ = writeln!(
        out,
        "- pass rate: {:.2}% ({}/{})",
        result.pass_rate, result.passed_scenarios, result.total_scenarios
    );
    let _ = writeln!(out, "- avg duration: {} ms\n", result.avg_duration_ms);

    out.push_str("## Scenarios\n\n");
    out.push_str("| id | status | score | checks | duration ms |\n");
    out.push_str("|---|---|---|---|---|\n");
    for scenario in &result.scenario_results {
        let _ = writeln!(
            out,
            "| {} | {} | {:.2}/{:.2} | {}/{} | {} |",
            scenario.scenario_id,
            status_label(scenario.status),
            scenario.score,
            scenario.max_score,
            scenario.passed_checks,
            scenario.total_checks,
            scenario.duration_ms
        );
    }

    let failures: Vec<_> = result.failures().collect();
    if !failures.is_empty() {
        out.push_str("\n## Failures\n\n");
        for scenario in failures {
            let _ = writeln!(out, "### {}\n", scenario.scenario_id);
            for failure in &scenario.check_failures {
                let _ = writeln!(out, "- {}: {}", failure.check, failure.reason);
            }
            out.push('\n');
        }
    }

    if !result.tunables.is_empty() {
        out.push_str("## Tunables\n\n");
        for (name, value) in result.tunables.redacted() {
            let _ = writeln!(out, "- `{}` = {}", name, value);
        }
    }
    out
}

/// Prompt asking the agent to analyse its own loop results.
pub fn build_self_analysis_prompt(result: &LoopResult, tunables: &Tunables) -> String {
    let mut failures = String::new();
    for scenario in result.failures().take(SELF_ANALYSIS_TOP_FAILURES) {
        let reasons: Vec<&str> = scenario
            .check_failures
            .iter()
            .map(|f| f.reason.as_str())
            .collect();
        let detail = if reasons.is_empty() {
            "no detail".to_string()
        } else {
            reasons.join("; ")
        };
        let _ = writeln!(failures, "- {}: {}", scenario.scenario_id, detail);
    }
    if failures.is_empty() {
        failures.push_str("- none\n");
    }

    let mut settings = String::new();
    for (name, value) in tunables.redacted() {
        let _ = writeln!(settings, "{} = {}", name, value);
    }
    if settings.is_empty() {
        settings.push_str("(defaults)\n");
    }

    format!(
        "You are an agent reliability engineer. Analyse this benchmark loop and propose \
         configuration changes that raise the score and stability without weakening safety \
         defaults.\n\n\
         Score: {:.2}/{:.2}\n\
         Pass rate: {:.2}%\n\n\
         Top failures:\n{}\n\
         Current settings (redacted):\n{}\n\
         Answer with: 1) likely causes 2) concrete changes 3) risks.",
        result.score, result.max_score, result.pass_rate, failures, settings
    )
}

/// Render the stored self-analysis document.
pub fn render_self_analysis_md(loop_index: u32, prompt: &str, response: &str) -> String {
    format!(
        "# Self-analysis, loop {}\n\n## Prompt\n\n```\n{}\n```\n\n## Response\n\n{}\n",
        loop_index,
        prompt,
        response.trim()
    )
}

fn status_label(status: ScenarioStatus) -> &'static str {
    match status {
        ScenarioStatus::Passed => "passed",
        ScenarioStatus::Failed => "failed",
        ScenarioStatus::Errored => "errored",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckFailure, CheckKind, FailureKind, ScenarioResult, TunableValue};

    fn scenario(id: &str, passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_id: id.to_string(),
            description: String::new(),
            tags: Default::default(),
            weight: 5.0,
            status: if passed {
                ScenarioStatus::Passed
            } else {
                ScenarioStatus::Failed
            },
            passed_checks: usize::from(passed),
            total_checks: 1,
            check_failures: if passed {
                Vec::new()
            } else {
                vec![CheckFailure {
                    check: "equals `X`".to_string(),
                    kind: FailureKind::Check(CheckKind::Equals),
                    reason: "equals failed: expected `X` got `Y`".to_string(),
                }]
            },
            score: if passed { 5.0 } else { 0.0 },
            max_score: 5.0,
            turns: Vec::new(),
            duration_ms: 10,
        }
    }

    #[test]
    fn loop_report_lists_scenarios_and_failures() {
        let result = LoopResult::aggregate(
            2,
            vec![scenario("ok", true), scenario("bad", false)],
            Tunables::new(),
        );
        let md = render_loop_report_md("run-1", &result);
        assert!(md.starts_with("# Benchmark loop 2\n"));
        assert!(md.contains("- score: 5.00/10.00 (50.0%)"));
        assert!(md.contains("| ok | passed | 5.00/5.00 | 1/1 | 10 |"));
        assert!(md.contains("### bad"));
        assert!(md.contains("expected `X` got `Y`"));
        assert!(!md.contains("## Tunables"));
    }

    #[test]
    fn self_analysis_prompt_redacts_secrets() {
        let tunables = Tunables::new()
            .with(
                "profile.provider.api_key",
                TunableValue::Text("sk-live".to_string()),
            )
            .expect("valid");
        let result = LoopResult::aggregate(1, vec![scenario("bad", false)], tunables.clone());
        let prompt = build_self_analysis_prompt(&result, &tunables);
        assert!(prompt.contains("- bad: equals failed"));
        assert!(prompt.contains("Pass rate: 0.00%"));
        assert!(!prompt.contains("sk-live"));
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.json");
        write_atomic(&path, b"one").expect("write");
        write_atomic(&path, b"two").expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "two");
        assert!(!dir.path().join(".summary.json.tmp").exists());
    }

    #[test]
    fn leaderboard_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("leaderboard.jsonl");
        let row = LeaderboardRow {
            timestamp: Utc::now(),
            summary_reference: "runs/a.summary.json".to_string(),
            gate_exit_code: 0,
            min_pass_rate: 70.0,
            min_score_ratio: 0.7,
        };
        append_leaderboard_row(&path, &row).expect("append");
        append_leaderboard_row(&path, &row).expect("append");

        let content = std::fs::read_to_string(&path).expect("read");
        let rows: Vec<LeaderboardRow> = content
            .lines()
            .map(|l| serde_json::from_str(l).expect("row"))
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row);
    }
}
