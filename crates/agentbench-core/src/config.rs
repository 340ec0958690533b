//! Harness configuration.
//!
//! Precedence, lowest first: built-in defaults, `AGENTBENCH_*` environment
//! variables, an optional TOML file, then explicit `with_*` overrides (the
//! CLI applies its flags this way).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{BenchError, ScoringMode, StepMarkers, Tunables};
use crate::gate::GateThresholds;

pub const DEFAULT_AGENT_BIN: &str = "agent";
pub const DEFAULT_SUITE: &str = "benchmarks/agent_tasks.json";
pub const DEFAULT_RUN_DIR: &str = "bench-runs";
pub const DEFAULT_WORKSPACE_ENV: &str = "AGENT_WORKSPACE";
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SELF_ANALYSIS_TIMEOUT_SECS: u64 = 180;

/// Everything a benchmark run needs besides the suite itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Agent executable, spawned once per turn.
    pub agent_bin: PathBuf,
    pub suite: PathBuf,
    pub run_dir: PathBuf,
    /// Isolated agent profile; holds `config.toml` and `workspace/`.
    pub profile_root: PathBuf,
    /// Profile whose `config.toml` seeds `profile_root` when it has none.
    pub source_profile: Option<PathBuf>,
    /// Environment variable through which the agent learns its workspace.
    pub workspace_env: String,
    pub turn_timeout_secs: u64,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub loops: u32,
    pub apply_heuristics: bool,
    pub self_analysis: bool,
    pub self_analysis_timeout_secs: u64,
    /// Use the deterministic simulated agent instead of spawning one.
    pub simulate: bool,
    pub scoring: ScoringMode,
    pub step_markers: StepMarkers,
    pub gate: GateThresholds,
    /// Webhook URLs notified after the run.
    pub webhooks: Vec<String>,
    pub leaderboard: Option<PathBuf>,
    /// Tunables the first loop starts from.
    pub tunables: Tunables,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            agent_bin: env_var("AGENTBENCH_AGENT_BIN")
                .unwrap_or_else(|| DEFAULT_AGENT_BIN.to_string())
                .into(),
            suite: env_var("AGENTBENCH_SUITE")
                .unwrap_or_else(|| DEFAULT_SUITE.to_string())
                .into(),
            run_dir: env_var("AGENTBENCH_RUN_DIR")
                .unwrap_or_else(|| DEFAULT_RUN_DIR.to_string())
                .into(),
            profile_root: env_var("AGENTBENCH_PROFILE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(default_profile_root),
            source_profile: env_var("AGENTBENCH_SOURCE_PROFILE").map(PathBuf::from),
            workspace_env: env_var("AGENTBENCH_WORKSPACE_ENV")
                .unwrap_or_else(|| DEFAULT_WORKSPACE_ENV.to_string()),
            turn_timeout_secs: env_parse("AGENTBENCH_TURN_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_TURN_TIMEOUT_SECS),
            provider: env_var("AGENTBENCH_PROVIDER"),
            model: env_var("AGENTBENCH_MODEL"),
            temperature: env_parse("AGENTBENCH_TEMPERATURE"),
            loops: env_parse("AGENTBENCH_LOOPS").unwrap_or(1),
            apply_heuristics: env_parse("AGENTBENCH_APPLY_HEURISTICS").unwrap_or(false),
            self_analysis: env_parse("AGENTBENCH_SELF_ANALYSIS").unwrap_or(false),
            self_analysis_timeout_secs: env_parse("AGENTBENCH_SELF_ANALYSIS_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_SELF_ANALYSIS_TIMEOUT_SECS),
            simulate: env_parse("AGENTBENCH_SIMULATE").unwrap_or(false),
            scoring: ScoringMode::default(),
            step_markers: StepMarkers::default(),
            gate: GateThresholds {
                min_pass_rate: env_parse("AGENTBENCH_MIN_PASS_RATE").unwrap_or(70.0),
                min_score_ratio: env_parse("AGENTBENCH_MIN_SCORE_RATIO").unwrap_or(0.70),
            },
            webhooks: env_var("AGENTBENCH_WEBHOOKS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            leaderboard: env_var("AGENTBENCH_LEADERBOARD").map(PathBuf::from),
            tunables: Tunables::new(),
        }
    }
}

impl HarnessConfig {
    /// Defaults filled from the environment.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Load a TOML file; keys it omits keep their environment defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, BenchError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, BenchError> {
        toml::from_str(raw).map_err(|e| BenchError::InvalidConfig(e.to_string()))
    }

    pub fn with_agent_bin(mut self, agent_bin: impl Into<PathBuf>) -> Self {
        self.agent_bin = agent_bin.into();
        self
    }

    pub fn with_suite(mut self, suite: impl Into<PathBuf>) -> Self {
        self.suite = suite.into();
        self
    }

    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = run_dir.into();
        self
    }

    pub fn with_profile_root(mut self, profile_root: impl Into<PathBuf>) -> Self {
        self.profile_root = profile_root.into();
        self
    }

    pub fn with_source_profile(mut self, source_profile: impl Into<PathBuf>) -> Self {
        self.source_profile = Some(source_profile.into());
        self
    }

    pub fn with_turn_timeout_secs(mut self, secs: u64) -> Self {
        self.turn_timeout_secs = secs;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_loops(mut self, loops: u32) -> Self {
        self.loops = loops;
        self
    }

    pub fn with_heuristics(mut self, enabled: bool) -> Self {
        self.apply_heuristics = enabled;
        self
    }

    pub fn with_self_analysis(mut self, enabled: bool) -> Self {
        self.self_analysis = enabled;
        self
    }

    pub fn with_simulate(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_gate(mut self, gate: GateThresholds) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhooks.push(url.into());
        self
    }

    pub fn with_leaderboard(mut self, path: impl Into<PathBuf>) -> Self {
        self.leaderboard = Some(path.into());
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.loops == 0 {
            return Err(BenchError::InvalidConfig("loops must be >= 1".to_string()));
        }
        if self.turn_timeout_secs == 0 {
            return Err(BenchError::InvalidConfig(
                "turn_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.self_analysis && self.self_analysis_timeout_secs == 0 {
            return Err(BenchError::InvalidConfig(
                "self_analysis_timeout_secs must be > 0".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(BenchError::InvalidConfig(format!(
                    "temperature must be within 0..=2, got {}",
                    t
                )));
            }
        }
        if self.workspace_env.trim().is_empty() {
            return Err(BenchError::InvalidConfig(
                "workspace_env must not be empty".to_string(),
            ));
        }
        self.step_markers
            .validate()
            .map_err(BenchError::InvalidConfig)?;
        self.gate.validate()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.trim().parse().ok())
}

fn default_profile_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".agentbench-profile")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TunableValue;

    #[test]
    fn toml_overrides_selected_keys() {
        let config = HarnessConfig::from_toml_str(
            r#"
            loops = 3
            apply_heuristics = true
            scoring = "partial"
            webhooks = ["http://localhost:9/hook"]

            [gate]
            min_pass_rate = 80.0
            min_score_ratio = 0.9

            [step_markers]
            delimiters = ["."]
            words = ["Step"]

            [tunables]
            retry_budget = 2
            "profile.memory.auto_save" = true
            "#,
        )
        .expect("parse");

        assert_eq!(config.loops, 3);
        assert!(config.apply_heuristics);
        assert_eq!(config.scoring, ScoringMode::Partial);
        assert_eq!(config.gate.min_pass_rate, 80.0);
        assert_eq!(config.step_markers.delimiters, vec!['.']);
        assert_eq!(config.tunables.retry_budget(), 2);
        assert_eq!(
            config.tunables.get("profile.memory.auto_save"),
            Some(&TunableValue::Bool(true))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_tunable_in_file_is_rejected() {
        let err = HarnessConfig::from_toml_str("[tunables]\nretry_budget = 9\n").unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = HarnessConfig::default();
        assert!(base.clone().with_loops(0).validate().is_err());
        assert!(base.clone().with_temperature(5.0).validate().is_err());
        assert!(base
            .clone()
            .with_gate(GateThresholds::new(150.0, 0.7))
            .validate()
            .is_err());
        assert!(base.with_turn_timeout_secs(0).validate().is_err());
    }

    #[test]
    fn builders_chain() {
        let config = HarnessConfig::default()
            .with_suite("s.json")
            .with_simulate(true)
            .with_webhook("http://a")
            .with_leaderboard("lb.jsonl");
        assert_eq!(config.suite, PathBuf::from("s.json"));
        assert!(config.simulate);
        assert!(config.webhooks.contains(&"http://a".to_string()));
        assert_eq!(config.leaderboard, Some(PathBuf::from("lb.jsonl")));
    }
}
