//! AgentBench CLI
//!
//! The `agentbench` command runs benchmark suites against an agent and gates
//! promotion on the results.
//!
//! ## Commands
//!
//! - `run`: run the suite for one or more loops and record the run
//! - `gate`: pass/fail decision on a recorded run summary (exit 0/1/2)
//! - `validate`: load and validate a suite without running it

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agentbench_core::telemetry::parse_level;
use agentbench_core::{
    append_leaderboard_row, decide_from_path, load_path, GateThresholds, HarnessConfig,
    LeaderboardRow, ScoringMode, EXIT_FAIL, EXIT_INPUT_ERROR,
};
use agentbench_harness::{Benchmark, BenchmarkOutcome, CancelSignal};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "agentbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent benchmark harness and quality gate", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, env = "AGENTBENCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark suite against the agent
    Run(RunArgs),

    /// Decide pass/fail on a run summary
    Gate {
        /// Path to `<run_id>.summary.json`
        #[arg(long)]
        summary: PathBuf,

        #[arg(long, env = "AGENTBENCH_MIN_PASS_RATE", default_value_t = 70.0)]
        min_pass_rate: f64,

        #[arg(long, env = "AGENTBENCH_MIN_SCORE_RATIO", default_value_t = 0.70)]
        min_score_ratio: f64,

        /// Append the decision to this JSON Lines leaderboard
        #[arg(long)]
        leaderboard: Option<PathBuf>,
    },

    /// Validate a suite file
    Validate {
        /// Suite file (default: configured suite)
        #[arg(long)]
        suite: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long, env = "AGENTBENCH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    suite: Option<PathBuf>,

    /// Agent executable
    #[arg(long)]
    agent_bin: Option<PathBuf>,

    #[arg(long)]
    run_dir: Option<PathBuf>,

    #[arg(long)]
    profile_root: Option<PathBuf>,

    /// Profile whose config.toml seeds the benchmark profile
    #[arg(long)]
    source_profile: Option<PathBuf>,

    #[arg(long)]
    loops: Option<u32>,

    #[arg(long)]
    turn_timeout_secs: Option<u64>,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f64>,

    /// Tune between loops
    #[arg(long)]
    apply_heuristics: bool,

    /// Ask the agent to analyse each loop
    #[arg(long)]
    self_analysis: bool,

    /// Use the deterministic simulated agent
    #[arg(long)]
    simulate: bool,

    /// Score scenarios by the fraction of checks passed
    #[arg(long)]
    partial_credit: bool,

    #[arg(long)]
    min_pass_rate: Option<f64>,

    #[arg(long)]
    min_score_ratio: Option<f64>,

    /// Webhook notified after the run (repeatable)
    #[arg(long = "webhook")]
    webhooks: Vec<String>,

    #[arg(long)]
    leaderboard: Option<PathBuf>,

    /// Exit with the gate's exit code
    #[arg(long)]
    enforce_gate: bool,
}

impl RunArgs {
    /// Defaults and environment, then the config file, then flags.
    fn into_config(self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_toml_file(path)
                .with_context(|| format!("load config {:?}", path))?,
            None => HarnessConfig::from_env(),
        };
        if let Some(suite) = self.suite {
            config = config.with_suite(suite);
        }
        if let Some(agent_bin) = self.agent_bin {
            config = config.with_agent_bin(agent_bin);
        }
        if let Some(run_dir) = self.run_dir {
            config = config.with_run_dir(run_dir);
        }
        if let Some(profile_root) = self.profile_root {
            config = config.with_profile_root(profile_root);
        }
        if let Some(source_profile) = self.source_profile {
            config = config.with_source_profile(source_profile);
        }
        if let Some(loops) = self.loops {
            config = config.with_loops(loops);
        }
        if let Some(secs) = self.turn_timeout_secs {
            config = config.with_turn_timeout_secs(secs);
        }
        if let Some(provider) = self.provider {
            config = config.with_provider(provider);
        }
        if let Some(model) = self.model {
            config = config.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if self.apply_heuristics {
            config = config.with_heuristics(true);
        }
        if self.self_analysis {
            config = config.with_self_analysis(true);
        }
        if self.simulate {
            config = config.with_simulate(true);
        }
        if self.partial_credit {
            config = config.with_scoring(ScoringMode::Partial);
        }
        let mut gate = config.gate;
        if let Some(min) = self.min_pass_rate {
            gate.min_pass_rate = min;
        }
        if let Some(min) = self.min_score_ratio {
            gate.min_score_ratio = min;
        }
        config = config.with_gate(gate);
        for url in self.webhooks {
            config = config.with_webhook(url);
        }
        if let Some(leaderboard) = self.leaderboard {
            config = config.with_leaderboard(leaderboard);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        parse_level(&cli.log_level)
    };
    agentbench_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Gate {
            summary,
            min_pass_rate,
            min_score_ratio,
            leaderboard,
        } => cmd_gate(
            &summary,
            GateThresholds::new(min_pass_rate, min_score_ratio),
            leaderboard.as_deref(),
        ),
        Commands::Validate { suite } => cmd_validate(suite)?,
    };
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

async fn cmd_run(args: RunArgs) -> Result<i32> {
    let enforce_gate = args.enforce_gate;
    let config = args.into_config()?;

    let (cancel, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling after the current turn");
            cancel.cancel();
        }
    });

    let benchmark = Benchmark::from_config(config)?.with_cancel(signal);
    info!(
        suite = benchmark.suite().name(),
        scenarios = benchmark.suite().len(),
        "starting benchmark"
    );
    let outcome = benchmark.run().await.context("benchmark run failed")?;
    print_outcome(&outcome);

    if outcome.failed() {
        return Ok(EXIT_FAIL);
    }
    Ok(match outcome.exit_code() {
        Some(code) if enforce_gate => code,
        None if enforce_gate => EXIT_INPUT_ERROR,
        _ => 0,
    })
}

fn print_outcome(outcome: &BenchmarkOutcome) {
    println!("Run ID: {}", outcome.summary.run_id);
    println!("Status: {:?}", outcome.summary.status);
    for result in &outcome.loops {
        println!(
            "  loop {}: score {:.2}/{:.2}, pass rate {:.2}% ({}/{})",
            result.loop_index,
            result.score,
            result.max_score,
            result.pass_rate,
            result.passed_scenarios,
            result.total_scenarios
        );
    }
    match &outcome.decision {
        Some(decision) => {
            println!("Gate: {}", if decision.passed { "PASSED" } else { "FAILED" });
            for violation in &decision.violations {
                println!("  - {}", violation.reason);
            }
        }
        None => println!("Gate: skipped (no completed loop)"),
    }
    println!("Summary: {}", outcome.summary_path.display());
}

/// Exit code of the gate; input errors are reported and map to 2.
fn cmd_gate(summary: &Path, thresholds: GateThresholds, leaderboard: Option<&Path>) -> i32 {
    if let Err(e) = thresholds.validate() {
        eprintln!("gate: {}", e);
        return EXIT_INPUT_ERROR;
    }
    let decision = match decide_from_path(summary, thresholds) {
        Ok(decision) => decision,
        Err(e) => {
            eprintln!("gate: {}", e);
            return EXIT_INPUT_ERROR;
        }
    };
    agentbench_core::obs::emit_gate_decided(&decision);

    match serde_json::to_string_pretty(&decision) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "failed to render gate decision"),
    }

    if let Some(path) = leaderboard {
        let row = LeaderboardRow {
            timestamp: chrono::Utc::now(),
            summary_reference: summary.display().to_string(),
            gate_exit_code: decision.exit_code,
            min_pass_rate: thresholds.min_pass_rate,
            min_score_ratio: thresholds.min_score_ratio,
        };
        if let Err(e) = append_leaderboard_row(path, &row) {
            agentbench_core::obs::emit_artifact_error(&path.display().to_string(), &e);
        }
    }
    decision.exit_code
}

fn cmd_validate(suite: Option<PathBuf>) -> Result<i32> {
    let path = suite.unwrap_or_else(|| HarnessConfig::from_env().suite);
    let suite = match load_path(&path) {
        Ok(suite) => suite,
        Err(e) => {
            eprintln!("invalid suite {}: {}", path.display(), e);
            return Ok(EXIT_INPUT_ERROR);
        }
    };
    println!("Suite: {} {}", suite.name(), suite.version());
    println!("Scenarios: {}", suite.len());
    println!("Max score: {:.2}", suite.max_score());
    println!("Digest: {}", suite.digest().context("digest suite")?);
    Ok(0)
}
