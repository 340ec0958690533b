//! AgentBench Harness - running agents against benchmark suites
//!
//! Provides:
//! - The agent boundary (`AgentHandle`) with process, simulated and scripted agents
//! - The scenario runner and per-loop aggregation
//! - Multi-loop orchestration with tuning, gating and notifications

pub mod agent;
pub mod aggregator;
pub mod benchmark;
pub mod cancel;
pub mod clean;
pub mod notify;
pub mod process;
pub mod profile;
pub mod runner;
pub mod simulate;

// Re-export key types
pub use agent::{AgentError, AgentHandle, AgentReply, ScriptStep, ScriptedAgent};
pub use aggregator::run_loop;
pub use benchmark::{Benchmark, BenchmarkOutcome};
pub use cancel::{CancelHandle, CancelSignal};
pub use clean::NoiseFilter;
pub use notify::{
    LogChannel, NotificationPayload, Notifier, NotifyChannel, NotifyError, WebhookChannel,
};
pub use process::ProcessAgent;
pub use profile::{AgentProfile, ProfileError};
pub use runner::{Cancelled, ScenarioRunner, ScenarioState};
pub use simulate::{SimRule, SimulatedAgent};
