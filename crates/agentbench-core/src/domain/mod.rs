//! Domain models for AgentBench.
//!
//! Canonical definitions for the core entities:
//! - `Scenario` / `Suite`: scripted multi-turn test cases
//! - `Check`: declarative transcript assertions
//! - `ScenarioResult` / `LoopResult`: scoring outcomes
//! - `Tunables`: bounded parameters adjusted between loops
//! - `RunSummary`: persisted per-run record

pub mod check;
pub mod error;
pub mod result;
pub mod scenario;
pub mod summary;
pub mod tunables;

// Re-export main types and errors
pub use check::{Check, CheckKind, StepMarkers};
pub use error::{BenchError, GateInputError, Result, TunableError, ValidationError};
pub use result::{
    score_ratio, CheckFailure, FailureKind, LoopResult, ScenarioResult, ScenarioStatus,
    ScoringMode, TurnRecord,
};
pub use scenario::{CheckScope, Scenario, Suite, Turn};
pub use summary::{new_run_id, LoopSummary, RunStatus, RunSummary};
pub use tunables::{TunableValue, Tunables};
