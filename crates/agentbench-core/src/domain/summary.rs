//! Run summary: the persisted, cross-tool contract of a benchmark run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{score_ratio, LoopResult};
use crate::domain::tunables::Tunables;
use crate::tuner::AppliedAdjustment;

/// Lifecycle state of a run summary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    InProgress,
    Completed,
    Cancelled,
    /// Stopped by an error; `loops` holds what completed before it.
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != RunStatus::InProgress
    }
}

/// Per-loop metrics persisted in the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopSummary {
    pub loop_index: u32,
    pub score: f64,
    pub max_score: f64,
    /// Percentage (0–100).
    pub pass_rate: f64,
    #[serde(default)]
    pub tunables: Tunables,
    /// Adjustments the tuner applied after this loop.
    #[serde(default)]
    pub adjustments: Vec<AppliedAdjustment>,
}

impl LoopSummary {
    pub fn score_ratio(&self) -> f64 {
        score_ratio(self.score, self.max_score)
    }
}

impl From<&LoopResult> for LoopSummary {
    fn from(result: &LoopResult) -> Self {
        Self {
            loop_index: result.loop_index,
            score: result.score,
            max_score: result.max_score,
            pass_rate: result.pass_rate,
            tunables: result.tunables.clone(),
            adjustments: Vec::new(),
        }
    }
}

/// Structured summary of a run: one entry per completed loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub suite_digest: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub loops: Vec<LoopSummary>,
}

impl RunSummary {
    /// Start a new in-progress summary.
    pub fn new(run_id: impl Into<String>, suite_digest: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::InProgress,
            suite_digest: suite_digest.into(),
            started_at: Some(Utc::now()),
            finished_at: None,
            loops: Vec::new(),
        }
    }

    /// Record a fully completed loop.
    pub fn push_loop(&mut self, result: &LoopResult) {
        self.loops.push(LoopSummary::from(result));
    }

    /// Attach tuner adjustments to the most recent loop.
    pub fn record_adjustments(&mut self, adjustments: Vec<AppliedAdjustment>) {
        if let Some(last) = self.loops.last_mut() {
            last.adjustments.extend(adjustments);
        }
    }

    pub fn latest(&self) -> Option<&LoopSummary> {
        self.loops.last()
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Generate a sortable, unique run id (`20260101T000000Z-1a2b3c4d`).
pub fn new_run_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", stamp, &suffix[..8])
}
