//! Run recorder: persists the run summary and per-loop artifacts.
//!
//! Layout under the run directory:
//! - `<run_id>.summary.json`, rewritten atomically after every loop
//! - `<run_id>.loop<N>.json` and `<run_id>.loop<N>.md`
//! - `<run_id>.loop<N>.self_analysis.md`
//!
//! Usage:
//! 1. [`RunRecorder::create`] for a new run.
//! 2. [`RunRecorder::record_loop`] after each completed loop.
//! 3. [`RunRecorder::finish`] with the terminal status.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{LoopResult, RunStatus, RunSummary};
use crate::reporting::{render_loop_report_md, write_atomic, write_json_pretty};
use crate::tuner::AppliedAdjustment;

pub struct RunRecorder {
    run_dir: PathBuf,
    summary: RunSummary,
}

impl RunRecorder {
    /// Prepare the run directory. Nothing is written until the first loop.
    pub fn create(run_dir: &Path, run_id: &str, suite_digest: &str) -> Result<Self> {
        std::fs::create_dir_all(run_dir).with_context(|| format!("create {:?}", run_dir))?;
        Ok(Self {
            run_dir: run_dir.to_path_buf(),
            summary: RunSummary::new(run_id, suite_digest),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.summary.run_id
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir
            .join(format!("{}.summary.json", self.summary.run_id))
    }

    pub fn loop_path(&self, loop_index: u32, suffix: &str) -> PathBuf {
        self.run_dir
            .join(format!("{}.loop{}.{}", self.summary.run_id, loop_index, suffix))
    }

    /// Persist a completed loop: summary first, then its reports.
    pub fn record_loop(&mut self, result: &LoopResult) -> Result<()> {
        self.summary.push_loop(result);
        self.write_summary()?;
        write_json_pretty(&self.loop_path(result.loop_index, "json"), result)?;
        let md = render_loop_report_md(&self.summary.run_id, result);
        let md_path = self.loop_path(result.loop_index, "md");
        std::fs::write(&md_path, md).with_context(|| format!("write {:?}", md_path))?;
        Ok(())
    }

    /// Attach tuner output to the latest loop and rewrite the summary.
    pub fn record_adjustments(&mut self, adjustments: Vec<AppliedAdjustment>) -> Result<()> {
        if adjustments.is_empty() {
            return Ok(());
        }
        self.summary.record_adjustments(adjustments);
        self.write_summary()
    }

    /// Store the agent's self-analysis for a loop.
    pub fn write_self_analysis(&self, loop_index: u32, markdown: &str) -> Result<PathBuf> {
        let path = self.loop_path(loop_index, "self_analysis.md");
        std::fs::write(&path, markdown).with_context(|| format!("write {:?}", path))?;
        Ok(path)
    }

    /// Mark the run terminal and write the final summary. The in-memory
    /// summary is terminal even when the write fails.
    pub fn finish(&mut self, status: RunStatus) -> Result<()> {
        match status {
            RunStatus::Cancelled => self.summary.cancel(),
            RunStatus::Failed => self.summary.fail(),
            RunStatus::Completed | RunStatus::InProgress => self.summary.complete(),
        }
        self.write_summary()
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    fn write_summary(&self) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(&self.summary).context("serialize run summary")?;
        write_atomic(&self.summary_path(), &content)
    }
}
