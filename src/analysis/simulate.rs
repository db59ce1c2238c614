// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local stand-in for the analysis engine.
//!
//! A simulated task advances through fixed stages by rewriting its cached
//! record in place. Progressions stop early when their cancellation token
//! fires or when the record is no longer in the cache.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{Issue, TaskRecord, TaskStatus};
use crate::cache::TtlCache;

/// Stage delays of the simulated engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub queued: Duration,
    pub analyzing: Duration,
    pub computing: Duration,
    pub finishing: Duration,
    /// Time a re-analysis takes after a patch is applied.
    pub reanalysis: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            queued: Duration::from_millis(500),
            analyzing: Duration::from_millis(1000),
            computing: Duration::from_millis(1200),
            finishing: Duration::from_millis(400),
            reanalysis: Duration::from_millis(1000),
        }
    }
}

impl SimulationConfig {
    /// Every delay multiplied by `factor`. Useful for tests and demos.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            queued: self.queued.mul_f64(factor),
            analyzing: self.analyzing.mul_f64(factor),
            computing: self.computing.mul_f64(factor),
            finishing: self.finishing.mul_f64(factor),
            reanalysis: self.reanalysis.mul_f64(factor),
        }
    }

    /// Total time from submission to FINISHED.
    pub fn total(&self) -> Duration {
        self.queued + self.analyzing + self.computing + self.finishing
    }

    fn stages(&self) -> [(TaskStatus, Duration); 4] {
        [
            (TaskStatus::Queued, self.queued),
            (TaskStatus::Analyzing, self.analyzing),
            (TaskStatus::Computing, self.computing),
            (TaskStatus::Finished, self.finishing),
        ]
    }
}

/// The findings every simulated analysis reports.
pub fn synthetic_issues() -> Vec<Issue> {
    vec![
        Issue::new("ISSUE-1", "no-dead-code", "Unused function", "src/App.tsx:12")
            .with_patch("remove_unused_function"),
        Issue::new("ISSUE-2", "no-console", "console.log found", "src/utils.ts:8")
            .with_patch("replace_with_logger"),
    ]
}

/// Drive a freshly submitted task to FINISHED.
pub(crate) async fn run_analysis(
    cache: Arc<TtlCache<TaskRecord>>,
    key: String,
    cancel: CancellationToken,
    config: SimulationConfig,
) {
    for (status, delay) in config.stages() {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_key = %key, "Simulation cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let updated = cache.update(&key, |record| {
            if status == TaskStatus::Computing {
                record.issues = Some(synthetic_issues());
            }
            record.status = status.clone();
        });
        if updated.is_none() {
            debug!(task_key = %key, "Task record gone; stopping simulation");
            return;
        }
        debug!(task_key = %key, status = %status, "Simulated stage");
    }
}

/// Re-analyze after a patch: one finding is resolved and the task returns
/// to FINISHED.
pub(crate) async fn run_reanalysis(
    cache: Arc<TtlCache<TaskRecord>>,
    key: String,
    cancel: CancellationToken,
    delay: Duration,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(task_key = %key, "Re-analysis cancelled");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    let updated = cache.update(&key, |record| {
        if let Some(issues) = record.issues.as_mut() {
            issues.pop();
        }
        record.status = TaskStatus::Finished;
    });
    if updated.is_none() {
        debug!(task_key = %key, "Task record gone; skipping re-analysis");
    }
}
