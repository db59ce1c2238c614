// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Analysis task data model.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Lifecycle status of an analysis task.
///
/// Values the remote engine reports that are not listed here are kept
/// verbatim in [`TaskStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Queued,
    Analyzing,
    Computing,
    Finished,
    Reanalyzing,
    InProgress,
    Success,
    Failed,
    Canceled,
    Timeout,
    Other(String),
}

impl TaskStatus {
    /// Statuses after which a task will not change on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Success | Self::Failed | Self::Canceled | Self::Timeout
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Analyzing => "ANALYZING",
            Self::Computing => "COMPUTING",
            Self::Finished => "FINISHED",
            Self::Reanalyzing => "REANALYZING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Timeout => "TIMEOUT",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "QUEUED" => Self::Queued,
            "ANALYZING" => Self::Analyzing,
            "COMPUTING" => Self::Computing,
            "FINISHED" => Self::Finished,
            "REANALYZING" => Self::Reanalyzing,
            "IN_PROGRESS" => Self::InProgress,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "CANCELED" => Self::Canceled,
            "TIMEOUT" => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis finding.
///
/// Fields the engine reports beyond these are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default, alias = "key")]
    pub id: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "component")]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_patch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rule: rule.into(),
            message: message.into(),
            location: location.into(),
            suggested_patch: None,
            extra: Map::new(),
        }
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.suggested_patch = Some(patch.into());
        self
    }
}

/// One page of issue search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IssuePage {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub total: usize,
}

/// How a task is being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    Real,
    Simulated,
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Mode-specific state of a task.
#[derive(Debug, Clone)]
pub enum TaskMode {
    /// Submitted to the engine. The scanned sources live in `workdir`,
    /// which is removed once the last copy of the record is dropped.
    Real { workdir: Arc<TempDir> },
    /// Progressed locally. `cancel` stops the background progression.
    Simulated {
        files: BTreeMap<String, String>,
        cancel: CancellationToken,
    },
}

impl TaskMode {
    pub fn kind(&self) -> SubmitMode {
        match self {
            Self::Real { .. } => SubmitMode::Real,
            Self::Simulated { .. } => SubmitMode::Simulated,
        }
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        match self {
            Self::Real { .. } => None,
            Self::Simulated { cancel, .. } => Some(cancel),
        }
    }
}

/// Cached state of one task, keyed by [`cache_key`].
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: String,
    pub project_key: String,
    pub status: TaskStatus,
    /// `None` until the analysis has produced findings.
    pub issues: Option<Vec<Issue>>,
    pub applied_patches: Vec<String>,
    pub mode: TaskMode,
}

/// Cache key of a task record.
pub fn cache_key(task_id: &str) -> String {
    format!("sonar_task:{task_id}")
}

/// Result of submitting a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub task_id: String,
    pub status: TaskStatus,
    pub mode: SubmitMode,
}

/// Point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub mode: SubmitMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<Issue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_count: Option<usize>,
}

impl TaskSnapshot {
    pub fn issues(&self) -> &[Issue] {
        self.issues.as_deref().unwrap_or_default()
    }
}

impl From<&TaskRecord> for TaskSnapshot {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id.clone(),
            status: record.status.clone(),
            mode: record.mode.kind(),
            issues: record.issues.clone(),
            issue_count: None,
        }
    }
}

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub task_id: String,
    pub applied: Vec<String>,
}

/// Result of following a task's event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutcome {
    pub events: u64,
    /// Terminal status seen on the stream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<TaskStatus>,
}
