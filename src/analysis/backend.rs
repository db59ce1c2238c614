// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Contract with the external analysis engine.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{IssuePage, TaskStatus};
use crate::error::AnalysisError;

/// A real analysis engine.
///
/// Implementations make one remote request per call and never retry;
/// retry and fallback policy belongs to the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Scan the sources under `workdir`. Returns the engine's task id, or
    /// `None` if the scanner ran but reported no task.
    async fn run_scanner(&self, project_key: &str, workdir: &Path) -> Result<Option<String>, AnalysisError>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AnalysisError>;

    /// One page of unresolved issues. `page` is 1-based.
    async fn issues_page(&self, project_key: &str, page: u32, page_size: u32) -> Result<IssuePage, AnalysisError>;

    /// The engine's gate response, wrapped as `{"qualityGate": ...}`.
    async fn quality_gate(&self, project_key: &str) -> Result<Value, AnalysisError>;

    /// URL of the task's progress event stream.
    fn task_events_url(&self, task_id: &str) -> String;

    /// Credential sent as the basic-auth user when opening event streams.
    fn stream_token(&self) -> Option<String>;
}
