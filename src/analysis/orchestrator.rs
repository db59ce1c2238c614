// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote task orchestration.
//!
//! The orchestrator decouples submission from completion through the task
//! cache. A submitted task is analyzed by the configured backend when one is
//! reachable; otherwise a simulated progression runs in the background.
//! Callers observe either kind through [`AnalysisOrchestrator::poll`],
//! [`AnalysisOrchestrator::wait_for_completion`] or, for real tasks,
//! [`AnalysisOrchestrator::watch`].

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::backend::AnalysisBackend;
use super::simulate::{self, SimulationConfig};
use super::types::{
    cache_key, Issue, PatchOutcome, Submission, SubmitMode, TaskMode, TaskRecord, TaskSnapshot,
    TaskStatus, WatchOutcome,
};
use crate::cache::TtlCache;
use crate::error::AnalysisError;
use crate::monitor::Monitor;
use crate::stream::{EventTracker, TrackedStream, DEFAULT_STREAM_TIMEOUT};
use crate::telemetry::CorrelationId;

/// Issues requested per search page.
pub const ISSUE_PAGE_SIZE: u32 = 100;

/// Pause between issue search pages.
pub const ISSUE_PAGE_PAUSE: Duration = Duration::from_millis(100);

/// Polling budget for [`AnalysisOrchestrator::wait_for_completion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollBudget {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Hard limit on the whole wait. Exceeding it is an error rather than a
    /// TIMEOUT status.
    pub deadline: Option<Duration>,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(1000),
            deadline: None,
        }
    }
}

impl PollBudget {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Submits, tracks and patches analysis tasks.
pub struct AnalysisOrchestrator {
    backend: Option<Arc<dyn AnalysisBackend>>,
    cache: Arc<TtlCache<TaskRecord>>,
    monitor: Arc<Monitor>,
    simulation: SimulationConfig,
    stream_timeout: Duration,
    http: reqwest::Client,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    last_sim_id: AtomicU64,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator with no backend; every task is simulated.
    pub fn new(monitor: Arc<Monitor>, cache: Arc<TtlCache<TaskRecord>>) -> Self {
        Self {
            backend: None,
            cache,
            monitor,
            simulation: SimulationConfig::default(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            http: reqwest::Client::new(),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            last_sim_id: AtomicU64::new(0),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<TtlCache<TaskRecord>> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Submit `files` (relative path to contents) for analysis.
    ///
    /// Never fails because the backend is missing or broken: any such
    /// problem is logged and the task is simulated instead.
    pub async fn submit(
        &self,
        project_key: &str,
        files: BTreeMap<String, String>,
    ) -> Result<Submission, AnalysisError> {
        if let Some(backend) = &self.backend {
            match self.submit_real(&**backend, project_key, &files).await {
                Ok(Some(submission)) => return Ok(submission),
                Ok(None) => {
                    info!(project = %project_key, "Scanner reported no task; using simulation");
                }
                Err(e) if e.is_recoverable_by_simulation() => {
                    info!(project = %project_key, reason = %e, "Backend unavailable; using simulation");
                }
                Err(e) => {
                    warn!(project = %project_key, error = %e, "Real scan failed; using simulation");
                }
            }
        }
        Ok(self.submit_simulated(project_key, files))
    }

    async fn submit_real(
        &self,
        backend: &dyn AnalysisBackend,
        project_key: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<Option<Submission>, AnalysisError> {
        let workdir = tempfile::Builder::new()
            .prefix(&format!("sonar_{project_key}_"))
            .tempdir()?;
        write_sources(workdir.path(), files).await?;
        debug!(dir = %workdir.path().display(), files = files.len(), "Wrote scan sources");

        let Some(task_id) = backend.run_scanner(project_key, workdir.path()).await? else {
            return Ok(None);
        };

        self.cache.set(
            cache_key(&task_id),
            TaskRecord {
                task_id: task_id.clone(),
                project_key: project_key.to_string(),
                status: TaskStatus::Pending,
                issues: None,
                applied_patches: Vec::new(),
                mode: TaskMode::Real {
                    workdir: Arc::new(workdir),
                },
            },
        );
        info!(task_id = %task_id, project = %project_key, "Submitted analysis");

        Ok(Some(Submission {
            task_id,
            status: TaskStatus::Pending,
            mode: SubmitMode::Real,
        }))
    }

    fn submit_simulated(&self, project_key: &str, files: BTreeMap<String, String>) -> Submission {
        let task_id = self.next_simulated_id();
        let key = cache_key(&task_id);
        let cancel = self.shutdown.child_token();

        self.cache.set(
            key.clone(),
            TaskRecord {
                task_id: task_id.clone(),
                project_key: project_key.to_string(),
                status: TaskStatus::Pending,
                issues: None,
                applied_patches: Vec::new(),
                mode: TaskMode::Simulated {
                    files,
                    cancel: cancel.clone(),
                },
            },
        );
        self.tasks.spawn(simulate::run_analysis(
            Arc::clone(&self.cache),
            key,
            cancel,
            self.simulation.clone(),
        ));
        info!(task_id = %task_id, project = %project_key, "Started simulated analysis");

        Submission {
            task_id,
            status: TaskStatus::Pending,
            mode: SubmitMode::Simulated,
        }
    }

    /// `sim-task-<millis>`, bumped past the previous id so ids stay unique
    /// within one orchestrator.
    fn next_simulated_id(&self) -> String {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last_sim_id.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_sim_id
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return format!("sim-task-{next}"),
                Err(actual) => last = actual,
            }
        }
    }

    /// Current state of a task.
    ///
    /// Real tasks cost one status query; a failed query reports TIMEOUT.
    /// Once the engine reports SUCCESS the task's issues are fetched page by
    /// page and stored on the record.
    pub async fn poll(&self, task_id: &str) -> Result<TaskSnapshot, AnalysisError> {
        match self.poll_once(task_id).await? {
            PollAttempt::Answered(snapshot) => Ok(snapshot),
            PollAttempt::QueryFailed(mut snapshot, e) => {
                warn!(task_id = %task_id, error = %e, "Status query failed");
                snapshot.status = TaskStatus::Timeout;
                Ok(snapshot)
            }
        }
    }

    /// One status check. Lookup failures are errors; a failed engine query
    /// is reported alongside the last known state so callers can retry.
    async fn poll_once(&self, task_id: &str) -> Result<PollAttempt, AnalysisError> {
        let key = cache_key(task_id);
        let record = self
            .cache
            .get(&key)
            .ok_or_else(|| AnalysisError::NotFound(task_id.to_string()))?;

        match record.mode {
            TaskMode::Simulated { .. } => Ok(PollAttempt::Answered(TaskSnapshot::from(&record))),
            TaskMode::Real { .. } => {
                let backend = self.require_backend("status of a real task")?;
                Ok(match self.poll_real(backend, &key, &record).await {
                    Ok(snapshot) => PollAttempt::Answered(snapshot),
                    Err(e) => PollAttempt::QueryFailed(TaskSnapshot::from(&record), e),
                })
            }
        }
    }

    async fn poll_real(
        &self,
        backend: &dyn AnalysisBackend,
        key: &str,
        record: &TaskRecord,
    ) -> Result<TaskSnapshot, AnalysisError> {
        let status = backend.task_status(&record.task_id).await?;
        self.cache.update(key, |r| r.status = status.clone());

        let mut snapshot = TaskSnapshot {
            task_id: record.task_id.clone(),
            status: status.clone(),
            mode: SubmitMode::Real,
            issues: None,
            issue_count: None,
        };

        if status == TaskStatus::Success {
            let issues = self.fetch_issues(backend, &record.project_key).await;
            let stored = issues.clone();
            self.cache.update(key, move |r| r.issues = Some(stored));
            snapshot.issue_count = Some(issues.len());
            snapshot.issues = Some(issues);
        }
        Ok(snapshot)
    }

    /// Every unresolved issue, stopping at the reported total, an empty
    /// page, or the first failed page.
    async fn fetch_issues(&self, backend: &dyn AnalysisBackend, project_key: &str) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut page = 1;
        loop {
            let result = match backend.issues_page(project_key, page, ISSUE_PAGE_SIZE).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(project = %project_key, page, error = %e, "Failed to fetch issues");
                    break;
                }
            };
            let received = result.issues.len();
            issues.extend(result.issues);
            if received == 0 || issues.len() >= result.total {
                break;
            }
            page += 1;
            tokio::time::sleep(ISSUE_PAGE_PAUSE).await;
        }
        debug!(project = %project_key, count = issues.len(), pages = page, "Fetched issues");
        issues
    }

    /// Record `patch_id` against the task and start a re-analysis.
    pub async fn apply_patch(&self, task_id: &str, patch_id: &str) -> Result<PatchOutcome, AnalysisError> {
        let key = cache_key(task_id);
        let (applied, cancel) = self
            .cache
            .update(&key, |record| {
                record.applied_patches.push(patch_id.to_string());
                record.status = TaskStatus::Reanalyzing;
                (record.applied_patches.clone(), record.mode.cancel_token().cloned())
            })
            .ok_or_else(|| AnalysisError::NotFound(task_id.to_string()))?;

        let cancel = cancel.unwrap_or_else(|| self.shutdown.child_token());
        self.tasks.spawn(simulate::run_reanalysis(
            Arc::clone(&self.cache),
            key,
            cancel,
            self.simulation.reanalysis,
        ));
        info!(task_id = %task_id, patch = %patch_id, applied = applied.len(), "Applied patch");

        Ok(PatchOutcome {
            task_id: task_id.to_string(),
            applied,
        })
    }

    /// The project's quality gate. There is no simulated fallback.
    pub async fn quality_gate(&self, project_key: &str) -> Result<Value, AnalysisError> {
        self.require_backend("quality gate")?.quality_gate(project_key).await
    }

    /// Poll until the task reaches a terminal status or the budget runs out.
    ///
    /// Running out of attempts yields a snapshot with status TIMEOUT. If the
    /// budget carries a deadline and it passes first, the wait fails with
    /// [`AnalysisError::Timeout`].
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        budget: PollBudget,
    ) -> Result<TaskSnapshot, AnalysisError> {
        match budget.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.poll_until_terminal(task_id, budget))
                .await
                .map_err(|_| AnalysisError::Timeout(deadline.as_millis() as u64))?,
            None => self.poll_until_terminal(task_id, budget).await,
        }
    }

    async fn poll_until_terminal(&self, task_id: &str, budget: PollBudget) -> Result<TaskSnapshot, AnalysisError> {
        let attempts = budget.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let mut snapshot = match self.poll_once(task_id).await? {
                PollAttempt::Answered(snapshot) => snapshot,
                PollAttempt::QueryFailed(snapshot, e) => {
                    warn!(task_id = %task_id, attempt, error = %e, "Status query failed");
                    snapshot
                }
            };
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            if attempt >= attempts {
                warn!(task_id = %task_id, attempts, last_status = %snapshot.status, "Polling budget exhausted");
                snapshot.status = TaskStatus::Timeout;
                return Ok(snapshot);
            }
            debug!(task_id = %task_id, attempt, status = %snapshot.status, "Waiting for analysis");
            attempt += 1;
            tokio::time::sleep(budget.backoff).await;
        }
    }

    /// Follow the engine's event stream for `task_id` until it reports a
    /// terminal status, correlating events with `parent`.
    pub async fn watch(&self, task_id: &str, parent: CorrelationId) -> Result<WatchOutcome, AnalysisError> {
        let backend = self.require_backend("event stream")?;
        let url = backend.task_events_url(task_id);
        let token = backend.stream_token();

        let events = EventTracker::new(Arc::clone(&self.monitor))
            .connect(&self.http, &url, token.as_deref(), parent, self.stream_timeout)
            .await;
        follow_until_terminal(events).await
    }

    /// Cancel every background progression and wait for them to stop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Orchestrator background tasks stopped");
    }

    fn require_backend(&self, what: &str) -> Result<&dyn AnalysisBackend, AnalysisError> {
        self.backend
            .as_deref()
            .ok_or_else(|| AnalysisError::BackendRequired(what.to_string()))
    }
}

enum PollAttempt {
    Answered(TaskSnapshot),
    QueryFailed(TaskSnapshot, AnalysisError),
}

/// Consume `events` until one carries a terminal status.
///
/// Dropping the stream on return finalizes its summary on the parent record.
pub async fn follow_until_terminal(mut events: TrackedStream) -> Result<WatchOutcome, AnalysisError> {
    let mut outcome = WatchOutcome {
        events: 0,
        final_status: None,
    };
    while let Some(event) = events.next().await {
        let event = event?;
        outcome.events += 1;
        if let Some(status) = event.payload.status().map(TaskStatus::from) {
            if status.is_terminal() {
                info!(cid = %event.parent, status = %status, "Task completed on stream");
                outcome.final_status = Some(status);
                break;
            }
        }
    }
    Ok(outcome)
}

async fn write_sources(root: &Path, files: &BTreeMap<String, String>) -> Result<(), AnalysisError> {
    for (relative, contents) in files {
        let path = safe_join(root, relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
    }
    Ok(())
}

/// Join `relative` onto `root`, rejecting absolute paths and `..`.
fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, AnalysisError> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(AnalysisError::IoError(format!(
            "refusing to write outside the scan directory: {}",
            relative.display()
        )));
    }
    Ok(root.join(relative))
}
