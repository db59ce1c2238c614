// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The design-to-review pipeline.
//!
//! Steps run in order and the first failure stops the run:
//!
//! | step                | result details                 |
//! |---------------------|--------------------------------|
//! | `figma_fetch`       | `file_key`, `node_id`          |
//! | `code_extraction`   | `file_count`                   |
//! | `sonar_scan`        | `task_id`, `mode`              |
//! | `analysis_complete` | `issue_count`, `final_status`  |
//! | `patch_application` | `patches_applied`              |
//! | `quality_gate`      | `gate_status`                  |
//! | `pr_creation`       | `pr_url`, `pr_number`          |
//!
//! Analysis steps go through the tool registry, so every call shows up in
//! the correlation chain. All calls of one run descend from a single
//! `workflow.run` record.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::design::{DesignArtifact, DesignRef, DesignSource};
use super::review::{ReviewRef, ReviewRequest, SourceControl};
use crate::analysis::{AnalysisOrchestrator, Issue, PollBudget, Submission, SubmitMode, TaskSnapshot, TaskStatus};
use crate::error::{ToolError, WorkflowError};
use crate::monitor::{AttachMeta, CallContext, Operation};
use crate::telemetry::CorrelationId;
use crate::tools::{DispatchResult, ToolRegistry};

/// Patches applied per run.
pub const MAX_PATCHES: usize = 3;

/// Pause after patching before the quality gate is read.
pub const PATCH_SETTLE: Duration = Duration::from_secs(2);

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Skipped => "⊘",
            Self::Failed => "✗",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: String,
    pub status: StepStatus,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl StepResult {
    fn new(step: &str, status: StepStatus, details: Value) -> Self {
        Self {
            step: step.to_string(),
            status,
            details: match details {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    fn success(step: &str, details: Value) -> Self {
        Self::new(step, StepStatus::Success, details)
    }

    fn skipped(step: &str, reason: &str) -> Self {
        Self::new(step, StepStatus::Skipped, json!({ "reason": reason }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Started,
    Completed,
    Failed,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub design: DesignRef,
    pub steps: Vec<StepResult>,
    pub overall_status: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl WorkflowReport {
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn succeeded_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Success).count()
    }
}

/// Run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOptions {
    /// `owner/name` of the review repository.
    pub repo: String,
    pub project_key: String,
    pub poll: PollBudget,
    pub max_patches: usize,
    pub patch_settle: Duration,
    /// Follow the engine's event stream while a real task runs.
    pub watch_events: bool,
}

impl WorkflowOptions {
    pub fn new(repo: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            project_key: project_key.into(),
            poll: PollBudget::default(),
            max_patches: MAX_PATCHES,
            patch_settle: PATCH_SETTLE,
            watch_events: true,
        }
    }

    pub fn with_poll(mut self, poll: PollBudget) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_patch_settle(mut self, settle: Duration) -> Self {
        self.patch_settle = settle;
        self
    }
}

/// Drives one design through analysis into a review.
pub struct Workflow {
    orchestrator: Arc<AnalysisOrchestrator>,
    registry: ToolRegistry,
    design_source: Arc<dyn DesignSource>,
    source_control: Option<Arc<dyn SourceControl>>,
    options: WorkflowOptions,
}

impl Workflow {
    pub fn new(
        orchestrator: Arc<AnalysisOrchestrator>,
        design_source: Arc<dyn DesignSource>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            registry: ToolRegistry::with_analysis_tools(Arc::clone(&orchestrator)),
            orchestrator,
            design_source,
            source_control: None,
            options,
        }
    }

    /// Open a review at the end of the run. Without one the step is skipped.
    pub fn with_source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
        self.source_control = Some(source_control);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every step for `design`. Failures end up in the report.
    pub async fn run(&self, design: DesignRef) -> WorkflowReport {
        info!(design = %design, project = %self.options.project_key, "Workflow started");

        let target = &design;
        let result = self
            .orchestrator
            .monitor()
            .run(
                &Operation::new("workflow.run"),
                CallContext::new(),
                target.to_string(),
                |_, root| async move {
                    let mut steps = Vec::new();
                    match self.run_steps(target, &root, &mut steps).await {
                        Ok(()) => Ok(Progress { root, steps }),
                        Err(error) => Err(Interrupted {
                            progress: Progress { root, steps },
                            error,
                        }),
                    }
                },
            )
            .await;

        let (progress, overall_status, error) = match result {
            Ok(progress) => (progress, OverallStatus::Completed, None),
            Err(Interrupted { progress, error }) => {
                warn!(design = %design, error = %error, "Workflow failed");
                (progress, OverallStatus::Failed, Some(error.to_string()))
            }
        };
        info!(
            design = %design,
            status = ?overall_status,
            steps = progress.steps.len(),
            "Workflow finished"
        );

        WorkflowReport {
            design,
            steps: progress.steps,
            overall_status,
            error,
            correlation_id: Some(progress.root),
        }
    }

    async fn run_steps(
        &self,
        design: &DesignRef,
        root: &CorrelationId,
        steps: &mut Vec<StepResult>,
    ) -> Result<(), WorkflowError> {
        let (artifact, design_cid) = record(steps, "figma_fetch", self.fetch_design(design, root).await)?;
        steps.push(StepResult::success(
            "figma_fetch",
            json!({ "file_key": design.file_key, "node_id": design.node_id }),
        ));

        let files = artifact.files();
        self.orchestrator
            .monitor()
            .events()
            .append_marker(&design_cid, json!({ "event": "EXTRACT", "file_count": files.len() }));
        steps.push(StepResult::success("code_extraction", json!({ "file_count": files.len() })));

        let (submission, scan_cid) = record(steps, "sonar_scan", self.scan(&files, &design_cid).await)?;
        steps.push(StepResult::success(
            "sonar_scan",
            json!({ "task_id": submission.task_id, "mode": submission.mode }),
        ));

        let (final_status, issues) =
            record(steps, "analysis_complete", self.await_analysis(&submission, &scan_cid).await)?;
        steps.push(StepResult::success(
            "analysis_complete",
            json!({ "issue_count": issues.len(), "final_status": final_status }),
        ));

        if issues.is_empty() {
            steps.push(StepResult::skipped("patch_application", "no_issues"));
        } else {
            let applied = record(
                steps,
                "patch_application",
                self.apply_patches(&submission.task_id, &issues, &scan_cid).await,
            )?;
            steps.push(StepResult::success(
                "patch_application",
                json!({ "patches_applied": applied.len(), "patches": applied }),
            ));
        }

        let gate_status = if self.orchestrator.has_backend() {
            let gate = record(steps, "quality_gate", self.quality_gate(&scan_cid).await)?;
            steps.push(StepResult::success("quality_gate", json!({ "gate_status": gate })));
            gate
        } else {
            steps.push(StepResult::skipped("quality_gate", "no_backend"));
            "UNKNOWN".to_string()
        };

        match &self.source_control {
            Some(source_control) => {
                let request = self.review_request(design, files, issues.len(), &gate_status);
                let review = record(
                    steps,
                    "pr_creation",
                    self.open_review(&**source_control, request, root).await,
                )?;
                steps.push(StepResult::success(
                    "pr_creation",
                    json!({ "pr_url": review.url, "pr_number": review.number }),
                ));
            }
            None => steps.push(StepResult::skipped("pr_creation", "no_source_control")),
        }

        Ok(())
    }

    async fn fetch_design(
        &self,
        design: &DesignRef,
        root: &CorrelationId,
    ) -> Result<(DesignArtifact, CorrelationId), WorkflowError> {
        let mut design_cid = root.clone();
        let ctx = CallContext::new()
            .with_request_id("rpc-design-fetch")
            .with_parent(root.clone());
        let artifact = self
            .orchestrator
            .monitor()
            .run(&Operation::new("design.fetch"), ctx, design, |design, cid| {
                design_cid = cid;
                self.design_source.fetch(design)
            })
            .await?;

        self.orchestrator.monitor().events().append_marker(
            &design_cid,
            json!({ "event": "FETCH", "component": artifact.component_name }),
        );
        Ok((artifact, design_cid))
    }

    async fn scan(
        &self,
        files: &BTreeMap<String, String>,
        parent: &CorrelationId,
    ) -> Result<(Submission, CorrelationId), WorkflowError> {
        let result = self
            .registry
            .dispatch(
                "sonar.scan",
                json!({ "project_key": self.options.project_key, "files": files }),
                CallContext::new()
                    .with_request_id("rpc-sonar-scan")
                    .with_parent(parent.clone()),
            )
            .await?;
        let scan_cid = result.correlation_id.clone().unwrap_or_else(|| parent.clone());
        let submission: Submission = decode("sonar.scan", tool_output(result)?)?;

        self.orchestrator.monitor().events().append_marker(
            &scan_cid,
            json!({ "event": "STARTED", "task_id": submission.task_id, "mode": submission.mode }),
        );
        Ok((submission, scan_cid))
    }

    /// Poll the task through the registry until it settles.
    ///
    /// FAILED, CANCELED and an exhausted budget all yield no issues.
    async fn await_analysis(
        &self,
        submission: &Submission,
        scan_cid: &CorrelationId,
    ) -> Result<(TaskStatus, Vec<Issue>), WorkflowError> {
        if submission.mode == SubmitMode::Real && self.options.watch_events {
            match self.orchestrator.watch(&submission.task_id, scan_cid.clone()).await {
                Ok(outcome) => info!(task_id = %submission.task_id, events = outcome.events, "Event stream ended"),
                Err(e) => warn!(task_id = %submission.task_id, error = %e, "Event stream unavailable"),
            }
        }

        let budget = self.options.poll;
        let mut last = TaskStatus::Pending;
        for attempt in 1..=budget.max_attempts.max(1) {
            tokio::time::sleep(budget.backoff).await;
            let result = self
                .registry
                .dispatch(
                    "sonar.status",
                    json!({ "task_id": submission.task_id }),
                    CallContext::new()
                        .with_request_id(format!("rpc-sonar-status-{attempt}"))
                        .with_parent(scan_cid.clone()),
                )
                .await?;
            let snapshot: TaskSnapshot = decode("sonar.status", tool_output(result)?)?;
            last = snapshot.status.clone();

            match &snapshot.status {
                TaskStatus::Finished | TaskStatus::Success => {
                    self.mark_finished(scan_cid, &last);
                    return Ok((last, snapshot.issues().to_vec()));
                }
                TaskStatus::Failed | TaskStatus::Canceled => {
                    self.mark_finished(scan_cid, &last);
                    return Ok((last, Vec::new()));
                }
                _ => {}
            }
        }

        warn!(task_id = %submission.task_id, last_status = %last, "Analysis did not finish in time");
        Ok((TaskStatus::Timeout, Vec::new()))
    }

    fn mark_finished(&self, scan_cid: &CorrelationId, status: &TaskStatus) {
        self.orchestrator
            .monitor()
            .events()
            .append_marker(scan_cid, json!({ "event": "FINISHED", "status": status }));
    }

    /// Apply the first few suggested patches; returns the ids that took.
    async fn apply_patches(
        &self,
        task_id: &str,
        issues: &[Issue],
        scan_cid: &CorrelationId,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut applied = Vec::new();
        for issue in issues.iter().take(self.options.max_patches) {
            let patch_id = issue
                .suggested_patch
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or(&issue.id);

            let result = self
                .registry
                .dispatch(
                    "sonar.apply_patch",
                    json!({ "task_id": task_id, "patch_id": patch_id }),
                    CallContext::new()
                        .with_request_id("rpc-sonar-patch")
                        .with_parent(scan_cid.clone()),
                )
                .await?;
            let output = tool_output(result)?;
            let took = output
                .get("applied")
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty());
            if took {
                self.orchestrator.monitor().events().append_marker(
                    scan_cid,
                    json!({ "event": "PATCH_APPLIED", "patch_id": patch_id }),
                );
                applied.push(patch_id.to_string());
            }
        }

        if !applied.is_empty() {
            tokio::time::sleep(self.options.patch_settle).await;
        }
        Ok(applied)
    }

    async fn quality_gate(&self, scan_cid: &CorrelationId) -> Result<String, WorkflowError> {
        let result = self
            .registry
            .dispatch(
                "sonar.quality_gate",
                json!({ "project_key": self.options.project_key }),
                CallContext::new()
                    .with_request_id("rpc-sonar-qualitygate")
                    .with_parent(scan_cid.clone()),
            )
            .await?;
        let output = tool_output(result)?;
        Ok(output
            .pointer("/qualityGate/projectStatus/status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string())
    }

    fn review_request(
        &self,
        design: &DesignRef,
        files: BTreeMap<String, String>,
        issue_count: usize,
        gate_status: &str,
    ) -> ReviewRequest {
        let title = format!("feat: Add {} components from Figma design", files.len());
        let body = format!(
            "## Auto-generated from Figma\n\n\
             - Design: `{design}`\n\
             - Files: {}\n\
             - Issues found: {issue_count}\n\
             - Quality gate: {gate_status}\n\n\
             Generated by scanflow.\n",
            files.len(),
        );
        ReviewRequest {
            repo: self.options.repo.clone(),
            branch: format!("figma-{}-{}", design.node_slug(), Utc::now().timestamp()),
            files,
            title,
            body,
        }
    }

    async fn open_review(
        &self,
        source_control: &dyn SourceControl,
        request: ReviewRequest,
        root: &CorrelationId,
    ) -> Result<ReviewRef, WorkflowError> {
        let ctx = CallContext::new()
            .with_request_id("rpc-open-review")
            .with_parent(root.clone());
        self.orchestrator
            .monitor()
            .run(
                &Operation::new("source_control.open_review"),
                ctx,
                ReviewArgs(&request),
                |args, _cid| source_control.open_review(args.0),
            )
            .await
    }
}

/// Steps finished so far, under the run's root record.
struct Progress {
    root: CorrelationId,
    steps: Vec<StepResult>,
}

impl AttachMeta for Progress {}

/// A run stopped by a failing step.
struct Interrupted {
    progress: Progress,
    error: WorkflowError,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Records only the branch and file list of a review request.
struct ReviewArgs<'a>(&'a ReviewRequest);

impl std::fmt::Debug for ReviewArgs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewRequest")
            .field("repo", &self.0.repo)
            .field("branch", &self.0.branch)
            .field("files", &self.0.files.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Pass `result` through, recording a failed step for `step` on error.
fn record<T>(
    steps: &mut Vec<StepResult>,
    step: &str,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    if let Err(e) = &result {
        steps.push(StepResult::new(step, StepStatus::Failed, json!({ "error": e.to_string() })));
    }
    result
}

/// Tool output, or an error if the tool failed or reported one.
fn tool_output(result: DispatchResult) -> Result<Value, WorkflowError> {
    let reported = result
        .output
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);
    match reported {
        Some(message) => Err(ToolError::ExecutionFailed(format!("{}: {message}", result.tool_name)).into()),
        None => Ok(result.output),
    }
}

fn decode<T: for<'de> serde::Deserialize<'de>>(tool: &str, output: Value) -> Result<T, WorkflowError> {
    serde_json::from_value(output)
        .map_err(|e| ToolError::ExecutionFailed(format!("{tool}: unexpected output: {e}")).into())
}
