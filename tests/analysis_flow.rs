// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end analysis flows through the orchestrator and the tool registry.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use scanflow::analysis::{
    AnalysisBackend, AnalysisOrchestrator, Issue, IssuePage, PollBudget, SimulationConfig,
    SubmitMode, TaskStatus,
};
use scanflow::error::AnalysisError;
use scanflow::monitor::{CallContext, Monitor};
use scanflow::tools::ToolRegistry;
use scanflow::TtlCache;

/// Scripted engine: statuses are served in order, then SUCCESS forever.
#[derive(Default)]
struct ScriptedBackend {
    scanner_down: bool,
    statuses: Mutex<VecDeque<TaskStatus>>,
    issues: Vec<Issue>,
    scanned: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn with_statuses(statuses: &[TaskStatus]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().cloned().collect()),
            issues: vec![
                Issue::new("AX-1", "ts:S1481", "Remove unused variable", "web:src/App.tsx"),
                Issue::new("AX-2", "ts:S2228", "Remove console statement", "web:src/utils.ts"),
                Issue::new("AX-3", "ts:S1854", "Useless assignment", "web:src/App.tsx"),
            ],
            ..Default::default()
        }
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn run_scanner(&self, project_key: &str, workdir: &Path) -> Result<Option<String>, AnalysisError> {
        if self.scanner_down {
            return Err(AnalysisError::BackendUnavailable("scanner not installed".to_string()));
        }
        let app = tokio::fs::read_to_string(workdir.join("src/App.tsx")).await?;
        self.scanned.lock().unwrap().push(app);
        Ok(Some(format!("AY-{project_key}")))
    }

    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus, AnalysisError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TaskStatus::Success))
    }

    async fn issues_page(&self, _project_key: &str, page: u32, page_size: u32) -> Result<IssuePage, AnalysisError> {
        let size = page_size.min(2) as usize;
        let start = (page as usize - 1) * size;
        Ok(IssuePage {
            issues: self.issues.iter().skip(start).take(size).cloned().collect(),
            total: self.issues.len(),
        })
    }

    async fn quality_gate(&self, project_key: &str) -> Result<Value, AnalysisError> {
        Ok(json!({"qualityGate": {"projectStatus": {"status": "OK", "project": project_key}}}))
    }

    fn task_events_url(&self, task_id: &str) -> String {
        format!("http://127.0.0.1:9/api/ce/task/{task_id}/events")
    }

    fn stream_token(&self) -> Option<String> {
        None
    }
}

fn sources() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("src/App.tsx".to_string(), "export const App = () => null;\n".to_string()),
        ("src/utils.ts".to_string(), "console.log('x');\n".to_string()),
    ])
}

fn orchestrator(backend: Option<Arc<ScriptedBackend>>) -> Arc<AnalysisOrchestrator> {
    let mut orchestrator = AnalysisOrchestrator::new(Arc::new(Monitor::new()), Arc::new(TtlCache::new()))
        .with_simulation(SimulationConfig::default().scaled(0.01));
    if let Some(backend) = backend {
        orchestrator = orchestrator.with_backend(backend);
    }
    Arc::new(orchestrator)
}

// ============================================================================
// Real engine
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_real_task_collects_every_issue_page() {
    let backend = Arc::new(ScriptedBackend::with_statuses(&[
        TaskStatus::Pending,
        TaskStatus::InProgress,
    ]));
    let orchestrator = orchestrator(Some(Arc::clone(&backend)));

    let submission = orchestrator.submit("web", sources()).await.unwrap();
    assert_eq!(submission.mode, SubmitMode::Real);
    assert_eq!(submission.task_id, "AY-web");
    assert_eq!(backend.scanned.lock().unwrap().as_slice(), ["export const App = () => null;\n"]);

    let snapshot = orchestrator
        .wait_for_completion(&submission.task_id, PollBudget::new(5, Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(snapshot.status, TaskStatus::Success);
    assert_eq!(snapshot.issue_count, Some(3));
    let ids: Vec<_> = snapshot.issues().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["AX-1", "AX-2", "AX-3"]);

    let gate = orchestrator.quality_gate("web").await.unwrap();
    assert_eq!(gate["qualityGate"]["projectStatus"]["status"], "OK");
}

#[tokio::test(start_paused = true)]
async fn test_real_task_runs_out_of_attempts() {
    let backend = Arc::new(ScriptedBackend::with_statuses(&vec![TaskStatus::InProgress; 8]));
    let orchestrator = orchestrator(Some(backend));

    let submission = orchestrator.submit("web", sources()).await.unwrap();
    let snapshot = orchestrator
        .wait_for_completion(&submission.task_id, PollBudget::new(3, Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(snapshot.status, TaskStatus::Timeout);
    assert!(snapshot.issues().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fails_the_wait() {
    let backend = Arc::new(ScriptedBackend::with_statuses(&vec![TaskStatus::InProgress; 20]));
    let orchestrator = orchestrator(Some(backend));

    let submission = orchestrator.submit("web", sources()).await.unwrap();
    let budget = PollBudget::new(20, Duration::from_millis(100)).with_deadline(Duration::from_millis(250));
    let err = orchestrator
        .wait_for_completion(&submission.task_id, budget)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Timeout(250)));
}

// ============================================================================
// Simulation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unavailable_scanner_falls_back_to_simulation() {
    let backend = Arc::new(ScriptedBackend {
        scanner_down: true,
        ..Default::default()
    });
    let orchestrator = orchestrator(Some(backend));

    let submission = orchestrator.submit("web", sources()).await.unwrap();
    assert_eq!(submission.mode, SubmitMode::Simulated);
    assert!(submission.task_id.starts_with("sim-task-"));

    let snapshot = orchestrator
        .wait_for_completion(&submission.task_id, PollBudget::new(20, Duration::from_millis(10)))
        .await
        .unwrap();
    assert_eq!(snapshot.status, TaskStatus::Finished);
    assert_eq!(snapshot.issues().len(), 2);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_patch_resolves_one_issue() {
    let orchestrator = orchestrator(None);
    let submission = orchestrator.submit("web", sources()).await.unwrap();
    let budget = PollBudget::new(20, Duration::from_millis(10));
    orchestrator.wait_for_completion(&submission.task_id, budget).await.unwrap();

    let outcome = orchestrator
        .apply_patch(&submission.task_id, "replace_with_logger")
        .await
        .unwrap();
    assert_eq!(outcome.applied, ["replace_with_logger"]);
    assert_eq!(orchestrator.poll(&submission.task_id).await.unwrap().status, TaskStatus::Reanalyzing);

    let snapshot = orchestrator.wait_for_completion(&submission.task_id, budget).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Finished);
    assert_eq!(snapshot.issues().len(), 1);
    assert_eq!(snapshot.issues()[0].id, "ISSUE-1");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_expired_task_is_not_found() {
    let orchestrator = Arc::new(
        AnalysisOrchestrator::new(
            Arc::new(Monitor::new()),
            Arc::new(TtlCache::with_ttl(Duration::from_millis(50))),
        )
        .with_simulation(SimulationConfig::default()),
    );

    let submission = orchestrator.submit("web", sources()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let err = orchestrator.poll(&submission.task_id).await.unwrap_err();
    assert!(matches!(err, AnalysisError::NotFound(_)));
    orchestrator.shutdown().await;
}

// ============================================================================
// Tool layer
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_tools_drive_a_simulated_task() {
    let orchestrator = orchestrator(None);
    let registry = ToolRegistry::with_analysis_tools(Arc::clone(&orchestrator));

    let scan = registry
        .dispatch(
            "sonar.scan",
            json!({"project_key": "web", "files": sources()}),
            CallContext::new().with_request_id("rpc-1"),
        )
        .await
        .unwrap();
    assert!(!scan.is_error);
    let task_id = scan.output["taskId"].as_str().unwrap().to_string();
    let scan_cid = scan.correlation_id.clone().unwrap();

    let settled = orchestrator
        .wait_for_completion(&task_id, PollBudget::new(20, Duration::from_millis(10)))
        .await
        .unwrap();
    assert_eq!(settled.status, TaskStatus::Finished);

    let status = registry
        .dispatch(
            "sonar.status",
            json!({"task_id": task_id}),
            CallContext::new().with_parent(scan_cid.clone()),
        )
        .await
        .unwrap();
    assert_eq!(status.output["status"], "FINISHED");
    assert_eq!(status.output["issues"].as_array().unwrap().len(), 2);

    let monitor = registry.monitor();
    let children = monitor.chain().children(&scan_cid);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].operation, "sonar.status");
    assert_eq!(monitor.chain().by_request_id("rpc-1").len(), 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_unknown_task_is_a_payload_not_a_failure() {
    let orchestrator = orchestrator(None);
    let registry = ToolRegistry::with_analysis_tools(orchestrator);

    let result = registry
        .dispatch("sonar.status", json!({"task_id": "sim-task-0"}), CallContext::new())
        .await
        .unwrap();

    assert!(!result.is_error);
    assert_eq!(result.output["error"], "task not found");
}

#[tokio::test]
async fn test_quality_gate_without_backend_is_an_error_output() {
    let orchestrator = orchestrator(None);
    let registry = ToolRegistry::with_analysis_tools(orchestrator);

    let result = registry
        .dispatch("sonar.quality_gate", json!({"project_key": "web"}), CallContext::new())
        .await
        .unwrap();

    assert!(result.is_error);
    assert!(result.output["error"].as_str().unwrap().contains("backend"));
    let stats = registry.monitor().stats().get("sonar.quality_gate").unwrap();
    assert_eq!(stats.failures, 1);
}
