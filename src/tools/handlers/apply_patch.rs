// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `sonar.apply_patch` - apply a suggested fix and re-analyze.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::render;
use crate::analysis::AnalysisOrchestrator;
use crate::error::ToolError;
use crate::telemetry::CorrelationId;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, InputSchema, ToolDefinition};

/// Handler for the `sonar.apply_patch` tool.
pub struct ApplyPatchHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl ApplyPatchHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
struct ApplyPatchArgs {
    #[serde(alias = "taskId")]
    task_id: String,
    #[serde(alias = "patchId")]
    patch_id: String,
}

#[async_trait]
impl ToolHandler for ApplyPatchHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "sonar.apply_patch",
            "Apply a suggested patch to a task's sources and start a re-analysis",
        )
        .with_schema(
            InputSchema::new()
                .with_property("task_id", json!({"type": "string"}))
                .with_property("patch_id", json!({
                    "type": "string",
                    "description": "A suggested_patch value from the task's issues"
                }))
                .with_required(&["task_id", "patch_id"]),
        )
    }

    async fn execute(&self, input: Value, _cid: CorrelationId) -> Result<Value, ToolError> {
        let args: ApplyPatchArgs = parse_arguments(&input)?;
        render(self.orchestrator.apply_patch(&args.task_id, &args.patch_id).await)
    }
}
