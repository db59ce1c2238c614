// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `sonar.status` - poll a task.

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

/// Handler for the `sonar.status` tool.
pub struct StatusHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl StatusHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
struct StatusArgs {
    #[serde(alias = "taskId")]
    task_id: String,
}

#[async_trait]
impl ToolHandler for StatusHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("sonar.status", "Get the status and findings of an analysis task")
            .with_schema(
                InputSchema::new()
                    .with_property("task_id", json!({
                        "type": "string",
                        "description": "Task id returned by sonar.scan"
                    }))
                    .with_required(&["task_id"]),
            )
    }

    async fn execute(&self, input: Value, _cid: CorrelationId) -> Result<Value, ToolError> {
        let args: StatusArgs = parse_arguments(&input)?;
        render(self.orchestrator.poll(&args.task_id).await)
    }
}
