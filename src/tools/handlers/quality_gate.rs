// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `sonar.quality_gate` - query the project's quality gate.

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

/// Handler for the `sonar.quality_gate` tool.
///
/// Requires a real backend; remote errors are returned as failures.
pub struct QualityGateHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl QualityGateHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
struct QualityGateArgs {
    #[serde(alias = "projectKey")]
    project_key: String,
}

#[async_trait]
impl ToolHandler for QualityGateHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("sonar.quality_gate", "Get the quality gate status of a project")
            .with_schema(
                InputSchema::new()
                    .with_property("project_key", json!({"type": "string"}))
                    .with_required(&["project_key"]),
            )
    }

    async fn execute(&self, input: Value, _cid: CorrelationId) -> Result<Value, ToolError> {
        let args: QualityGateArgs = parse_arguments(&input)?;
        render(self.orchestrator.quality_gate(&args.project_key).await)
    }
}
