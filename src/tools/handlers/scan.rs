// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `sonar.scan` - submit sources for analysis.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::render;
use crate::analysis::AnalysisOrchestrator;
use crate::error::ToolError;
use crate::telemetry::CorrelationId;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_arguments, InputSchema, ToolDefinition};

/// Handler for the `sonar.scan` tool.
pub struct ScanHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl ScanHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
struct ScanArgs {
    #[serde(alias = "projectKey")]
    project_key: String,
    /// Relative path to file contents.
    #[serde(default)]
    files: BTreeMap<String, String>,
}

#[async_trait]
impl ToolHandler for ScanHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "sonar.scan",
            "Submit files for analysis. Falls back to a simulated analysis when no scanner is available.",
        )
        .with_schema(
            InputSchema::new()
                .with_property("project_key", json!({
                    "type": "string",
                    "description": "Project key on the analysis server"
                }))
                .with_property("files", json!({
                    "type": "object",
                    "description": "Map of relative file path to file contents",
                    "additionalProperties": {"type": "string"}
                }))
                .with_required(&["project_key", "files"]),
        )
    }

    async fn execute(&self, input: Value, cid: CorrelationId) -> Result<Value, ToolError> {
        let args: ScanArgs = parse_arguments(&input)?;
        debug!(cid = %cid, project = %args.project_key, files = args.files.len(), "Scan requested");
        render(self.orchestrator.submit(&args.project_key, args.files).await)
    }
}
