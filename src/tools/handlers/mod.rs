// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Analysis tool handlers.
//!
//! Each handler is a thin JSON adapter over one [`AnalysisOrchestrator`]
//! operation.
//!
//! [`AnalysisOrchestrator`]: crate::analysis::AnalysisOrchestrator

mod apply_patch;
mod quality_gate;
mod scan;
mod status;

pub use apply_patch::ApplyPatchHandler;
pub use quality_gate::QualityGateHandler;
pub use scan::ScanHandler;
pub use status::StatusHandler;

use serde_json::{json, Value};

use crate::error::{AnalysisError, ToolError};

/// Render an orchestrator result as tool output.
///
/// An unknown task is an ordinary result, not a failure.
pub(crate) fn render<T: serde::Serialize>(result: Result<T, AnalysisError>) -> Result<Value, ToolError> {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to serialize result: {e}"))),
        Err(AnalysisError::NotFound(_)) => Ok(json!({ "error": "task not found" })),
        Err(e) => Err(ToolError::Analysis(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_a_payload() {
        let out = render::<()>(Err(AnalysisError::NotFound("t".into()))).unwrap();
        assert_eq!(out, json!({"error": "task not found"}));
    }

    #[test]
    fn test_other_errors_fail() {
        let err = render::<()>(Err(AnalysisError::remote(500, "down"))).unwrap_err();
        assert!(matches!(err, ToolError::Analysis(AnalysisError::Remote { status: 500, .. })));
    }
}
