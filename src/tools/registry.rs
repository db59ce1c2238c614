// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool registry and handler trait.
//!
//! This module defines the core abstractions for the tool layer:
//! - [`ToolHandler`] trait that all tools must implement
//! - [`ToolRegistry`] for managing and dispatching tool calls
//!
//! Every dispatch runs through [`Monitor::run`], so each call gets a
//! correlation record, a limiter slot and stats regardless of which handler
//! serves it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::definition::ToolDefinition;
use super::handlers;
use crate::analysis::AnalysisOrchestrator;
use crate::error::ToolError;
use crate::monitor::{CallContext, Monitor, Operation, DEFAULT_MAX_PARALLEL};
use crate::telemetry::CorrelationId;

/// Trait that all tool handlers must implement.
///
/// # Example
///
/// ```rust,ignore
/// use scanflow::tools::{ToolDefinition, ToolHandler};
///
/// struct Echo;
///
/// #[async_trait]
/// impl ToolHandler for Echo {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("echo", "Return the input")
///     }
///
///     async fn execute(&self, input: Value, _cid: CorrelationId) -> Result<Value, ToolError> {
///         Ok(input)
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Concurrent executions allowed for this tool.
    fn max_parallel(&self) -> usize {
        DEFAULT_MAX_PARALLEL
    }

    /// Execute the tool. `cid` is this call's correlation id, to be passed
    /// as the parent of any nested instrumented work.
    async fn execute(&self, input: Value, cid: CorrelationId) -> Result<Value, ToolError>;
}

/// Compact JSON rendering for correlation records.
struct ToolArgs(Value);

impl fmt::Debug for ToolArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of available tools, maps names to handlers.
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    monitor: Arc<Monitor>,
}

impl ToolRegistry {
    /// Create a registry with the four analysis tools, reporting into the
    /// orchestrator's monitor.
    pub fn with_analysis_tools(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        let mut builder = ToolRegistryBuilder::new();
        builder.register(handlers::ScanHandler::new(Arc::clone(&orchestrator)));
        builder.register(handlers::StatusHandler::new(Arc::clone(&orchestrator)));
        builder.register(handlers::ApplyPatchHandler::new(Arc::clone(&orchestrator)));
        builder.register(handlers::QualityGateHandler::new(Arc::clone(&orchestrator)));
        builder.build(Arc::clone(orchestrator.monitor()))
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Get a handler by tool name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.handlers.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a tool call and return the result.
    ///
    /// Unknown tools are an error. Handler failures are recorded on the
    /// call's correlation record and returned as an `{"error": ...}` output
    /// with `is_error` set.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        input: Value,
        ctx: CallContext,
    ) -> Result<DispatchResult, ToolError> {
        let handler = self
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let op = Operation::new(tool_name).with_max_parallel(handler.max_parallel());
        let mut correlation_id = None;
        let start = Instant::now();

        let result = self
            .monitor
            .run(&op, ctx, ToolArgs(input), |args, cid| {
                correlation_id = Some(cid.clone());
                async move { handler.execute(args.0, cid).await }
            })
            .await;

        let duration = start.elapsed();

        match result {
            Ok(output) => {
                debug!(
                    tool = %tool_name,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    "Tool execution succeeded"
                );
                Ok(DispatchResult {
                    tool_name: tool_name.to_string(),
                    output,
                    duration,
                    is_error: false,
                    correlation_id,
                })
            }
            Err(err) => Ok(DispatchResult {
                tool_name: tool_name.to_string(),
                output: json!({ "error": err.to_string() }),
                duration,
                is_error: true,
                correlation_id,
            }),
        }
    }
}

/// Result of dispatching a tool call.
#[derive(Debug)]
pub struct DispatchResult {
    /// Name of the tool that was called
    pub tool_name: String,
    /// Output from the tool
    pub output: Value,
    /// Duration of execution, including time spent waiting for a slot
    pub duration: Duration,
    /// Whether the execution resulted in an error
    pub is_error: bool,
    /// Correlation id of the call
    pub correlation_id: Option<CorrelationId>,
}

/// Builder for constructing a ToolRegistry.
pub struct ToolRegistryBuilder {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistryBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a tool handler.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) -> &mut Self {
        let def = handler.definition();
        self.handlers.insert(def.name, Arc::new(handler));
        self
    }

    /// Register a tool handler (boxed version for dynamic registration).
    pub fn register_boxed(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let def = handler.definition();
        self.handlers.insert(def.name, handler);
        self
    }

    /// Build the final registry.
    pub fn build(self, monitor: Arc<Monitor>) -> ToolRegistry {
        ToolRegistry {
            handlers: self.handlers,
            monitor,
        }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::META_KEY;
    use crate::telemetry::CallStatus;

    struct MockTool {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl ToolHandler for MockTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(&self.name, "A mock tool")
        }

        async fn execute(&self, input: Value, cid: CorrelationId) -> Result<Value, ToolError> {
            if self.fail {
                return Err(ToolError::ExecutionFailed("boom".to_string()));
            }
            Ok(json!({ "echo": input, "cid": cid }))
        }
    }

    fn registry(fail: bool) -> ToolRegistry {
        let mut builder = ToolRegistryBuilder::new();
        builder.register(MockTool {
            name: "mock".to_string(),
            fail,
        });
        builder.build(Arc::new(Monitor::new()))
    }

    #[test]
    fn test_registry_builder() {
        let registry = registry(false);
        assert!(registry.contains("mock"));
        assert!(!registry.contains("other"));
        assert_eq!(registry.definitions().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_is_instrumented() {
        let registry = registry(false);
        let result = registry
            .dispatch("mock", json!({"a": 1}), CallContext::new().with_request_id("7"))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.output["echo"], json!({"a": 1}));
        assert_eq!(result.output[META_KEY]["request_id"], "7");

        let cid = result.correlation_id.unwrap();
        assert_eq!(result.output["cid"], cid.as_str());
        let record = registry.monitor().chain().get(&cid).unwrap();
        assert_eq!(record.status, CallStatus::Success);
        assert_eq!(record.args, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_recorded() {
        let registry = registry(true);
        let result = registry
            .dispatch("mock", json!({}), CallContext::new())
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.output["error"], "Execution failed: boom");
        let record = registry
            .monitor()
            .chain()
            .get(&result.correlation_id.unwrap())
            .unwrap();
        assert_eq!(record.status, CallStatus::Error);
        assert_eq!(registry.monitor().stats().get("mock").unwrap().failures, 1);
    }

    #[tokio::test]
    async fn test_registry_dispatch_not_found() {
        let registry = registry(false);
        let result = registry.dispatch("nonexistent", json!({}), CallContext::new()).await;
        assert!(matches!(result.unwrap_err(), ToolError::NotFound(_)));
    }
}
