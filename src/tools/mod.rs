// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool layer.
//!
//! The analysis operations are exposed as named JSON-in/JSON-out tools:
//!
//! - [`ToolHandler`] trait - Core abstraction for tool implementations
//! - [`ToolRegistry`] - Maps tool names to handlers, dispatches calls
//!   through the instrumentation wrapper
//! - Individual handlers in the [`handlers`] module
//!
//! # Example
//!
//! ```rust,ignore
//! use scanflow::monitor::CallContext;
//! use scanflow::tools::ToolRegistry;
//!
//! let registry = ToolRegistry::with_analysis_tools(orchestrator);
//! let result = registry
//!     .dispatch("sonar.status", json!({"task_id": "sim-task-1"}), CallContext::new())
//!     .await?;
//! ```

mod definition;
pub mod handlers;
pub mod registry;

pub use definition::{InputSchema, ToolDefinition};
pub use handlers::*;
pub use registry::{DispatchResult, ToolHandler, ToolRegistry, ToolRegistryBuilder};

use serde::Deserialize;
use crate::error::ToolError;

/// Parse JSON arguments into a typed struct.
///
/// This is a helper function for tool handlers to deserialize their input.
pub fn parse_arguments<T>(arguments: &serde_json::Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolError::InvalidInput(format!("Failed to parse arguments: {err}")))
}
